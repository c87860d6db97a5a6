//! Release pipeline: plan → stage → preflight → publish
//!
//! Each stage takes what the previous one produced and the configuration it
//! needs; nothing is global. Stages that run commands receive a
//! `&dyn CommandRunner`.
//!
//! # Example shipyard.toml
//!
//! ```toml
//! [publish]
//! exclude = ["xtask"]
//! patch_strategy = "per-crate"
//! dry_run_first = true
//!
//! [preflight]
//! unit_tests_only = false
//! ```

pub mod plan;
pub mod preflight;
pub mod publish;
pub mod stage;

pub use plan::{PublishPlan, PublishPlanner};
pub use preflight::PreflightRunner;
pub use publish::{ALREADY_PUBLISHED_MARKERS, PublishExecutor, PublishOutcome, PublishReport};
pub use stage::{StagedWorkspace, WorkspaceStager, apply_patch_strategy};
