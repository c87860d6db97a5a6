//! CLI commands for cargo-shipyard
//!
//! - **plan**: Print the publish plan (order, skips, patch strategy)
//! - **publish**: Plan, stage, preflight and publish in one run
//!
//! Both accept `&WorkspaceContext` so the workspace is loaded once.

pub mod plan;
pub mod publish;

pub use plan::run_plan;
pub use publish::{PublishArgs, publish_workspace, run_publish};
