//! cargo-shipyard: publish a Cargo workspace crate by crate, in dependency order
//!
//! The pipeline is `cargo metadata` → [`graph::WorkspaceGraph`] →
//! [`release::PublishPlanner`] → [`release::WorkspaceStager`] →
//! [`release::PreflightRunner`] → [`release::PublishExecutor`]. Every stage
//! that runs a command takes a [`exec::CommandRunner`].

pub mod cargo;
pub mod commands;
pub mod core;
pub mod exec;
pub mod graph;
pub mod release;
pub mod utils;

pub use crate::core::config::{PatchStrategy, PreflightConfig, PublishConfig, ShipyardConfig};
pub use crate::core::context::WorkspaceContext;
pub use crate::core::error::{ShipyardError, ShipyardResult};
