//! Core building blocks shared by every command
//!
//! - **config**: shipyard.toml parsing and validation
//! - **context**: Workspace context built once and passed to commands
//! - **error**: Error types with exit codes and help messages
//! - **vcs**: The clean-tree check (system git)

pub mod config;
pub mod context;
pub mod error;
pub mod vcs;
