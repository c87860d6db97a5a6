//! Cargo integration
//!
//! - **metadata**: Build and run the `cargo metadata` command
//! - **manifest**: Read and edit Cargo.toml files without losing formatting

pub mod manifest;
pub mod metadata;
