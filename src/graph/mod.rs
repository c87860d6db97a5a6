//! Workspace graph and publish ordering
//!
//! Built on the `cargo metadata` document + petgraph. Only workspace members
//! become nodes; everything from a registry is irrelevant to publish order.

pub mod order;
pub mod workspace_graph;

pub use order::publish_order;
pub use workspace_graph::{Dependency, DependencyKind, Package, WorkspaceGraph};
