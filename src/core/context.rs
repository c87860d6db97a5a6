//! Unified workspace context - build once, pass everywhere
//!
//! ```text
//! main.rs:
//!   runner_from_env() -> Box<dyn CommandRunner>
//!   WorkspaceContext::build(root, &runner) -> WorkspaceContext
//!   |
//!   v
//! commands/plan.rs, publish.rs:
//!   fn run_*(ctx: &WorkspaceContext, ...)
//! ```

use crate::core::config::ShipyardConfig;
use crate::core::error::ShipyardResult;
use crate::exec::CommandRunner;
use crate::graph::workspace_graph::WorkspaceGraph;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Workspace-level data shared by every command
#[derive(Clone)]
pub struct WorkspaceContext {
  /// Workspace root directory the command was started in
  pub root: PathBuf,

  /// Dependency graph (built from `cargo metadata`)
  pub graph: Arc<WorkspaceGraph>,

  /// shipyard.toml, or defaults when there is none
  pub config: Arc<ShipyardConfig>,
}

impl WorkspaceContext {
  /// Load config first so a broken shipyard.toml fails before cargo is spawned
  pub fn build(workspace_root: &Path, runner: &dyn CommandRunner) -> ShipyardResult<Self> {
    let root = workspace_root.to_path_buf();
    let config = Arc::new(ShipyardConfig::load(&root)?);
    let graph = Arc::new(WorkspaceGraph::load(&root, runner)?);

    Ok(Self { root, graph, config })
  }

  /// Assemble from parts already in hand
  pub fn from_parts(root: impl Into<PathBuf>, graph: WorkspaceGraph, config: ShipyardConfig) -> Self {
    Self {
      root: root.into(),
      graph: Arc::new(graph),
      config: Arc::new(config),
    }
  }

  pub fn workspace_root(&self) -> &Path {
    &self.root
  }
}
