//! `cargo metadata` invocation
//!
//! `cargo_metadata` knows the exact flags; the injected runner executes them, so
//! tests can answer with a canned document instead of spawning cargo.

use crate::core::error::{ShipyardResult, WorkspaceModelError};
use crate::exec::{CommandRunner, Invocation};
use cargo_metadata::MetadataCommand;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const METADATA_TIMEOUT: Duration = Duration::from_secs(300);

/// Argument vector for `cargo metadata --format-version 1 --no-deps` on `workspace_root`
pub fn metadata_command(workspace_root: &Path) -> Vec<String> {
  let mut command = MetadataCommand::new();
  command.manifest_path(workspace_root.join("Cargo.toml")).no_deps();
  let process = command.cargo_command();

  std::iter::once(process.get_program())
    .chain(process.get_args())
    .map(|arg| arg.to_string_lossy().into_owned())
    .collect()
}

/// Run `cargo metadata` through `runner` and return the raw JSON document
pub fn load_metadata_json(workspace_root: &Path, runner: &dyn CommandRunner) -> ShipyardResult<String> {
  let invocation = Invocation::new(metadata_command(workspace_root), workspace_root).timeout(METADATA_TIMEOUT);
  info!(command = %invocation.display(), "loading workspace metadata");

  let result = runner.run(&invocation)?;
  if !result.success() {
    return Err(
      WorkspaceModelError::Metadata {
        output: result.failure_output(4000),
      }
      .into(),
    );
  }
  Ok(result.stdout)
}
