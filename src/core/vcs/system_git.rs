//! System git backend
//!
//! One query only: is the working tree clean. Commands go through the injected
//! `CommandRunner` so tests never need a real repository.

use crate::core::error::{ExecError, ShipyardError, ShipyardResult};
use crate::exec::{CommandRunner, Invocation};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Git backend using system git
pub struct SystemGit<'a> {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,
  runner: &'a dyn CommandRunner,
}

impl<'a> SystemGit<'a> {
  pub fn new(path: &Path, runner: &'a dyn CommandRunner) -> Self {
    Self {
      repo_path: path.to_path_buf(),
      runner,
    }
  }

  /// `git status --porcelain` output; empty when the tree is clean
  pub fn status_porcelain(&self) -> ShipyardResult<String> {
    let invocation = self.git_cmd(["status", "--porcelain"]);
    let result = self.runner.run(&invocation).map_err(|err| match err {
      ShipyardError::Exec(ExecError::ProgramNotFound { .. }) => ExecError::ProgramNotFound {
        program: "git".to_string(),
      }
      .into(),
      other => other,
    })?;

    if !result.success() {
      let stderr = result.stderr.to_lowercase();
      if stderr.contains("not a git repository") {
        return Err(
          ExecError::NotARepository {
            path: self.repo_path.clone(),
          }
          .into(),
        );
      }
      return Err(
        ExecError::CommandFailed {
          summary: "Failed to query git status".to_string(),
          command: invocation.display(),
          exit_code: result.exit_code,
          output: result.failure_output(4000),
        }
        .into(),
      );
    }

    Ok(result.stdout.trim_end().to_string())
  }

  /// Fail with `ExecError::DirtyTree` listing the changes when anything is uncommitted
  pub fn ensure_clean(&self) -> ShipyardResult<()> {
    let status = self.status_porcelain()?;
    if status.trim().is_empty() {
      Ok(())
    } else {
      Err(ExecError::DirtyTree { status }.into())
    }
  }

  /// Git invocation pinned to the repository, with output that does not depend on user config
  pub(crate) fn git_cmd<const N: usize>(&self, args: [&str; N]) -> Invocation {
    let mut command = vec![
      "git".to_string(),
      "-C".to_string(),
      self.repo_path.to_string_lossy().into_owned(),
      "-c".to_string(),
      "core.quotePath=false".to_string(),
    ];
    command.extend(args.iter().map(|a| a.to_string()));
    Invocation::new(command, &self.repo_path)
      .env("GIT_TERMINAL_PROMPT", "0")
      .env("LC_ALL", "C")
      .timeout(GIT_TIMEOUT)
  }
}
