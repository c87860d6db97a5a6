//! Preflight: prove the staged workspace builds and tests before publishing
//!
//! Steps, each fatal on failure:
//! 1. Clean-tree check on the live workspace (only when dirty trees are forbidden)
//! 2. Auxiliary build commands from `[preflight] aux_commands`
//! 3. `cargo check --workspace --all-targets`
//! 4. `cargo test --workspace`, narrowed and configured by `[preflight]`

use crate::core::config::ShipyardConfig;
use crate::core::error::{ExecError, ShipyardResult};
use crate::core::vcs::SystemGit;
use crate::exec::{CommandResult, CommandRunner, Invocation};
use crate::release::stage::StagedWorkspace;
use crate::utils::absolute_from;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Characters of command output kept in failure reports
const OUTPUT_TAIL_CHARS: usize = 4000;
/// Diagnostic artifacts reported per failure
const MAX_ARTIFACTS: usize = 10;

fn artifact_pattern() -> Option<&'static Regex> {
  static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
  PATTERN
    .get_or_init(|| {
      Regex::new(
        r"(?:[A-Za-z]:)?(?:\.{0,2}[/\\])?(?:[\w.\-]+[/\\])+[\w.\-]+\.(?:log|txt|out|err|diff|json|xml|snap\.new|pending-snap)\b",
      )
      .ok()
    })
    .as_ref()
}

/// Runs every preflight step for a staged workspace
pub struct PreflightRunner<'a> {
  runner: &'a dyn CommandRunner,
  config: &'a ShipyardConfig,
  workspace_root: &'a Path,
  staged: &'a StagedWorkspace,
  forbid_dirty: bool,
  inherited_rustflags: Option<String>,
}

impl<'a> PreflightRunner<'a> {
  pub fn new(
    runner: &'a dyn CommandRunner,
    config: &'a ShipyardConfig,
    workspace_root: &'a Path,
    staged: &'a StagedWorkspace,
  ) -> Self {
    Self {
      runner,
      config,
      workspace_root,
      staged,
      forbid_dirty: false,
      inherited_rustflags: std::env::var("RUSTFLAGS").ok(),
    }
  }

  /// Fail when the live workspace has uncommitted changes
  pub fn forbid_dirty(mut self, forbid: bool) -> Self {
    self.forbid_dirty = forbid;
    self
  }

  /// RUSTFLAGS the extern flags are appended to (defaults to the process value)
  pub fn inherited_rustflags(mut self, flags: Option<String>) -> Self {
    self.inherited_rustflags = flags;
    self
  }

  pub fn run(&self) -> ShipyardResult<()> {
    if self.forbid_dirty {
      info!(root = %self.workspace_root.display(), "checking for uncommitted changes");
      SystemGit::new(self.workspace_root, self.runner).ensure_clean()?;
    }

    let preflight = &self.config.preflight;
    if preflight.skip {
      info!("preflight checks skipped by configuration");
      return Ok(());
    }

    for command in &preflight.aux_commands {
      let invocation = Invocation::new(command.iter().cloned(), self.staged.root()).timeout(self.config.preflight_timeout());
      self.run_step(&invocation, "Auxiliary build command failed")?;
    }

    self.run_step(&self.check_invocation(), "cargo check failed")?;

    let test = self.test_invocation();
    let result = self.launch(&test)?;
    if !result.success() {
      let mut output = result.failure_output(OUTPUT_TAIL_CHARS);
      output.push_str(&self.artifact_report(&result));
      return Err(
        ExecError::CommandFailed {
          summary: "cargo test failed".to_string(),
          command: test.display(),
          exit_code: result.exit_code,
          output,
        }
        .into(),
      );
    }

    println!("✅ Preflight passed");
    Ok(())
  }

  /// `cargo check` across every target, built outside the staged tree
  pub fn check_invocation(&self) -> Invocation {
    let target_dir = self.staged.target_dir();
    Invocation::new(
      [
        "cargo".to_string(),
        "check".to_string(),
        "--workspace".to_string(),
        "--all-targets".to_string(),
        "--target-dir".to_string(),
        target_dir.to_string_lossy().into_owned(),
      ],
      self.staged.root(),
    )
    .timeout(self.config.preflight_timeout())
  }

  /// `cargo test` with scope, exclusions, externs and env overrides applied
  pub fn test_invocation(&self) -> Invocation {
    let preflight = &self.config.preflight;
    let mut command = vec!["cargo".to_string(), "test".to_string(), "--workspace".to_string()];
    if preflight.unit_tests_only {
      command.extend(["--lib".to_string(), "--bins".to_string()]);
    } else {
      command.push("--all-targets".to_string());
    }
    command.push("--target-dir".to_string());
    command.push(self.staged.target_dir().to_string_lossy().into_owned());

    for name in clean_names(&preflight.exclude) {
      command.push("--exclude".to_string());
      command.push(name);
    }

    let mut env: BTreeMap<String, String> = preflight.env.clone();
    if let Some(flags) = self.rustflags() {
      env.insert("RUSTFLAGS".to_string(), flags);
    }

    Invocation::new(command, self.staged.root())
      .envs(env)
      .timeout(self.config.preflight_timeout())
  }

  /// Inherited RUSTFLAGS (or the configured override) plus one `--extern` per mapping
  fn rustflags(&self) -> Option<String> {
    let externs = &self.config.preflight.externs;
    if externs.is_empty() {
      return None;
    }

    let base = self
      .config
      .preflight
      .env
      .get("RUSTFLAGS")
      .cloned()
      .or_else(|| self.inherited_rustflags.clone())
      .unwrap_or_default();

    let mut parts: Vec<String> = Vec::new();
    if !base.trim().is_empty() {
      parts.push(base.trim().to_string());
    }
    for (name, path) in externs {
      let path = absolute_from(self.staged.root(), path);
      parts.push(format!("--extern {}={}", name, path.display()));
    }
    Some(parts.join(" "))
  }

  fn launch(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    info!(command = %invocation.display(), "running");
    self.runner.run(invocation)
  }

  fn run_step(&self, invocation: &Invocation, summary: &str) -> ShipyardResult<()> {
    let result = self.launch(invocation)?;
    if result.success() {
      return Ok(());
    }
    Err(
      ExecError::CommandFailed {
        summary: summary.to_string(),
        command: invocation.display(),
        exit_code: result.exit_code,
        output: result.failure_output(OUTPUT_TAIL_CHARS),
      }
      .into(),
    )
  }

  /// Existence and tail of each artifact path mentioned in the test output
  fn artifact_report(&self, result: &CommandResult) -> String {
    let Some(pattern) = artifact_pattern() else {
      return String::new();
    };
    let combined = result.combined_output();
    let mut seen = BTreeSet::new();
    let mut report = String::new();

    for found in pattern.find_iter(&combined) {
      let raw = found.as_str();
      if !seen.insert(raw) {
        continue;
      }
      if seen.len() > MAX_ARTIFACTS {
        break;
      }
      let path = absolute_from(self.staged.root(), Path::new(raw));
      debug!(artifact = %path.display(), "inspecting diagnostic artifact");
      report.push_str(&describe_artifact(&path, self.config.preflight.artifact_tail_lines));
    }

    if report.is_empty() {
      report
    } else {
      format!("\n\nDiagnostic artifacts:{}", report)
    }
  }
}

fn describe_artifact(path: &Path, tail_lines: usize) -> String {
  match fs::read(path) {
    Ok(bytes) => {
      let text = String::from_utf8_lossy(&bytes);
      let lines: Vec<&str> = text.lines().collect();
      let start = lines.len().saturating_sub(tail_lines);
      format!(
        "\n- {} (exists, last {} lines):\n{}",
        path.display(),
        lines.len() - start,
        lines[start..].join("\n")
      )
    }
    Err(_) => format!("\n- {} (missing)", path.display()),
  }
}

/// Trimmed, non-blank, deduplicated, sorted
fn clean_names(names: &[String]) -> Vec<String> {
  names
    .iter()
    .map(|n| n.trim())
    .filter(|n| !n.is_empty())
    .map(str::to_string)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}
