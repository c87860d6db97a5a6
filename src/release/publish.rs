//! Package and publish each crate in plan order
//!
//! Per crate: `cargo package`, then the publish commands (dry-run first,
//! live, or both). A registry answer that the version "already exists" is
//! not an error: the crate is skipped and the run moves on, so a partly
//! failed release can simply be rerun.

use crate::core::config::PublishConfig;
use crate::core::error::{ExecError, ShipyardError, ShipyardResult};
use crate::exec::{CommandResult, CommandRunner, Invocation};
use crate::release::plan::PublishPlan;
use crate::release::stage::StagedWorkspace;
use std::path::Path;
use tracing::{info, warn};

const OUTPUT_TAIL_CHARS: usize = 4000;

/// Built-in markers for "this version is already on the registry"
pub const ALREADY_PUBLISHED_MARKERS: &[&str] = &["already exists", "already uploaded"];

/// What happened to one crate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
  Published,
  /// Dry run only; nothing was uploaded
  Verified,
  AlreadyPublished,
}

/// Per-crate results, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
  pub outcomes: Vec<(String, PublishOutcome)>,
}

impl PublishReport {
  pub fn count(&self, outcome: &PublishOutcome) -> usize {
    self.outcomes.iter().filter(|(_, o)| o == outcome).count()
  }
}

/// Runs the packaging and publishing commands for a plan
pub struct PublishExecutor<'a> {
  runner: &'a dyn CommandRunner,
  config: &'a PublishConfig,
  live: bool,
}

impl<'a> PublishExecutor<'a> {
  pub fn new(runner: &'a dyn CommandRunner, config: &'a PublishConfig) -> Self {
    Self {
      runner,
      config,
      live: false,
    }
  }

  /// Upload for real instead of stopping at `--dry-run`
  pub fn live(mut self, live: bool) -> Self {
    self.live = live;
    self
  }

  pub fn execute(&self, plan: &PublishPlan, staged: &StagedWorkspace) -> ShipyardResult<PublishReport> {
    let mut report = PublishReport::default();
    let total = plan.publishable.len();

    for (i, package) in plan.publishable.iter().enumerate() {
      let dir = staged.package_dir(&package.name).ok_or_else(|| {
        ShipyardError::message(format!("Crate `{}` has no staged directory", package.name))
      })?;
      println!("📦 [{}/{}] {} {}", i + 1, total, package.name, package.version);

      let outcome = self.publish_one(&package.name, dir)?;
      match outcome {
        PublishOutcome::Published => println!("   ✅ published"),
        PublishOutcome::Verified => println!("   ✅ verified (dry run)"),
        PublishOutcome::AlreadyPublished => println!("   ⏭️  already published, skipped"),
      }
      report.outcomes.push((package.name.clone(), outcome));
    }

    Ok(report)
  }

  fn publish_one(&self, name: &str, dir: &Path) -> ShipyardResult<PublishOutcome> {
    let package = self.invocation(&["package", "--allow-dirty"], dir);
    let result = self.launch(&package)?;
    if !result.success() {
      return Err(failure(format!("Packaging `{}` failed", name), &package, &result));
    }

    for dry_run in self.publish_steps() {
      let args: &[&str] = if dry_run {
        &["publish", "--allow-dirty", "--dry-run"]
      } else {
        &["publish", "--allow-dirty"]
      };
      let publish = self.invocation(args, dir);
      let result = self.launch(&publish)?;
      if result.success() {
        continue;
      }
      if self.is_already_published(&result) {
        warn!(krate = name, "version already exists on the registry; skipping");
        return Ok(PublishOutcome::AlreadyPublished);
      }
      return Err(failure(format!("Publishing `{}` failed", name), &publish, &result));
    }

    Ok(if self.live {
      PublishOutcome::Published
    } else {
      PublishOutcome::Verified
    })
  }

  /// `true` means a `--dry-run` step
  fn publish_steps(&self) -> Vec<bool> {
    match (self.live, self.config.dry_run_first) {
      (true, true) => vec![true, false],
      (true, false) => vec![false],
      (false, _) => vec![true],
    }
  }

  fn invocation(&self, args: &[&str], dir: &Path) -> Invocation {
    let mut command = vec!["cargo".to_string()];
    command.extend(args.iter().map(|a| a.to_string()));
    if let Some(registry) = &self.config.registry {
      command.push("--registry".to_string());
      command.push(registry.clone());
    }
    Invocation::new(command, dir).timeout(self.config.timeout)
  }

  fn launch(&self, invocation: &Invocation) -> ShipyardResult<CommandResult> {
    info!(command = %invocation.display(), cwd = %invocation.cwd.display(), "running");
    self.runner.run(invocation)
  }

  fn is_already_published(&self, result: &CommandResult) -> bool {
    let output = result.combined_output().to_lowercase();
    ALREADY_PUBLISHED_MARKERS
      .iter()
      .map(|m| m.to_string())
      .chain(self.config.extra_already_published_markers.iter().cloned())
      .filter(|m| !m.trim().is_empty())
      .any(|marker| output.contains(&marker.to_lowercase()))
  }
}

fn failure(summary: String, invocation: &Invocation, result: &CommandResult) -> ShipyardError {
  ExecError::CommandFailed {
    summary,
    command: invocation.display(),
    exit_code: result.exit_code,
    output: result.failure_output(OUTPUT_TAIL_CHARS),
  }
  .into()
}
