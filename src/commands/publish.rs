//! `cargo shipyard publish`: plan, stage, preflight and publish as one unit
//!
//! Planning and staging errors abort before any build command runs. Any
//! command failure aborts the run; only "already published" is skipped.

use crate::commands::plan::build_plan;
use crate::core::context::WorkspaceContext;
use crate::core::error::ShipyardResult;
use crate::exec::CommandRunner;
use crate::release::{PreflightRunner, PublishExecutor, PublishOutcome, PublishReport, WorkspaceStager};
use std::path::PathBuf;
use tracing::info;

/// Flags accepted by the publish command
#[derive(Debug, Clone, Default)]
pub struct PublishArgs {
  /// Fail when the workspace has uncommitted changes
  pub forbid_dirty: bool,
  /// Upload for real (otherwise `cargo publish --dry-run`)
  pub live: bool,
  /// Overrides `publish.build_dir`
  pub build_dir: Option<PathBuf>,
}

/// Run the whole pipeline and return what happened to each crate
pub fn publish_workspace(
  ctx: &WorkspaceContext,
  runner: &dyn CommandRunner,
  args: &PublishArgs,
) -> ShipyardResult<PublishReport> {
  let config = &ctx.config;

  let plan = build_plan(ctx)?;
  print!("{}", plan.render());
  if plan.is_empty() {
    println!("Nothing to publish");
    return Ok(PublishReport::default());
  }

  let staged = WorkspaceStager::new(&plan, &config.publish)
    .with_build_dir(args.build_dir.clone())
    .stage()?;
  println!("📁 Staged workspace at {}", staged.root().display());

  info!("running preflight checks");
  PreflightRunner::new(runner, config, ctx.workspace_root(), &staged)
    .forbid_dirty(args.forbid_dirty)
    .run()?;

  info!(live = args.live, "publishing {} crate(s)", plan.publishable.len());
  let report = PublishExecutor::new(runner, &config.publish)
    .live(args.live)
    .execute(&plan, &staged)?;

  Ok(report)
}

/// Run the publish command
pub fn run_publish(ctx: &WorkspaceContext, runner: &dyn CommandRunner, args: PublishArgs) -> ShipyardResult<()> {
  let report = publish_workspace(ctx, runner, &args)?;

  println!();
  println!(
    "🎉 Done: {} published, {} verified, {} already published",
    report.count(&PublishOutcome::Published),
    report.count(&PublishOutcome::Verified),
    report.count(&PublishOutcome::AlreadyPublished)
  );
  if !args.live && !report.outcomes.is_empty() {
    println!("   Dry run only. Re-run with --live to upload.");
  }
  Ok(())
}
