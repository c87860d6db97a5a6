//! `cargo shipyard plan`: print the publish plan and stop

use crate::core::context::WorkspaceContext;
use crate::core::error::ShipyardResult;
use crate::release::{PublishPlan, PublishPlanner};

/// Resolve the plan for the workspace in `ctx`
pub fn build_plan(ctx: &WorkspaceContext) -> ShipyardResult<PublishPlan> {
  PublishPlanner::new(&ctx.graph, &ctx.config.publish).plan()
}

/// Run the plan command
pub fn run_plan(ctx: &WorkspaceContext) -> ShipyardResult<()> {
  let plan = build_plan(ctx)?;
  print!("{}", plan.render());
  Ok(())
}
