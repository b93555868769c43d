use anyhow::{Context as AnyhowContext, Result};
use declarative::build_plan;

use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::{self, Stack, differ};
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let stack = Stack::load(ctx)?;
    let plan = build_plan(&stack.topology)
        .context("Could not order resources")?
        .filter_by_target(args.target.as_deref());

    if plan.is_empty() {
        super::nothing_targeted(args.target.as_deref());
        return Ok(());
    }

    let provider = stack.provider()?;
    let diff = engine::preview(&plan, &provider, 4)?;

    if !ctx.quiet {
        ui::header(&format!(
            "Plan for {} ({}, {})",
            stack.name(),
            stack.topology.context().region,
            stack.topology.context().account
        ));
    }
    differ::display_diff(&diff, ctx.verbose > 0, ctx.verbose > 0);
    Ok(())
}
