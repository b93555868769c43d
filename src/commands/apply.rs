use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::Utc;
use declarative::{build_plan, collect};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ExecuteOptions, Stack};
use crate::state::{RunKind, RunRecord};
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let stack = Stack::load(ctx)?;
    let plan = build_plan(&stack.topology)
        .context("Could not order resources")?
        .filter_by_target(args.target.as_deref());

    if plan.is_empty() {
        super::nothing_targeted(args.target.as_deref());
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Applying {}", stack.name()));
    }

    let provider = stack.provider()?;
    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
    };

    let started_at = Utc::now();
    let Some(report) = engine::execute(&plan, &provider, &opts)? else {
        return Ok(());
    };

    let summary = report.summary();
    if args.dry_run {
        if !summary.is_success() {
            bail!("{} resources could not be read", summary.failed);
        }
        return Ok(());
    }

    let outputs = collect(stack.topology.outputs(), &report.state);
    if !ctx.quiet {
        super::output::print_outputs(stack.topology.outputs(), &outputs);
    }

    let record = RunRecord::from_report(stack.name(), RunKind::Apply, started_at, &report, &outputs);
    let path = record.save(&stack.record_path())?;
    log::info!("Run record written to {}", path.display());

    if !report.is_success() {
        bail!(
            "{} of {} operations failed ({} skipped)",
            summary.failed,
            summary.total(),
            summary.skipped
        );
    }
    Ok(())
}
