use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::Utc;
use declarative::{CollectedOutputs, build_destroy_plan};

use crate::Context;
use crate::cli::DestroyArgs;
use crate::engine::{self, ExecuteOptions, Stack};
use crate::state::{RunKind, RunRecord};
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let stack = Stack::load(ctx)?;
    let plan = build_destroy_plan(&stack.topology)
        .context("Could not order resources")?
        .filter_by_target(args.target.as_deref());

    if plan.is_empty() {
        super::nothing_targeted(args.target.as_deref());
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Destroying {}", stack.name()));
        if args.target.is_some() {
            ui::warn("Resources that depend on the target are deleted too");
        }
    }

    let provider = stack.provider()?;
    let opts = ExecuteOptions {
        dry_run: false,
        jobs: args.jobs,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
    };

    let started_at = Utc::now();
    let Some(report) = engine::execute(&plan, &provider, &opts)? else {
        return Ok(());
    };

    let record = RunRecord::from_report(
        stack.name(),
        RunKind::Destroy,
        started_at,
        &report,
        &CollectedOutputs::default(),
    );
    record.save(&stack.record_path())?;

    if !report.is_success() {
        let summary = report.summary();
        bail!(
            "{} resources could not be deleted ({} skipped)",
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}
