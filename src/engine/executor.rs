//! Execution engine - runs a plan against the provider with UI integration

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    AppliedState, ApplyOptions, ApplyReport, ApplySummary, NoProgress, Outcome, Plan, PlanDiff,
    Provider, apply, reconcile,
};

use super::differ::display_diff;
use crate::progress::ApplyProgress;
use crate::ui;

/// Options for a CLI run (includes `yes` for confirmation skip)
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            verbose: false,
            quiet: false,
        }
    }
}

/// Read what the provider currently has for every operation of `plan`.
///
/// This is a dry run of the plan: reads only, and resources whose
/// prerequisites could not be read are left out.
pub fn observe(plan: &Plan, provider: &dyn Provider, jobs: usize) -> Result<AppliedState> {
    let opts = ApplyOptions {
        dry_run: true,
        jobs,
        ..ApplyOptions::default()
    };
    let report =
        apply(plan, provider, &opts, &mut NoProgress).context("Failed to read observed state")?;
    for op in &report.operations {
        if let Outcome::Failed { error } = &op.outcome {
            log::warn!("Could not read {}: {error}", op.id);
        }
    }
    Ok(report.state)
}

/// Diff a plan against observed state
pub fn preview(plan: &Plan, provider: &dyn Provider, jobs: usize) -> Result<PlanDiff> {
    let observed = observe(plan, provider, jobs)?;
    Ok(reconcile(plan, &observed))
}

/// Show the diff, confirm, then apply `plan`.
///
/// Returns `None` when the user declines.
pub fn execute(
    plan: &Plan,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
) -> Result<Option<ApplyReport>> {
    let diff = preview(plan, provider, opts.jobs)?;
    let summary = diff.summary();
    if !opts.quiet {
        display_diff(&diff, false, opts.verbose);
    }

    let needs_confirmation = summary.has_changes() && !opts.dry_run && !opts.yes;
    if needs_confirmation && !confirm_proceed(summary.total())? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    let apply_opts = ApplyOptions {
        dry_run: opts.dry_run,
        jobs: opts.jobs,
        ..ApplyOptions::default()
    };

    if summary.has_changes() && !opts.quiet {
        println!();
        println!(
            "  {} {} {} operations ({} jobs)...",
            "→".cyan(),
            if opts.dry_run { "Checking" } else { "Applying" },
            plan.len(),
            opts.jobs
        );
    }

    let hidden = opts.quiet || !summary.has_changes();
    let mut progress = ApplyProgress::new(plan.len(), hidden, opts.verbose);
    let report = apply(plan, provider, &apply_opts, &mut progress);
    progress.finish();
    let report = report.context("Apply did not run to completion")?;

    if !opts.quiet {
        if opts.verbose || !report.is_success() {
            print_status_table(&report);
        }
        print_summary(&report.summary(), opts.dry_run);
    }
    Ok(Some(report))
}

/// Confirm with user
fn confirm_proceed(changes: usize) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(format!("Apply {changes} changes?"))
        .default(false)
        .interact()
        .context("Could not prompt for confirmation (use --yes to skip it)")?;

    Ok(confirmed)
}

/// Print one row per operation: status, attempts, and what went wrong
pub fn print_status_table(report: &ApplyReport) {
    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Resource Status".bold()
    );
    for op in &report.operations {
        let physical = report
            .state
            .get(op.id.as_str())
            .map(|o| ui::truncate_middle(&o.physical_id, 32))
            .unwrap_or_default();
        let attempts = if op.attempts > 1 {
            format!(" [{} attempts]", op.attempts).yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "│ {} {:<28} {:<20} {:<14} {}{}",
            ui::outcome_symbol(&op.outcome),
            op.id.as_str(),
            op.kind.as_str().dimmed(),
            ui::outcome_label(&op.outcome),
            physical.dimmed(),
            attempts
        );
        match &op.outcome {
            Outcome::Failed { error } => println!("│     {}", error.red()),
            Outcome::Skipped { because } => {
                let reason = format!("requires {because}, which did not complete");
                println!("│     {}", reason.dimmed());
            }
            _ => {}
        }
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print final summary
fn print_summary(summary: &ApplySummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!("  {} Stack applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} resources updated", summary.updated);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.deleted > 0 {
        println!("    • {} resources deleted", summary.deleted);
    }
    if summary.planned > 0 {
        println!("    • {} resources would change", summary.planned);
    }
    if summary.unchanged > 0 {
        println!("    • {} resources unchanged", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{
        IamRoleConfig, ResourceSpec, StackContext, Topology, build_destroy_plan, build_plan,
    };
    use simcloud::LocalCloud;
    use std::sync::Arc;

    fn roles() -> Topology {
        let mut t = Topology::new(StackContext::new("test", "us-east-1", "123456789012"));
        let role = |svc: &str| {
            ResourceSpec::IamRole(IamRoleConfig {
                assumed_by: svc.to_string(),
                managed_policies: vec![],
            })
        };
        t.add_resource("a", role("ec2.amazonaws.com"), &[]).unwrap();
        t.add_resource("b", role("ecs.amazonaws.com"), &["a".into()]).unwrap();
        t
    }

    fn quiet(yes: bool) -> ExecuteOptions {
        ExecuteOptions {
            yes,
            quiet: true,
            ..ExecuteOptions::default()
        }
    }

    #[test]
    fn test_observe_empty_cloud() {
        let cloud = Arc::new(LocalCloud::in_memory());
        let plan = build_plan(&roles()).unwrap();
        let observed = observe(&plan, &cloud.registry(), 2).unwrap();
        assert!(observed.is_empty());

        let diff = preview(&plan, &cloud.registry(), 2).unwrap();
        assert_eq!(diff.summary().creates, 2);
    }

    #[test]
    fn test_execute_then_nothing_to_do() {
        let cloud = Arc::new(LocalCloud::in_memory());
        let provider = cloud.registry();
        let plan = build_plan(&roles()).unwrap();

        let report = execute(&plan, &provider, &quiet(true)).unwrap().unwrap();
        assert_eq!(report.summary().created, 2);
        assert_eq!(cloud.len(), 2);

        // No changes: no confirmation needed even without --yes
        let report = execute(&plan, &provider, &quiet(false)).unwrap().unwrap();
        assert_eq!(report.summary().unchanged, 2);
        assert_eq!(report.state.len(), 2);

        let destroy = build_destroy_plan(&roles()).unwrap();
        let report = execute(&destroy, &provider, &quiet(true)).unwrap().unwrap();
        assert_eq!(report.summary().deleted, 2);
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_dry_run_needs_no_confirmation() {
        let cloud = Arc::new(LocalCloud::in_memory());
        let plan = build_plan(&roles()).unwrap();
        let opts = ExecuteOptions {
            dry_run: true,
            quiet: true,
            ..ExecuteOptions::default()
        };
        let report = execute(&plan, &cloud.registry(), &opts).unwrap().unwrap();
        assert_eq!(report.summary().planned, 2);
        assert!(cloud.is_empty());
    }
}
