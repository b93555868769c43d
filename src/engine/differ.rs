//! Plan diff display

use colored::Colorize;
use declarative::{Change, PlanDiff, PlannedChange, ResourceKind, group_by_kind};

use crate::ui;

fn kind_title(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Network => "Networks",
        ResourceKind::Subnet => "Subnets",
        ResourceKind::SecurityGroup => "Security groups",
        ResourceKind::Instance => "Instances",
        ResourceKind::LaunchTemplate => "Launch templates",
        ResourceKind::LoadBalancer => "Load balancers",
        ResourceKind::TargetGroup => "Target groups",
        ResourceKind::AutoScalingGroup => "Auto-scaling groups",
        ResourceKind::IamRole => "IAM roles",
        ResourceKind::InstanceProfile => "Instance profiles",
        ResourceKind::GatewayEndpoint => "Gateway endpoints",
    }
}

fn describe(change: &PlannedChange) -> String {
    match change.change {
        Change::Create => "(not provisioned)".to_string(),
        Change::Delete => "(will delete)".to_string(),
        Change::NoChange => "(up to date)".to_string(),
        Change::Update | Change::Replace if change.changed_fields.is_empty() => {
            "(configuration changed)".to_string()
        }
        Change::Update => format!("changed: {}", change.changed_fields.join(", ")),
        Change::Replace => format!(
            "changed: {} (forces replacement)",
            change.changed_fields.join(", ")
        ),
    }
}

/// Display a plan diff grouped by kind.
///
/// Unchanged resources are listed only when `show_unchanged` is set. With
/// `show_config`, updates and replacements also print a line diff of the
/// last applied configuration against the desired one.
pub fn display_diff(diff: &PlanDiff, show_unchanged: bool, show_config: bool) {
    let summary = diff.summary();
    if !summary.has_changes() && !show_unchanged {
        println!();
        println!(
            "  {} No changes. {} resources up to date.",
            "✓".green(),
            summary.unchanged
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Stack Plan".bold()
    );
    println!("│");

    for (kind, changes) in group_by_kind(&diff.changes) {
        let shown: Vec<_> = changes
            .into_iter()
            .filter(|c| show_unchanged || c.change.is_mutation())
            .collect();
        if shown.is_empty() {
            continue;
        }
        println!("│ {}", kind_title(kind).bold());

        for change in shown {
            println!(
                "│   {:<3} {:<30} {}",
                ui::change_symbol(change.change),
                change.id.as_str(),
                describe(change).dimmed()
            );
            if show_config && matches!(change.change, Change::Update | Change::Replace) {
                print_config_diff(change);
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replaces.to_string().magenta(),
        summary.deletes.to_string().red(),
        summary.unchanged.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print a line diff of the pretty-printed configurations
fn print_config_diff(change: &PlannedChange) {
    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        return;
    };
    let (Ok(before), Ok(after)) = (
        serde_json::to_string_pretty(before),
        serde_json::to_string_pretty(after),
    ) else {
        return;
    };

    let before = before + "\n";
    let after = after + "\n";
    let diff = similar::TextDiff::from_lines(&before, &after);
    for line in diff.iter_all_changes() {
        match line.tag() {
            similar::ChangeTag::Delete => print!("│       {}", format!("- {line}").red()),
            similar::ChangeTag::Insert => print!("│       {}", format!("+ {line}").green()),
            similar::ChangeTag::Equal => {}
        }
    }
}
