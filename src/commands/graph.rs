use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::build_plan;

use crate::Context;
use crate::config;
use crate::ui;

/// Print resources in plan order, each with what it requires
pub fn run(ctx: &Context) -> Result<()> {
    let topology = config::load_stack(&ctx.file)?;
    let plan = build_plan(&topology).context("Could not order resources")?;

    ui::header(&format!("{} ({} resources)", topology.context().name, plan.len()));
    let width = plan.len().to_string().len();
    for (i, op) in plan.iter().enumerate() {
        println!(
            "  {:>width$}. {:<28} {}",
            i + 1,
            op.id().as_str(),
            op.kind().as_str().dimmed()
        );
        if !op.requires.is_empty() {
            let requires: Vec<&str> = op.requires.iter().map(|r| r.as_str()).collect();
            println!("  {:>width$}  {} {}", "", "←".cyan(), requires.join(", "));
        }
        if ctx.verbose > 0 {
            let dependents = topology.dependents(op.id().as_str());
            if !dependents.is_empty() {
                let names: Vec<&str> = dependents.iter().map(|r| r.as_str()).collect();
                println!("  {:>width$}  {} {}", "", "→".dimmed(), names.join(", ").dimmed());
            }
        }
    }
    Ok(())
}
