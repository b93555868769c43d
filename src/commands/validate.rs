use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::build_plan;

use crate::Context;
use crate::config;
use crate::engine;
use crate::ui;

/// Load and check the stack without touching the provider
pub fn run(ctx: &Context) -> Result<()> {
    let topology = config::load_stack(&ctx.file)?;
    engine::check(&topology)?;
    let plan = build_plan(&topology).context("Could not order resources")?;

    if ctx.quiet {
        return Ok(());
    }

    ui::success(&format!(
        "{} is valid: {} resources, {} outputs",
        ctx.file.display(),
        plan.len(),
        topology.outputs().len()
    ));
    let kinds: Vec<&str> = topology.kinds().iter().map(|k| k.as_str()).collect();
    ui::kv("Stack", &topology.context().name);
    ui::kv("Region", &topology.context().region);
    ui::kv("Kinds", &kinds.join(", ").dimmed().to_string());
    Ok(())
}
