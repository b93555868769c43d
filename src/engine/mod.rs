//! Execution engine for stackform
//!
//! The engine orchestrates:
//! 1. Loading - Parse the stack document and check its invariants
//! 2. Diffing - Reconcile the plan with what the provider reports
//! 3. Executing - Apply the plan in parallel waves with progress output

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, execute, observe, preview};

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{ProviderRegistry, Topology};
use simcloud::{FaultPlan, LocalCloud};
use std::path::PathBuf;
use std::sync::Arc;

use crate::Context;
use crate::{config, paths};

/// A loaded, validated stack and where its state lives
pub struct Stack {
    pub topology: Topology,
    pub state_dir: PathBuf,
}

impl Stack {
    /// Load the stack document named on the command line and validate it.
    pub fn load(ctx: &Context) -> Result<Self> {
        let topology = config::load_stack(&ctx.file)?;
        check(&topology)?;
        let state_dir = paths::state_dir(ctx.state_dir.as_deref())?;
        Ok(Self {
            topology,
            state_dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.topology.context().name
    }

    pub fn cloud_path(&self) -> PathBuf {
        paths::cloud_store(&self.state_dir, self.name())
    }

    pub fn record_path(&self) -> PathBuf {
        paths::run_record(&self.state_dir, self.name())
    }

    /// Open the local provider for this stack, with any faults requested in
    /// the environment.
    pub fn provider(&self) -> Result<ProviderRegistry> {
        let path = self.cloud_path();
        let faults = FaultPlan::from_env().context("Invalid fault injection settings")?;
        let cloud = LocalCloud::open(&path)
            .with_context(|| format!("Could not open provider store: {}", path.display()))?
            .with_faults(faults);
        log::debug!("Provider store: {} ({} objects)", path.display(), cloud.len());
        Ok(Arc::new(cloud).registry())
    }
}

/// Fail with every invariant violation of `topology`, one per line.
pub fn check(topology: &Topology) -> Result<()> {
    let violations = topology.violations();
    if violations.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = violations.iter().map(|v| format!("  - {v}")).collect();
    bail!(
        "Stack has {} invariant violation(s):\n{}",
        violations.len(),
        lines.join("\n")
    )
}
