//! Execution engine - applies a plan in dependency waves
//!
//! Operations whose prerequisites have all completed form a wave; a wave runs
//! on a bounded rayon pool. When an operation fails, everything that requires
//! it (directly or transitively) is skipped while independent branches keep
//! going. Nothing is rolled back.

use crate::context::{ProgressCallback, StackContext};
use crate::diff::{Change, change_for};
use crate::error::{Error, ProviderError, Result};
use crate::planner::{Action, Operation, Plan};
use crate::provider::Provider;
use crate::retry::{RetryConfig, with_retry};
use crate::types::{AppliedState, ResourceId, ResourceKind};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Options for applying a plan
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Read only; report what would change
    pub dry_run: bool,
    /// Maximum operations in flight
    pub jobs: usize,
    pub retry: RetryConfig,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Result of a single operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The provider was called and the change made
    Applied { change: Change },
    /// Observed state already matched
    Unchanged,
    /// Dry run: the change that would be made
    Planned { change: Change },
    Failed { error: String },
    /// A prerequisite failed; `because` names the failed operation
    Skipped { because: ResourceId },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether dependents may proceed
    fn unblocks(&self) -> bool {
        matches!(
            self,
            Self::Applied { .. } | Self::Unchanged | Self::Planned { .. }
        )
    }

    /// Short status label for tables and logs
    pub fn label(&self) -> String {
        match self {
            Self::Applied { change } => match change {
                Change::Create => "created".to_string(),
                Change::Update => "updated".to_string(),
                Change::Replace => "replaced".to_string(),
                Change::Delete => "deleted".to_string(),
                Change::NoChange => "unchanged".to_string(),
            },
            Self::Unchanged => "unchanged".to_string(),
            Self::Planned { change } => format!("would {change}"),
            Self::Failed { .. } => "failed".to_string(),
            Self::Skipped { .. } => "skipped".to_string(),
        }
    }
}

/// What happened to one operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub id: ResourceId,
    pub kind: ResourceKind,
    #[serde(skip)]
    pub action: Action,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Provider calls made, retries included
    pub attempts: u32,
}

/// Everything an apply produced
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// One entry per plan operation, in plan order
    pub operations: Vec<OperationReport>,
    /// Observed state of every resource that exists after the run
    pub state: AppliedState,
}

impl ApplyReport {
    pub fn summary(&self) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for report in &self.operations {
            summary.add(&report.outcome);
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        !self.operations.iter().any(|r| r.outcome.is_failure())
    }

    pub fn get(&self, id: &str) -> Option<&OperationReport> {
        self.operations.iter().find(|r| r.id.as_str() == id)
    }
}

/// Summary of apply results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub planned: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplySummary {
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Applied { change } => match change {
                Change::Create => self.created += 1,
                Change::Update => self.updated += 1,
                Change::Replace => self.replaced += 1,
                Change::Delete => self.deleted += 1,
                Change::NoChange => self.unchanged += 1,
            },
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Planned { .. } => self.planned += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Operations that changed something remotely
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.mutations() + self.unchanged + self.planned + self.failed + self.skipped
    }
}

/// Apply `plan` through `provider`.
///
/// Returns an error only when the run itself cannot proceed; provider
/// failures are reported per operation in the [`ApplyReport`].
pub fn apply<P: ProgressCallback + ?Sized>(
    plan: &Plan,
    provider: &dyn Provider,
    opts: &ApplyOptions,
    progress: &mut P,
) -> Result<ApplyReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Executor(format!("failed to create thread pool: {e}")))?;

    let positions: HashMap<&ResourceId, usize> = plan
        .operations
        .iter()
        .enumerate()
        .map(|(i, op)| (op.id(), i))
        .collect();
    let mut outcomes: Vec<Option<(Outcome, u32)>> = vec![None; plan.len()];
    let state = Mutex::new(AppliedState::new());

    while outcomes.iter().any(Option::is_none) {
        let mut wave = Vec::new();
        let mut skipped = Vec::new();
        for (i, op) in plan.operations.iter().enumerate() {
            if outcomes[i].is_some() {
                continue;
            }
            match readiness(op, &positions, &outcomes) {
                Readiness::Waiting => {}
                Readiness::Ready => wave.push(i),
                Readiness::Blocked(because) => skipped.push((i, because)),
            }
        }

        if wave.is_empty() && skipped.is_empty() {
            let stuck: Vec<&str> = plan
                .operations
                .iter()
                .zip(&outcomes)
                .filter(|(_, o)| o.is_none())
                .map(|(op, _)| op.id().as_str())
                .collect();
            return Err(Error::Executor(format!(
                "plan stalled with unmet requirements: {}",
                stuck.join(", ")
            )));
        }

        for (i, because) in skipped {
            let op = &plan.operations[i];
            log::debug!("Skipping {}: {because} did not complete", op.id());
            let outcome = Outcome::Skipped { because };
            progress.on_operation_complete(op.id(), &outcome);
            outcomes[i] = Some((outcome, 0));
        }

        if wave.is_empty() {
            continue;
        }

        progress.on_wave_start(wave.len());
        for &i in &wave {
            let op = &plan.operations[i];
            progress.on_operation_start(op.id(), &op.resource.description());
        }

        let results: Vec<(usize, Outcome, u32)> = pool.install(|| {
            wave.par_iter()
                .map(|&i| {
                    let (outcome, attempts) =
                        run_operation(&plan.operations[i], &plan.context, provider, opts, &state);
                    (i, outcome, attempts)
                })
                .collect()
        });

        for (i, outcome, attempts) in results {
            progress.on_operation_complete(plan.operations[i].id(), &outcome);
            outcomes[i] = Some((outcome, attempts));
        }
        progress.on_wave_complete();
    }

    let operations = plan
        .operations
        .iter()
        .zip(outcomes)
        .filter_map(|(op, result)| {
            result.map(|(outcome, attempts)| OperationReport {
                id: op.id().clone(),
                kind: op.kind(),
                action: op.action,
                outcome,
                attempts,
            })
        })
        .collect();

    Ok(ApplyReport {
        operations,
        state: into_state(state),
    })
}

enum Readiness {
    Waiting,
    Ready,
    Blocked(ResourceId),
}

fn readiness(
    op: &Operation,
    positions: &HashMap<&ResourceId, usize>,
    outcomes: &[Option<(Outcome, u32)>],
) -> Readiness {
    let mut waiting = false;
    for required in &op.requires {
        // Requirements cut from the plan by a target filter count as met
        let Some(&position) = positions.get(required) else {
            continue;
        };
        match &outcomes[position] {
            None => waiting = true,
            Some((outcome, _)) if outcome.unblocks() => {}
            Some((Outcome::Skipped { because }, _)) => {
                return Readiness::Blocked(because.clone());
            }
            Some(_) => return Readiness::Blocked(required.clone()),
        }
    }
    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

/// Run one operation to completion, returning its outcome and attempt count
fn run_operation(
    op: &Operation,
    ctx: &StackContext,
    provider: &dyn Provider,
    opts: &ApplyOptions,
    state: &Mutex<AppliedState>,
) -> (Outcome, u32) {
    let mut attempts = 0;
    let outcome = match converge(op, ctx, provider, opts, state, &mut attempts) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::debug!("{} failed: {e}", op.resource.description());
            Outcome::Failed {
                error: e.to_string(),
            }
        }
    };
    (outcome, attempts)
}

fn converge(
    op: &Operation,
    ctx: &StackContext,
    provider: &dyn Provider,
    opts: &ApplyOptions,
    state: &Mutex<AppliedState>,
    attempts: &mut u32,
) -> std::result::Result<Outcome, ProviderError> {
    let capability = provider.capability(op.kind())?;
    let label = op.resource.description();
    let resource = &op.resource;

    let observed = retried(opts, attempts, format!("read {label}"), || {
        capability.read(ctx, resource)
    })?;
    let change = change_for(op, observed.as_ref());
    log::debug!("{label}: {change}");

    if opts.dry_run {
        if let Some(current) = observed {
            lock_state(state).insert(current);
        }
        return Ok(match change {
            Change::NoChange => Outcome::Unchanged,
            change => Outcome::Planned { change },
        });
    }

    let deps = lock_state(state).subset(&op.requires);
    let applied = match (change, observed) {
        (Change::NoChange, current) => {
            if let Some(current) = current {
                lock_state(state).insert(current);
            }
            return Ok(Outcome::Unchanged);
        }
        (Change::Create, _) => retried(opts, attempts, format!("create {label}"), || {
            capability.create(ctx, resource, &deps)
        })?,
        (Change::Update, Some(current)) => {
            retried(opts, attempts, format!("update {label}"), || {
                capability.update(ctx, resource, &current, &deps)
            })?
        }
        (Change::Replace, Some(current)) => {
            retried(opts, attempts, format!("delete {label}"), || {
                capability.delete(ctx, &current)
            })?;
            retried(opts, attempts, format!("create {label}"), || {
                capability.create(ctx, resource, &deps)
            })?
        }
        (Change::Delete, Some(current)) => {
            retried(opts, attempts, format!("delete {label}"), || {
                capability.delete(ctx, &current)
            })?;
            lock_state(state).remove(op.id().as_str());
            return Ok(Outcome::Applied { change });
        }
        (change, None) => {
            return Err(ProviderError::Other(format!(
                "cannot {change} {label}: nothing observed"
            )));
        }
    };

    lock_state(state).insert(applied);
    Ok(Outcome::Applied { change })
}

/// Run a provider call under the retry policy, counting its attempts
fn retried<T>(
    opts: &ApplyOptions,
    attempts: &mut u32,
    label: String,
    call: impl FnMut() -> std::result::Result<T, ProviderError>,
) -> std::result::Result<T, ProviderError> {
    let outcome = with_retry(&opts.retry, &label, call);
    *attempts += outcome.attempts;
    outcome.result
}

fn lock_state(state: &Mutex<AppliedState>) -> MutexGuard<'_, AppliedState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn into_state(state: Mutex<AppliedState>) -> AppliedState {
    match state.into_inner() {
        Ok(state) => state,
        Err(poisoned) => poisoned.into_inner(),
    }
}
