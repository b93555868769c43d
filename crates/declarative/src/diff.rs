//! Diff computation between a plan and observed state

use crate::planner::{Action, Operation, Plan};
use crate::types::{AppliedState, ObservedResource, ResourceId, ResourceKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The effect an operation has against observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Create,
    Update,
    /// Delete then create; the kind cannot be changed in place
    Replace,
    Delete,
    NoChange,
}

impl Change {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    /// Symbol used in plan output
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
            Self::NoChange => "=",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        f.write_str(s)
    }
}

/// Decide what an operation would do given what is observed for it.
pub fn change_for(op: &Operation, observed: Option<&ObservedResource>) -> Change {
    match (op.action, observed) {
        (Action::Ensure, None) => Change::Create,
        (Action::Ensure, Some(current)) if current.fingerprint == op.resource.fingerprint() => {
            Change::NoChange
        }
        (Action::Ensure, Some(_)) if op.kind().is_immutable() => Change::Replace,
        (Action::Ensure, Some(_)) => Change::Update,
        (Action::Delete, Some(_)) => Change::Delete,
        (Action::Delete, None) => Change::NoChange,
    }
}

/// One row of a plan diff
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub change: Change,
    /// Top-level configuration fields that differ from the last applied config
    pub changed_fields: Vec<String>,
    /// Last applied configuration, when the resource exists
    #[serde(skip)]
    pub before: Option<serde_json::Value>,
    /// Desired configuration (absent for deletes)
    #[serde(skip)]
    pub after: Option<serde_json::Value>,
}

/// A plan annotated with the change each operation would cause
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanDiff {
    pub changes: Vec<PlannedChange>,
}

impl PlanDiff {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_changes(&self.changes)
    }

    /// Rows that would mutate something
    pub fn mutations(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes.iter().filter(|c| c.change.is_mutation())
    }
}

/// Annotate every operation of `plan` against `observed`. Pure.
pub fn reconcile(plan: &Plan, observed: &AppliedState) -> PlanDiff {
    let changes = plan
        .iter()
        .map(|op| {
            let current = observed.get(op.id().as_str());
            let change = change_for(op, current);
            let before = current.map(|c| c.config.clone());
            let after = match op.action {
                Action::Ensure => Some(op.resource.config_snapshot()),
                Action::Delete => None,
            };
            let changed_fields = match (change, &before, &after) {
                (Change::Update | Change::Replace, Some(before), Some(after)) => {
                    changed_fields(before, after)
                }
                _ => Vec::new(),
            };
            PlannedChange {
                id: op.id().clone(),
                kind: op.kind(),
                change,
                changed_fields,
                before,
                after,
            }
        })
        .collect();
    PlanDiff { changes }
}

/// Names of top-level object fields whose values differ
fn changed_fields(before: &serde_json::Value, after: &serde_json::Value) -> Vec<String> {
    let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };
    let mut fields: Vec<String> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(value))
        .map(|(key, _)| key.clone())
        .collect();
    fields.extend(
        before
            .keys()
            .filter(|key| !after.contains_key(*key))
            .cloned(),
    );
    fields.sort();
    fields
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn from_changes(changes: &[PlannedChange]) -> Self {
        let mut summary = Self::default();
        for c in changes {
            match c.change {
                Change::Create => summary.creates += 1,
                Change::Update => summary.updates += 1,
                Change::Replace => summary.replaces += 1,
                Change::Delete => summary.deletes += 1,
                Change::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group changes by resource kind
pub fn group_by_kind(changes: &[PlannedChange]) -> BTreeMap<ResourceKind, Vec<&PlannedChange>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&PlannedChange>> = BTreeMap::new();
    for change in changes {
        groups.entry(change.kind).or_default().push(change);
    }
    groups
}
