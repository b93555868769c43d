//! Run records
//!
//! After every apply or destroy the CLI writes `<stack>.state.toml` next to
//! the provider store: when the run happened, what it did to each resource,
//! and the outputs it could resolve afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ApplyReport, CollectedOutputs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What the last run was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Apply,
    Destroy,
}

/// Status of one resource in the last run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    #[serde(default = "one")]
    pub attempts: u32,
}

const fn one() -> u32 {
    1
}

/// Record of the last run against a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub stack: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,

    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Export name -> value
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
}

impl RunRecord {
    /// Build a record from an apply report
    pub fn from_report(
        stack: &str,
        kind: RunKind,
        started_at: DateTime<Utc>,
        report: &ApplyReport,
        outputs: &CollectedOutputs,
    ) -> Self {
        let resources = report
            .operations
            .iter()
            .map(|op| {
                let record = ResourceRecord {
                    kind: op.kind.to_string(),
                    status: op.outcome.label(),
                    physical_id: report
                        .state
                        .get(op.id.as_str())
                        .map(|o| o.physical_id.clone()),
                    attempts: op.attempts,
                };
                (op.id.to_string(), record)
            })
            .collect();

        Self {
            stack: stack.to_string(),
            kind,
            started_at,
            finished_at: Utc::now(),
            success: report.is_success(),
            resources,
            outputs: outputs.values.clone(),
            exports: outputs.exports.clone(),
        }
    }

    /// Load the record at `path`, or `None` if no run has been recorded
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("No run record at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        let record: RunRecord = toml::from_str(&content)
            .with_context(|| format!("Failed to parse run record: {}", path.display()))?;

        log::debug!("Loaded run record from {}", path.display());
        Ok(Some(record))
    }

    /// Save the record to `path`
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize run record")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write run record: {}", path.display()))?;

        log::debug!("Saved run record to {}", path.display());
        Ok(path.to_path_buf())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
