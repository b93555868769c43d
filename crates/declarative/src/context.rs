//! Stack context and progress callbacks
//!
//! The context is threaded explicitly through topology, planning and apply;
//! there is no global stack object.

use crate::executor::Outcome;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};

/// Identity of the stack being provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContext {
    pub name: String,
    pub region: String,
    pub account: String,
}

impl StackContext {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            account: account.into(),
        }
    }
}

impl Default for StackContext {
    fn default() -> Self {
        Self::new("default", "us-east-1", "000000000000")
    }
}

/// Progress callback for apply operations
///
/// Implement this trait to receive progress updates during execution.
/// Operations run in waves; every operation of a wave has its
/// prerequisites complete.
pub trait ProgressCallback: Send {
    /// Called when a wave of ready operations starts
    fn on_wave_start(&mut self, count: usize);

    /// Called before an operation is dispatched
    fn on_operation_start(&mut self, id: &ResourceId, description: &str);

    /// Called when an operation finishes, is skipped, or fails
    fn on_operation_complete(&mut self, id: &ResourceId, outcome: &Outcome);

    /// Called when a wave completes
    fn on_wave_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _count: usize) {}
    fn on_operation_start(&mut self, _id: &ResourceId, _description: &str) {}
    fn on_operation_complete(&mut self, _id: &ResourceId, _outcome: &Outcome) {}
    fn on_wave_complete(&mut self) {}
}
