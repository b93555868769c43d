//! Error types for declarative provisioning.
//!
//! Errors follow the failure stages of a run: [`ConfigError`] before
//! planning, [`CycleError`] while planning, [`ProviderError`] while applying.
//! Provider errors carry an [`ErrorCategory`] so the applier can tell
//! transient failures (retried) from permanent ones.

use crate::types::{ResourceId, ResourceKind};
use thiserror::Error;

/// Malformed input, caught before planning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two resources share a name
    #[error("duplicate resource id: {0}")]
    DuplicateId(ResourceId),

    /// A dependency or reference names a resource that is not registered
    #[error("{resource} references unknown resource '{reference}'")]
    DanglingReference {
        resource: ResourceId,
        reference: ResourceId,
    },

    /// A reference points at a resource of the wrong kind
    #[error("{resource}.{field} must reference a {expected}, but '{target}' is a {found}")]
    WrongKind {
        resource: ResourceId,
        field: &'static str,
        target: ResourceId,
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// Lookup of a resource that does not exist
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// Two outputs share a name
    #[error("duplicate output: {0}")]
    DuplicateOutput(String),

    /// Two outputs share an export name
    #[error("duplicate export name: {0}")]
    DuplicateExport(String),

    /// A data-model invariant does not hold
    #[error("{resource}: {message}")]
    Invariant {
        resource: ResourceId,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invariant(resource: &ResourceId, message: impl Into<String>) -> Self {
        Self::Invariant {
            resource: resource.clone(),
            message: message.into(),
        }
    }
}

/// The dependency graph contains a cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("dependency cycle: {}", format_path(.path))]
pub struct CycleError {
    /// Resources on the cycle, first element repeated at the end
    pub path: Vec<ResourceId>,
}

fn format_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Categories of provider errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure (timeouts, 5xx)
    Transient,
    /// Rate limited by the provider
    Throttled,
    /// Remote object does not exist
    NotFound,
    /// Remote object is in a conflicting state
    Conflict,
    /// Request rejected as invalid
    Invalid,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Whether this category is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Throttled)
    }
}

/// Failure reported by a provider call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transient provider error: {message}")]
    Transient { message: String },

    #[error("throttled: {message}")]
    Throttled { message: String },

    #[error("not found: {id}")]
    NotFound { id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("invalid request: {message}")]
    Invalid { message: String },

    #[error("provider does not support {0} resources")]
    Unsupported(ResourceKind),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Throttled { .. } => ErrorCategory::Throttled,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Invalid { .. } | Self::Unsupported(_) => ErrorCategory::Invalid,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Any error surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The applier could not run (thread pool, stalled plan)
    #[error("executor error: {0}")]
    Executor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
