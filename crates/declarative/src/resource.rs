//! A declared resource: identity plus desired configuration.

use crate::types::{Fingerprint, Reference, ResourceId, ResourceKind, ResourceSpec};

/// A resource as declared in a stack.
///
/// The configuration is desired state; what the provider reports back is an
/// [`ObservedResource`](crate::types::ObservedResource).
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn new(id: impl Into<ResourceId>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Human-readable one-line description
    pub fn description(&self) -> String {
        format!("{} {}", self.kind(), self.id)
    }

    pub fn references(&self) -> Vec<Reference<'_>> {
        self.spec.references()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.spec)
    }

    /// Canonical JSON form of the configuration, stored with observed state.
    pub fn config_snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.spec).unwrap_or(serde_json::Value::Null)
    }
}
