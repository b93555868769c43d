//! Provider capability interface
//!
//! A provider implements create/read/update/delete once per resource kind.
//! The applier never talks to a cloud directly; it resolves the capability for
//! an operation's kind and calls through it.

use crate::context::StackContext;
use crate::error::ProviderError;
use crate::resource::Resource;
use crate::types::{AppliedState, ObservedResource, ResourceKind};
use std::collections::HashMap;

/// CRUD operations for one resource kind.
///
/// `deps` holds the observed state of the resources `resource` depends on,
/// so a capability can resolve physical ids and addresses of its references.
pub trait Capability: Send + Sync {
    fn create(
        &self,
        ctx: &StackContext,
        resource: &Resource,
        deps: &AppliedState,
    ) -> Result<ObservedResource, ProviderError>;

    /// Current remote state, `None` when the resource does not exist.
    fn read(
        &self,
        ctx: &StackContext,
        resource: &Resource,
    ) -> Result<Option<ObservedResource>, ProviderError>;

    fn update(
        &self,
        ctx: &StackContext,
        resource: &Resource,
        current: &ObservedResource,
        deps: &AppliedState,
    ) -> Result<ObservedResource, ProviderError>;

    fn delete(&self, ctx: &StackContext, current: &ObservedResource)
    -> Result<(), ProviderError>;
}

/// Source of capabilities, one per supported kind.
pub trait Provider: Send + Sync {
    fn capability(&self, kind: ResourceKind) -> Result<&dyn Capability, ProviderError>;
}

/// Provider assembled from individually registered capabilities
#[derive(Default)]
pub struct ProviderRegistry {
    capabilities: HashMap<ResourceKind, Box<dyn Capability>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the capability for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: ResourceKind, capability: impl Capability + 'static) {
        self.capabilities.insert(kind, Box::new(capability));
    }

    pub fn with(mut self, kind: ResourceKind, capability: impl Capability + 'static) -> Self {
        self.register(kind, capability);
        self
    }
}

impl Provider for ProviderRegistry {
    fn capability(&self, kind: ResourceKind) -> Result<&dyn Capability, ProviderError> {
        self.capabilities
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or(ProviderError::Unsupported(kind))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.capabilities.keys().collect();
        kinds.sort();
        f.debug_struct("ProviderRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}
