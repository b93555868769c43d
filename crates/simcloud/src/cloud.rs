//! The local cloud: an object store with per-kind CRUD handlers

use crate::attributes::{Seed, physical_id, synthesize};
use crate::faults::FaultPlan;
use declarative::{
    AppliedState, Capability, ObservedResource, ProviderError, ProviderRegistry, Resource,
    ResourceId, ResourceKind, StackContext,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything the cloud knows, as persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Store {
    #[serde(default)]
    objects: BTreeMap<ResourceId, ObservedResource>,
    /// Times each resource has been created; seeds its identifiers
    #[serde(default)]
    generations: BTreeMap<ResourceId, u64>,
}

/// A simulated cloud, in memory or backed by a JSON file.
///
/// Every successful mutation is written through to the file, so a later
/// process sees what an earlier one created.
#[derive(Debug)]
pub struct LocalCloud {
    path: Option<PathBuf>,
    store: Mutex<Store>,
    faults: FaultPlan,
}

impl LocalCloud {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            store: Mutex::new(Store::default()),
            faults: FaultPlan::none(),
        }
    }

    /// Open the store at `path`; a missing file is an empty cloud.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            Store::default()
        };
        log::debug!("Opened local cloud store {}", path.display());
        Ok(Self {
            path: Some(path),
            store: Mutex::new(store),
            faults: FaultPlan::none(),
        })
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Provider with a handler for every kind, sharing this cloud.
    pub fn registry(self: &Arc<Self>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for kind in ResourceKind::ALL {
            registry.register(
                kind,
                KindHandler {
                    cloud: Arc::clone(self),
                    kind,
                },
            );
        }
        registry
    }

    /// Every stored object
    pub fn snapshot(&self) -> AppliedState {
        self.lock().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Write the store to disk. Caller holds the lock.
    fn persist(&self, store: &Store) -> Result<(), ProviderError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_store(path, store).map_err(|e| ProviderError::Other(e.to_string()))
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Store) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut store = self.lock();
        let mut next = store.clone();
        let value = apply(&mut next)?;
        self.persist(&next)?;
        *store = next;
        Ok(value)
    }
}

fn write_store(path: &Path, store: &Store) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|source| StoreError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// CRUD for one kind against a shared [`LocalCloud`]
#[derive(Debug)]
pub struct KindHandler {
    cloud: Arc<LocalCloud>,
    kind: ResourceKind,
}

impl KindHandler {
    fn ensure_kind(&self, resource: &Resource) -> Result<(), ProviderError> {
        if resource.kind() == self.kind {
            Ok(())
        } else {
            Err(ProviderError::Invalid {
                message: format!(
                    "{} handler cannot manage {}",
                    self.kind,
                    resource.description()
                ),
            })
        }
    }

    fn check_references(resource: &Resource, deps: &AppliedState) -> Result<(), ProviderError> {
        for reference in resource.references() {
            match deps.get(reference.target.as_str()) {
                Some(observed) if observed.kind == reference.expects => {}
                Some(observed) => {
                    return Err(ProviderError::Invalid {
                        message: format!(
                            "{}.{} names {} which is a {}",
                            resource.id, reference.field, reference.target, observed.kind
                        ),
                    });
                }
                None => {
                    return Err(ProviderError::NotFound {
                        id: reference.target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn observe(
        ctx: &StackContext,
        resource: &Resource,
        physical_id: String,
        seed: &Seed,
        deps: &AppliedState,
    ) -> Result<ObservedResource, ProviderError> {
        let attributes = synthesize(ctx, resource, &physical_id, seed, deps)?;
        Ok(ObservedResource {
            id: resource.id.clone(),
            kind: resource.kind(),
            physical_id,
            fingerprint: resource.fingerprint(),
            attributes,
            config: resource.config_snapshot(),
        })
    }
}

impl Capability for KindHandler {
    fn create(
        &self,
        ctx: &StackContext,
        resource: &Resource,
        deps: &AppliedState,
    ) -> Result<ObservedResource, ProviderError> {
        self.ensure_kind(resource)?;
        self.cloud.faults.check(resource.id.as_str(), "create")?;
        Self::check_references(resource, deps)?;

        let observed = self.cloud.mutate(|store| {
            if let Some(existing) = store.objects.get(&resource.id) {
                return Err(ProviderError::Conflict {
                    message: format!("{} already exists as {}", resource.id, existing.physical_id),
                });
            }
            let generation = store.generations.entry(resource.id.clone()).or_insert(0);
            let seed = Seed::new(ctx, &resource.id, *generation);
            *generation += 1;
            let observed = Self::observe(ctx, resource, physical_id(ctx, resource, &seed), &seed, deps)?;
            store.objects.insert(resource.id.clone(), observed.clone());
            Ok(observed)
        })?;
        log::info!("Created {} ({})", resource.description(), observed.physical_id);
        Ok(observed)
    }

    fn read(
        &self,
        _ctx: &StackContext,
        resource: &Resource,
    ) -> Result<Option<ObservedResource>, ProviderError> {
        self.ensure_kind(resource)?;
        let store = self.cloud.lock();
        Ok(store
            .objects
            .get(&resource.id)
            .filter(|o| o.kind == self.kind)
            .cloned())
    }

    fn update(
        &self,
        ctx: &StackContext,
        resource: &Resource,
        current: &ObservedResource,
        deps: &AppliedState,
    ) -> Result<ObservedResource, ProviderError> {
        self.ensure_kind(resource)?;
        if self.kind.is_immutable() {
            return Err(ProviderError::Invalid {
                message: format!("{} cannot be updated in place", resource.description()),
            });
        }
        self.cloud.faults.check(resource.id.as_str(), "update")?;
        Self::check_references(resource, deps)?;

        let observed = self.cloud.mutate(|store| {
            if !store.objects.contains_key(&resource.id) {
                return Err(ProviderError::NotFound {
                    id: current.physical_id.clone(),
                });
            }
            let generation = store
                .generations
                .get(&resource.id)
                .map_or(0, |g| g.saturating_sub(1));
            let seed = Seed::new(ctx, &resource.id, generation);
            let observed =
                Self::observe(ctx, resource, current.physical_id.clone(), &seed, deps)?;
            store.objects.insert(resource.id.clone(), observed.clone());
            Ok(observed)
        })?;
        log::info!("Updated {} ({})", resource.description(), observed.physical_id);
        Ok(observed)
    }

    fn delete(&self, _ctx: &StackContext, current: &ObservedResource) -> Result<(), ProviderError> {
        self.cloud.faults.check(current.id.as_str(), "delete")?;
        self.cloud.mutate(|store| match store.objects.remove(&current.id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                id: current.physical_id.clone(),
            }),
        })?;
        log::info!("Deleted {} {} ({})", current.kind, current.id, current.physical_id);
        Ok(())
    }
}
