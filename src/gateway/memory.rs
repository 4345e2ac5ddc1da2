//! In-memory simulated provider.
//!
//! `MemoryGateway` keeps provider state in process, journals every call it
//! receives, and can be told to fail the next call of a given operation.
//! The CLI runs against it (persisted through the local state store) and
//! the tests assert on its journal.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::resource::{Diffable, ObservedState, Resource, Tags};

use super::{GatewayResult, Operation, ProviderGateway};

/// Kinds the simulated provider can host.
pub trait Simulated: Resource {
    /// Prefix of generated identifiers.
    const ID_PREFIX: &'static str;

    /// Builds the provider state for a freshly created resource.
    fn materialize(&self, identifier: &str) -> Self::Current;

    /// Applies one change to provider state.
    fn apply(current: &mut Self::Current, change: &Self::Change);

    /// Mutable access to the provider-side tags.
    fn tags_mut(current: &mut Self::Current) -> &mut Tags;

    /// Quiesces the resource. Returns false if the kind cannot be stopped.
    fn stop(current: &mut Self::Current) -> bool {
        let _ = current;
        false
    }
}

/// One journaled gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call<C> {
    /// Presence check for a key.
    Exists(String),
    /// Create for a natural key.
    Create(String),
    /// Current state read for a key.
    Get(String),
    /// One change applied to an identifier.
    Update {
        /// Target identifier.
        identifier: String,
        /// The change applied.
        change: C,
    },
    /// Deletion of an identifier.
    Delete {
        /// Target identifier.
        identifier: String,
        /// Final snapshot taken before deletion.
        final_snapshot_id: Option<String>,
    },
    /// Quiesce of an identifier.
    Stop(String),
    /// Tag upsert.
    Tag {
        /// Target identifier.
        identifier: String,
        /// Tags written.
        tags: Tags,
    },
    /// Tag removal.
    Untag {
        /// Target identifier.
        identifier: String,
        /// Keys removed.
        keys: Vec<String>,
    },
}

/// Simulated provider for a single resource kind.
#[derive(Debug)]
pub struct MemoryGateway<R: Simulated> {
    /// Provider state keyed by identifier.
    resources: Mutex<BTreeMap<String, R::Current>>,
    /// Every call received, in order.
    journal: Mutex<Vec<Call<R::Change>>>,
    /// One-shot failures keyed by operation.
    faults: Mutex<HashMap<Operation, GatewayError>>,
    /// Artificial latency applied before each call.
    latency: Option<Duration>,
}

impl<R: Simulated> Default for MemoryGateway<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Simulated> MemoryGateway<R> {
    /// Creates an empty simulated provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(BTreeMap::new()),
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            latency: None,
        }
    }

    /// Creates a simulated provider pre-loaded with resources.
    #[must_use]
    pub fn with_resources(resources: impl IntoIterator<Item = R::Current>) -> Self {
        let gateway = Self::new();
        gateway.import(resources);
        gateway
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: GatewayError) {
        lock(&self.faults).insert(operation, error);
    }

    /// Returns a copy of the call journal.
    #[must_use]
    pub fn calls(&self) -> Vec<Call<R::Change>> {
        lock(&self.journal).clone()
    }

    /// Returns the journaled calls that change provider state.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<Call<R::Change>> {
        lock(&self.journal)
            .iter()
            .filter(|c| c.operation().is_mutating())
            .cloned()
            .collect()
    }

    /// Counts journaled calls of `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        lock(&self.journal)
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Empties the call journal.
    pub fn clear_journal(&self) {
        lock(&self.journal).clear();
    }

    /// Returns the provider state of a resource by identifier or name.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<R::Current> {
        let resources = lock(&self.resources);
        find(&resources, key).and_then(|id| resources.get(&id).cloned())
    }

    /// Removes a resource behind the engine's back, simulating drift.
    pub fn remove(&self, key: &str) -> Option<R::Current> {
        let mut resources = lock(&self.resources);
        find(&resources, key).and_then(|id| resources.remove(&id))
    }

    /// Mutates a resource behind the engine's back, simulating drift.
    pub fn mutate(&self, key: &str, f: impl FnOnce(&mut R::Current)) -> bool {
        let mut resources = lock(&self.resources);
        let Some(id) = find(&resources, key) else {
            return false;
        };
        resources.get_mut(&id).map(f).is_some()
    }

    /// Exports every hosted resource.
    #[must_use]
    pub fn export(&self) -> Vec<R::Current> {
        lock(&self.resources).values().cloned().collect()
    }

    /// Replaces hosted resources with `resources`.
    pub fn import(&self, resources: impl IntoIterator<Item = R::Current>) {
        let mut hosted = lock(&self.resources);
        hosted.clear();
        for current in resources {
            hosted.insert(current.identifier().to_string(), current);
        }
    }

    /// Journals a call, then applies latency and any pending fault.
    async fn enter(&self, call: Call<R::Change>) -> GatewayResult<()> {
        let operation = call.operation();
        debug!("{} gateway: {:?}", R::KIND, call);
        lock(&self.journal).push(call);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match lock(&self.faults).remove(&operation) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Simulated> ProviderGateway<R> for MemoryGateway<R> {
    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        self.enter(Call::Exists(key.to_string())).await?;
        Ok(find(&lock(&self.resources), key).is_some())
    }

    async fn create(&self, spec: &mut R) -> GatewayResult<()> {
        self.enter(Call::Create(spec.natural_key().to_string())).await?;

        let current = {
            let mut resources = lock(&self.resources);
            if find(&resources, spec.natural_key()).is_some() {
                return Err(GatewayError::rejected(format!(
                    "{} '{}' already exists",
                    R::KIND,
                    spec.natural_key()
                )));
            }

            let simple = Uuid::new_v4().simple().to_string();
            let identifier = format!("{}-{}", R::ID_PREFIX, &simple[..12]);
            let current = spec.materialize(&identifier);
            resources.insert(identifier, current.clone());
            current
        };

        spec.meta_mut().identifier = current.identifier().to_string();
        spec.observe(&current);
        Ok(())
    }

    async fn get(&self, key: &str) -> GatewayResult<<R as Diffable>::Current> {
        self.enter(Call::Get(key.to_string())).await?;
        self.current(key).ok_or_else(|| GatewayError::NotFound {
            key: key.to_string(),
        })
    }

    async fn update(&self, spec: &R, change: &<R as Diffable>::Change) -> GatewayResult<()> {
        let identifier = spec.identifier().to_string();
        self.enter(Call::Update {
            identifier: identifier.clone(),
            change: change.clone(),
        })
        .await?;

        let mut resources = lock(&self.resources);
        let current = resources
            .get_mut(&identifier)
            .ok_or(GatewayError::NotFound { key: identifier })?;
        R::apply(current, change);
        Ok(())
    }

    async fn delete(&self, spec: &R, final_snapshot_id: Option<String>) -> GatewayResult<()> {
        let identifier = spec.identifier().to_string();
        self.enter(Call::Delete {
            identifier: identifier.clone(),
            final_snapshot_id,
        })
        .await?;

        lock(&self.resources).remove(&identifier);
        Ok(())
    }

    async fn stop(&self, spec: &R) -> GatewayResult<()> {
        let identifier = spec.identifier().to_string();
        self.enter(Call::Stop(identifier.clone())).await?;

        let mut resources = lock(&self.resources);
        let current = resources
            .get_mut(&identifier)
            .ok_or(GatewayError::NotFound { key: identifier })?;
        if R::stop(current) {
            Ok(())
        } else {
            Err(GatewayError::Unsupported {
                operation: Operation::Stop,
            })
        }
    }

    async fn tag_resource(&self, identifier: &str, tags: &Tags) -> GatewayResult<()> {
        self.enter(Call::Tag {
            identifier: identifier.to_string(),
            tags: tags.clone(),
        })
        .await?;

        let mut resources = lock(&self.resources);
        let current = resources.get_mut(identifier).ok_or_else(|| GatewayError::NotFound {
            key: identifier.to_string(),
        })?;
        R::tags_mut(current).extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn untag_resource(&self, identifier: &str, keys: &[String]) -> GatewayResult<()> {
        self.enter(Call::Untag {
            identifier: identifier.to_string(),
            keys: keys.to_vec(),
        })
        .await?;

        let mut resources = lock(&self.resources);
        let current = resources.get_mut(identifier).ok_or_else(|| GatewayError::NotFound {
            key: identifier.to_string(),
        })?;
        let tags = R::tags_mut(current);
        for key in keys {
            tags.remove(key);
        }
        Ok(())
    }
}

impl<C> Call<C> {
    /// Returns the operation this call performed.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Exists(_) => Operation::Exists,
            Self::Create(_) => Operation::Create,
            Self::Get(_) => Operation::Get,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
            Self::Stop(_) => Operation::Stop,
            Self::Tag { .. } => Operation::TagResource,
            Self::Untag { .. } => Operation::UntagResource,
        }
    }
}

/// Finds a hosted resource by identifier, then by name.
fn find<S: ObservedState>(resources: &BTreeMap<String, S>, key: &str) -> Option<String> {
    if resources.contains_key(key) {
        return Some(key.to_string());
    }
    resources
        .values()
        .find(|r| r.name() == key)
        .map(|r| r.identifier().to_string())
}

/// Locks a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
