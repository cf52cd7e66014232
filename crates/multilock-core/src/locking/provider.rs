//! Lock providers and the read/write pair they hand out
//!
//! A provider owns one registry. Every lock it creates coordinates through
//! that registry, so locks over overlapping resource sets exclude each
//! other even though they are distinct objects. Locks from different
//! providers never interact.

use super::coordinator::Coordinator;
use super::multi_lock::MultiLock;
use super::registry::{Backing, HashBacking, SortedBacking};
use super::resources::ResourceSet;
use super::types::{LockKind, RegistrySnapshot, ResourceStatus};
use crate::config::MultiLockConfig;
use crate::error::LockResult;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Provider backed by a hash-keyed registry
pub type HashLockProvider<K> = LockProvider<K, HashBacking>;

/// Provider backed by an order-keyed registry
pub type SortedLockProvider<K> = LockProvider<K, SortedBacking>;

/// Creates multi-resource read/write locks sharing one registry
///
/// Cloning a provider shares its registry.
pub struct LockProvider<K: Clone, B: Backing<K>> {
    coordinator: Arc<Coordinator<K, B>>,
}

impl<K: Clone, B: Backing<K>> LockProvider<K, B> {
    /// Create a provider with default configuration
    pub fn new() -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(MultiLockConfig::default())),
        }
    }

    /// Create a provider with a validated configuration
    pub fn with_config(config: MultiLockConfig) -> LockResult<Self> {
        config.validate()?;
        Ok(Self {
            coordinator: Arc::new(Coordinator::new(config)),
        })
    }

    pub fn config(&self) -> &MultiLockConfig {
        self.coordinator.config()
    }

    /// Create a lock pair over the given resources; duplicates are dropped
    pub fn new_lock(&self, resources: impl IntoIterator<Item = K>) -> MultiReadWriteLock<K, B> {
        self.build(ResourceSet::new::<B>(resources))
    }

    /// Create a lock pair, skipping missing identifiers
    pub fn new_lock_filtered(
        &self,
        resources: impl IntoIterator<Item = Option<K>>,
    ) -> MultiReadWriteLock<K, B> {
        self.build(ResourceSet::from_optional::<B>(resources))
    }

    /// Registry view of one resource
    pub fn status(&self, resource: &K) -> ResourceStatus {
        self.coordinator.status(resource)
    }

    /// True iff no resource in the slice has an exclusive owner
    pub fn is_exclusive_free(&self, resources: &[K]) -> bool {
        self.coordinator.is_exclusive_free(resources)
    }

    /// True iff no resource in the slice has a shared holder
    pub fn is_shared_free(&self, resources: &[K]) -> bool {
        self.coordinator.is_shared_free(resources)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.coordinator.snapshot()
    }

    fn build(&self, resources: ResourceSet<K>) -> MultiReadWriteLock<K, B> {
        let id = Uuid::new_v4();
        debug!(
            lock_id = %id,
            backing = B::NAME,
            resources = resources.len(),
            "Created multi-resource lock"
        );

        MultiReadWriteLock {
            id,
            read: MultiLock::new(
                id,
                LockKind::Read,
                resources.clone(),
                Arc::clone(&self.coordinator),
            ),
            write: MultiLock::new(
                id,
                LockKind::Write,
                resources.clone(),
                Arc::clone(&self.coordinator),
            ),
            resources,
        }
    }
}

impl<K: Clone, B: Backing<K>> Default for LockProvider<K, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, B: Backing<K>> Clone for LockProvider<K, B> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<K: Clone, B: Backing<K>> fmt::Debug for LockProvider<K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockProvider")
            .field("backing", &B::NAME)
            .field("config", self.config())
            .finish()
    }
}

/// A read lock and a write lock over the same resource set
pub struct MultiReadWriteLock<K: Clone, B: Backing<K>> {
    id: Uuid,
    resources: ResourceSet<K>,
    read: MultiLock<K, B>,
    write: MultiLock<K, B>,
}

impl<K: Clone, B: Backing<K>> MultiReadWriteLock<K, B> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The de-duplicated resources both locks cover
    pub fn resources(&self) -> &ResourceSet<K> {
        &self.resources
    }

    pub fn read_lock(&self) -> &MultiLock<K, B> {
        &self.read
    }

    pub fn write_lock(&self) -> &MultiLock<K, B> {
        &self.write
    }
}

impl<K: Clone + fmt::Debug, B: Backing<K>> fmt::Debug for MultiReadWriteLock<K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiReadWriteLock")
            .field("id", &self.id)
            .field("resources", &self.resources)
            .finish()
    }
}

/// Stateless entry point for building providers
#[derive(Debug, Clone, Copy, Default)]
pub struct LockFactory;

impl LockFactory {
    /// Provider over a hash-keyed registry
    pub fn hashed<K>() -> HashLockProvider<K>
    where
        K: Hash + Eq + Clone + Send + 'static,
    {
        LockProvider::new()
    }

    /// Provider over an order-keyed registry
    pub fn sorted<K>() -> SortedLockProvider<K>
    where
        K: Ord + Clone + Send + 'static,
    {
        LockProvider::new()
    }

    pub fn hashed_with_config<K>(config: MultiLockConfig) -> LockResult<HashLockProvider<K>>
    where
        K: Hash + Eq + Clone + Send + 'static,
    {
        LockProvider::with_config(config)
    }

    pub fn sorted_with_config<K>(config: MultiLockConfig) -> LockResult<SortedLockProvider<K>>
    where
        K: Ord + Clone + Send + 'static,
    {
        LockProvider::with_config(config)
    }
}
