//! Immutable resource sets

use super::registry::Backing;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// The fixed, de-duplicated set of resources a lock covers
///
/// Cloning is cheap; the read and write halves of a pair share one set.
pub struct ResourceSet<K> {
    resources: Arc<[K]>,
}

impl<K> ResourceSet<K> {
    /// Build a set, removing duplicates according to the backing's rules
    pub fn new<B: Backing<K>>(resources: impl IntoIterator<Item = K>) -> Self {
        let resources = B::canonicalize(resources.into_iter().collect());
        Self {
            resources: resources.into(),
        }
    }

    /// Build a set from optional identifiers, dropping the missing ones
    pub fn from_optional<B: Backing<K>>(resources: impl IntoIterator<Item = Option<K>>) -> Self {
        Self::new::<B>(resources.into_iter().flatten())
    }

    pub fn as_slice(&self) -> &[K] {
        &self.resources
    }

    /// Collect into an owned vector
    pub fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.resources.to_vec()
    }
}

impl<K> Clone for ResourceSet<K> {
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
        }
    }
}

impl<K> Deref for ResourceSet<K> {
    type Target = [K];

    fn deref(&self) -> &Self::Target {
        &self.resources
    }
}

impl<K: fmt::Debug> fmt::Debug for ResourceSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.resources.iter()).finish()
    }
}

impl<K: PartialEq> PartialEq for ResourceSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.resources == other.resources
    }
}

impl<K: Eq> Eq for ResourceSet<K> {}
