//! Ownership ledgers for locked resources
//!
//! The registry records which thread owns each resource exclusively and
//! which threads hold it shared. It never blocks and never validates: the
//! coordinator only touches a ledger while holding the monitor guarding it,
//! and is responsible for checking freedom before registering.
//!
//! Two backings are available. [`HashBacking`] keys the ledgers by hash and
//! only needs `K: Hash + Eq`; [`SortedBacking`] keys them by order and needs
//! `K: Ord`. Behavior is identical.
//!
//! Shared holds are counted per thread, so two distinct read locks held by
//! one thread over the same resource release independently.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::thread::ThreadId;

/// Ledger of exclusive owners, at most one per resource
pub trait OwnerTable<K>: Default + Send {
    /// Current exclusive owner of a resource
    fn owner(&self, resource: &K) -> Option<ThreadId>;

    /// Record `owner` as exclusive owner, replacing any previous owner
    fn set_owner(&mut self, resource: K, owner: ThreadId);

    /// Forget the exclusive owner of a resource
    fn clear_owner(&mut self, resource: &K);

    /// Number of exclusively owned resources
    fn owned_count(&self) -> usize;

    /// True iff none of the resources has an exclusive owner
    fn is_exclusive_free(&self, resources: &[K]) -> bool {
        resources.iter().all(|r| self.owner(r).is_none())
    }

    fn register_exclusive(&mut self, resources: &[K], owner: ThreadId)
    where
        K: Clone,
    {
        for resource in resources {
            self.set_owner(resource.clone(), owner);
        }
    }

    fn unregister_exclusive(&mut self, resources: &[K]) {
        for resource in resources {
            self.clear_owner(resource);
        }
    }
}

/// Shared holds on one resource, by holding thread
pub type HolderCounts = HashMap<ThreadId, usize>;

/// Ledger of shared holders, any number per resource
pub trait HolderTable<K>: Default + Send {
    /// Shared holders of a resource, `None` if it has none
    fn holders(&self, resource: &K) -> Option<&HolderCounts>;

    /// Holders of a resource, created empty if missing
    fn holders_entry(&mut self, resource: K) -> &mut HolderCounts;

    /// Holders of a resource if any are recorded
    fn holders_mut(&mut self, resource: &K) -> Option<&mut HolderCounts>;

    /// Drop the entry of a resource
    fn remove_entry(&mut self, resource: &K);

    /// Number of resources with at least one holder
    fn held_count(&self) -> usize;

    /// Sum of holds over all resources
    fn total_holds(&self) -> usize;

    /// True iff none of the resources has a shared holder
    fn is_shared_free(&self, resources: &[K]) -> bool {
        resources
            .iter()
            .all(|r| self.holders(r).is_none_or(HashMap::is_empty))
    }

    fn register_shared(&mut self, resources: &[K], holder: ThreadId)
    where
        K: Clone,
    {
        for resource in resources {
            *self.holders_entry(resource.clone()).entry(holder).or_insert(0) += 1;
        }
    }

    /// Drop one hold of `holder` on each resource; the last hold takes the entry with it
    fn unregister_shared(&mut self, resources: &[K], holder: ThreadId) {
        for resource in resources {
            let emptied = match self.holders_mut(resource) {
                Some(counts) => {
                    if let Some(count) = counts.get_mut(&holder) {
                        *count -= 1;
                        if *count == 0 {
                            counts.remove(&holder);
                        }
                    }
                    counts.is_empty()
                }
                None => false,
            };
            if emptied {
                self.remove_entry(resource);
            }
        }
    }
}

impl<K: Hash + Eq + Send> OwnerTable<K> for HashMap<K, ThreadId> {
    fn owner(&self, resource: &K) -> Option<ThreadId> {
        self.get(resource).copied()
    }

    fn set_owner(&mut self, resource: K, owner: ThreadId) {
        self.insert(resource, owner);
    }

    fn clear_owner(&mut self, resource: &K) {
        self.remove(resource);
    }

    fn owned_count(&self) -> usize {
        self.len()
    }
}

impl<K: Ord + Send> OwnerTable<K> for BTreeMap<K, ThreadId> {
    fn owner(&self, resource: &K) -> Option<ThreadId> {
        self.get(resource).copied()
    }

    fn set_owner(&mut self, resource: K, owner: ThreadId) {
        self.insert(resource, owner);
    }

    fn clear_owner(&mut self, resource: &K) {
        self.remove(resource);
    }

    fn owned_count(&self) -> usize {
        self.len()
    }
}

impl<K: Hash + Eq + Send> HolderTable<K> for HashMap<K, HolderCounts> {
    fn holders(&self, resource: &K) -> Option<&HolderCounts> {
        self.get(resource)
    }

    fn holders_entry(&mut self, resource: K) -> &mut HolderCounts {
        self.entry(resource).or_default()
    }

    fn holders_mut(&mut self, resource: &K) -> Option<&mut HolderCounts> {
        self.get_mut(resource)
    }

    fn remove_entry(&mut self, resource: &K) {
        self.remove(resource);
    }

    fn held_count(&self) -> usize {
        self.len()
    }

    fn total_holds(&self) -> usize {
        self.values().flat_map(HashMap::values).sum()
    }
}

impl<K: Ord + Send> HolderTable<K> for BTreeMap<K, HolderCounts> {
    fn holders(&self, resource: &K) -> Option<&HolderCounts> {
        self.get(resource)
    }

    fn holders_entry(&mut self, resource: K) -> &mut HolderCounts {
        self.entry(resource).or_default()
    }

    fn holders_mut(&mut self, resource: &K) -> Option<&mut HolderCounts> {
        self.get_mut(resource)
    }

    fn remove_entry(&mut self, resource: &K) {
        self.remove(resource);
    }

    fn held_count(&self) -> usize {
        self.len()
    }

    fn total_holds(&self) -> usize {
        self.values().flat_map(HashMap::values).sum()
    }
}

/// Storage strategy for a provider's registry
pub trait Backing<K>: Send + Sync + 'static {
    type Owners: OwnerTable<K>;
    type Holders: HolderTable<K>;

    /// Name used in log output
    const NAME: &'static str;

    /// De-duplicate a requested resource list
    fn canonicalize(resources: Vec<K>) -> Vec<K>;
}

/// Hash-keyed registry; resource sets keep the order they were requested in
#[derive(Debug, Clone, Copy, Default)]
pub struct HashBacking;

impl<K> Backing<K> for HashBacking
where
    K: Hash + Eq + Clone + Send + 'static,
{
    type Owners = HashMap<K, ThreadId>;
    type Holders = HashMap<K, HolderCounts>;

    const NAME: &'static str = "hash";

    fn canonicalize(mut resources: Vec<K>) -> Vec<K> {
        let mut seen = HashSet::with_capacity(resources.len());
        resources.retain(|r| seen.insert(r.clone()));
        resources
    }
}

/// Order-keyed registry; resource sets are sorted ascending
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedBacking;

impl<K> Backing<K> for SortedBacking
where
    K: Ord + Clone + Send + 'static,
{
    type Owners = BTreeMap<K, ThreadId>;
    type Holders = BTreeMap<K, HolderCounts>;

    const NAME: &'static str = "sorted";

    fn canonicalize(mut resources: Vec<K>) -> Vec<K> {
        resources.sort();
        resources.dedup();
        resources
    }
}
