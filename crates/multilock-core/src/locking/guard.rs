//! Lock guards for RAII-style lock management
//!
//! Guards unlock when dropped, ensuring release even on panics or early
//! returns. A guard cannot leave the thread that acquired it, since only
//! that thread may unlock.

use super::multi_lock::MultiLock;
use super::registry::Backing;
use super::resources::ResourceSet;
use super::types::LockKind;
use crate::error::LockResult;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use tracing::warn;

/// Holds a [`MultiLock`] for the calling thread until dropped
pub struct MultiLockGuard<'a, K: Clone, B: Backing<K>> {
    lock: &'a MultiLock<K, B>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, K: Clone, B: Backing<K>> MultiLockGuard<'a, K, B> {
    pub(crate) fn new(lock: &'a MultiLock<K, B>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// The guarded lock
    pub fn lock(&self) -> &'a MultiLock<K, B> {
        self.lock
    }

    pub fn kind(&self) -> LockKind {
        self.lock.kind()
    }

    pub fn resources(&self) -> &ResourceSet<K> {
        self.lock.resources()
    }

    /// Release explicitly, reporting any error instead of logging it
    pub fn unlock(self) -> LockResult<()> {
        let lock = self.lock;
        mem::forget(self);
        lock.unlock()
    }
}

impl<K: Clone, B: Backing<K>> Drop for MultiLockGuard<'_, K, B> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!(lock_id = %self.lock.id(), error = %e, "Guard drop failed to unlock");
        }
    }
}

impl<K: Clone, B: Backing<K>> fmt::Display for MultiLockGuard<'_, K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guard[{}]", self.lock)
    }
}

impl<K: Clone + fmt::Debug, B: Backing<K>> fmt::Debug for MultiLockGuard<'_, K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiLockGuard").field("lock", self.lock).finish()
    }
}
