//! One half of a multi-resource read/write pair

use super::coordinator::{Coordinator, WaitPolicy};
use super::guard::MultiLockGuard;
use super::registry::Backing;
use super::resources::ResourceSet;
use super::types::{LockKind, LockState};
use crate::error::{LockError, LockResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// A read or write lock over a fixed set of resources
///
/// The lock is not reentrant: locking it again from the thread that holds
/// it fails with [`LockError::AlreadyHeld`], and unlocking it from a thread
/// that does not hold it fails with [`LockError::NotHeld`]. Neither blocks.
///
/// Unlike a standard mutex, this lock does not release itself: pair every
/// successful acquisition with [`unlock`](Self::unlock), or use one of the
/// guard methods.
pub struct MultiLock<K: Clone, B: Backing<K>> {
    id: Uuid,
    kind: LockKind,
    resources: ResourceSet<K>,
    coordinator: Arc<Coordinator<K, B>>,
    /// Threads currently holding this instance
    held_by: Mutex<HashSet<ThreadId>>,
}

impl<K: Clone, B: Backing<K>> MultiLock<K, B> {
    pub(crate) fn new(
        id: Uuid,
        kind: LockKind,
        resources: ResourceSet<K>,
        coordinator: Arc<Coordinator<K, B>>,
    ) -> Self {
        Self {
            id,
            kind,
            resources,
            coordinator,
            held_by: Mutex::new(HashSet::new()),
        }
    }

    /// Id shared with the sibling lock of the same pair
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn resources(&self) -> &ResourceSet<K> {
        &self.resources
    }

    /// Acquire, blocking as long as necessary. Interrupts are ignored.
    pub fn lock(&self) -> LockResult<()> {
        self.acquire(WaitPolicy::Uninterruptible).map(|_| ())
    }

    /// Acquire, blocking until available or interrupted.
    ///
    /// A write lock interrupted while draining readers gives up its
    /// exclusive claim before returning [`LockError::Interrupted`].
    pub fn lock_interruptibly(&self) -> LockResult<()> {
        self.acquire(WaitPolicy::Interruptible).map(|_| ())
    }

    /// Acquire only if it can be done without waiting
    pub fn try_lock(&self) -> LockResult<bool> {
        self.acquire(WaitPolicy::Immediate)
    }

    /// Acquire within `timeout`, which covers both phases of a write acquisition.
    ///
    /// Expiry returns `Ok(false)` with nothing held. The wait is interruptible.
    pub fn try_lock_for(&self, timeout: Duration) -> LockResult<bool> {
        let policy = match Instant::now().checked_add(timeout) {
            Some(deadline) => WaitPolicy::Until(deadline),
            None => WaitPolicy::Interruptible,
        };
        self.acquire(policy)
    }

    /// Release the lock held by the calling thread
    pub fn unlock(&self) -> LockResult<()> {
        let me = thread::current().id();
        if !self.held_by.lock().remove(&me) {
            return Err(LockError::NotHeld(self.kind));
        }

        match self.kind {
            LockKind::Read => self.coordinator.release_shared(&self.resources, me),
            LockKind::Write => self.coordinator.release_exclusive(&self.resources),
        }

        debug!(
            lock_id = %self.id,
            kind = %self.kind,
            resources = self.resources.len(),
            "Lock released"
        );
        Ok(())
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.held_by.lock().contains(&thread::current().id())
    }

    /// Hold state as seen by the calling thread
    pub fn state(&self) -> LockState {
        if self.is_held_by_current_thread() {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    /// Always fails: a multi-resource lock has no single monitor to wait on.
    ///
    /// The success type is uninhabited, so no condition can ever be returned.
    pub fn new_condition(&self) -> LockResult<Infallible> {
        Err(LockError::ConditionUnsupported)
    }

    /// Acquire and return a guard that unlocks on drop
    pub fn guard(&self) -> LockResult<MultiLockGuard<'_, K, B>> {
        self.lock()?;
        Ok(MultiLockGuard::new(self))
    }

    /// Interruptible variant of [`guard`](Self::guard)
    pub fn guard_interruptibly(&self) -> LockResult<MultiLockGuard<'_, K, B>> {
        self.lock_interruptibly()?;
        Ok(MultiLockGuard::new(self))
    }

    /// Non-blocking variant of [`guard`](Self::guard)
    pub fn try_guard(&self) -> LockResult<Option<MultiLockGuard<'_, K, B>>> {
        let acquired = self.try_lock()?;
        Ok(acquired.then(|| MultiLockGuard::new(self)))
    }

    /// Bounded variant of [`guard`](Self::guard)
    pub fn try_guard_for(
        &self,
        timeout: Duration,
    ) -> LockResult<Option<MultiLockGuard<'_, K, B>>> {
        let acquired = self.try_lock_for(timeout)?;
        Ok(acquired.then(|| MultiLockGuard::new(self)))
    }

    fn acquire(&self, policy: WaitPolicy) -> LockResult<bool> {
        let me = thread::current().id();
        if self.held_by.lock().contains(&me) {
            return Err(LockError::AlreadyHeld(self.kind));
        }

        let (coordinator, resources) = (&self.coordinator, &self.resources);
        let start = Instant::now();
        let acquired = match self.kind {
            LockKind::Read => coordinator.acquire_shared(resources, me, policy)?,
            LockKind::Write => coordinator.acquire_exclusive(resources, me, policy)?,
        };

        if acquired {
            self.held_by.lock().insert(me);
        }
        debug!(
            lock_id = %self.id,
            kind = %self.kind,
            resources = self.resources.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            acquired,
            "Lock acquisition finished"
        );
        Ok(acquired)
    }
}

impl<K: Clone + fmt::Debug, B: Backing<K>> fmt::Debug for MultiLock<K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiLock")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("resources", &self.resources)
            .finish()
    }
}

impl<K: Clone, B: Backing<K>> fmt::Display for MultiLock<K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultiLock[{}: {} resources]", self.kind, self.resources.len())
    }
}
