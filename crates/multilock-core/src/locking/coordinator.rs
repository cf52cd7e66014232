//! Two-monitor acquisition protocol
//!
//! The coordinator owns a provider's registry, split across two monitors:
//! - the owner monitor guards exclusive ownership and the decision to grant it
//! - the holder monitor guards shared holders and the decision to grant or
//!   release shared access
//!
//! Readers wait on the owner monitor until no writer owns their resources,
//! then register under the holder monitor while still inside the owner
//! monitor. Writers first claim ownership under the owner monitor (blocking
//! later readers and writers), then drain existing readers under the holder
//! monitor. A writer that fails to drain, for any reason including a panic,
//! rolls its ownership claim back before returning.
//!
//! Every release wakes all waiters of the monitor it touched; waiters
//! re-check their own resources.

use super::interrupt;
use super::registry::{Backing, HolderTable, OwnerTable};
use super::types::{RegistrySnapshot, ResourceStatus};
use crate::config::MultiLockConfig;
use crate::error::{LockError, LockResult};
use chrono::Utc;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{trace, warn};

/// How an acquisition may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitPolicy {
    /// Block until available, ignoring interrupts
    Uninterruptible,
    /// Block until available or interrupted
    Interruptible,
    /// Block until available, interrupted, or the deadline passes
    Until(Instant),
    /// Never block
    Immediate,
}

pub(crate) struct Coordinator<K, B: Backing<K>> {
    owners: Mutex<B::Owners>,
    owners_released: Condvar,
    holders: Mutex<B::Holders>,
    holders_released: Condvar,
    config: MultiLockConfig,
    _key: PhantomData<fn() -> K>,
}

impl<K: Clone, B: Backing<K>> Coordinator<K, B> {
    pub(crate) fn new(config: MultiLockConfig) -> Self {
        Self {
            owners: Mutex::new(B::Owners::default()),
            owners_released: Condvar::new(),
            holders: Mutex::new(B::Holders::default()),
            holders_released: Condvar::new(),
            config,
            _key: PhantomData,
        }
    }

    pub(crate) fn config(&self) -> &MultiLockConfig {
        &self.config
    }

    /// Register `holder` as a shared holder of every resource.
    ///
    /// Returns `Ok(false)` if the policy gave up before the resources were
    /// free of writers; nothing is registered in that case.
    pub(crate) fn acquire_shared(
        &self,
        resources: &[K],
        holder: ThreadId,
        policy: WaitPolicy,
    ) -> LockResult<bool> {
        let Some(mut owners) = self.enter(&self.owners, policy)? else {
            return Ok(false);
        };
        if !self.await_free(&self.owners_released, &mut owners, policy, |o| {
            o.is_exclusive_free(resources)
        })? {
            return Ok(false);
        }

        let Some(mut holders) = self.enter(&self.holders, policy)? else {
            return Ok(false);
        };
        holders.register_shared(resources, holder);
        Ok(true)
    }

    pub(crate) fn release_shared(&self, resources: &[K], holder: ThreadId) {
        {
            let mut holders = self.holders.lock();
            holders.unregister_shared(resources, holder);
            self.holders_released.notify_all();
        }
        self.after_release();
    }

    /// Claim exclusive ownership of every resource, then wait for readers to leave.
    ///
    /// Returns `Ok(false)` if the policy gave up in either phase. Any exit
    /// other than success leaves the registry as it was before the call.
    pub(crate) fn acquire_exclusive(
        &self,
        resources: &[K],
        owner: ThreadId,
        policy: WaitPolicy,
    ) -> LockResult<bool> {
        {
            let Some(mut owners) = self.enter(&self.owners, policy)? else {
                return Ok(false);
            };
            if !self.await_free(&self.owners_released, &mut owners, policy, |o| {
                o.is_exclusive_free(resources)
            })? {
                return Ok(false);
            }
            owners.register_exclusive(resources, owner);
        }

        // Declared before the holder guard so the guard is released first on every exit
        let rollback = ExclusiveRollback {
            coordinator: self,
            resources,
            armed: true,
        };

        let Some(mut holders) = self.enter(&self.holders, policy)? else {
            return Ok(false);
        };
        if !self.await_free(&self.holders_released, &mut holders, policy, |h| {
            h.is_shared_free(resources)
        })? {
            return Ok(false);
        }
        drop(holders);

        rollback.disarm();
        Ok(true)
    }

    pub(crate) fn release_exclusive(&self, resources: &[K]) {
        {
            let mut owners = self.owners.lock();
            owners.unregister_exclusive(resources);
            self.owners_released.notify_all();
        }
        self.after_release();
    }

    pub(crate) fn is_exclusive_free(&self, resources: &[K]) -> bool {
        self.owners.lock().is_exclusive_free(resources)
    }

    pub(crate) fn is_shared_free(&self, resources: &[K]) -> bool {
        self.holders.lock().is_shared_free(resources)
    }

    pub(crate) fn status(&self, resource: &K) -> ResourceStatus {
        // Same order as readers: owner monitor, then holder monitor
        let owners = self.owners.lock();
        let holders = self.holders.lock();
        let shared: usize = holders
            .holders(resource)
            .map_or(0, |counts| counts.values().sum());

        match (owners.owner(resource), shared) {
            (None, 0) => ResourceStatus::Available,
            (None, holders) => ResourceStatus::Shared { holders },
            (Some(owner), 0) => ResourceStatus::Exclusive {
                held_by_current_thread: owner == thread::current().id(),
            },
            (Some(_), shared_holders) => ResourceStatus::Draining { shared_holders },
        }
    }

    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        let owners = self.owners.lock();
        let holders = self.holders.lock();

        RegistrySnapshot {
            taken_at: Utc::now(),
            exclusive_resources: owners.owned_count(),
            shared_resources: holders.held_count(),
            shared_holds: holders.total_holds(),
        }
    }

    fn enter<'a, T>(
        &self,
        monitor: &'a Mutex<T>,
        policy: WaitPolicy,
    ) -> LockResult<Option<MutexGuard<'a, T>>> {
        match policy {
            WaitPolicy::Uninterruptible => Ok(Some(monitor.lock())),
            WaitPolicy::Interruptible => {
                check_interrupt()?;
                Ok(Some(monitor.lock()))
            }
            WaitPolicy::Until(deadline) => {
                check_interrupt()?;
                Ok(monitor.try_lock_until(deadline))
            }
            WaitPolicy::Immediate => Ok(monitor.try_lock()),
        }
    }

    /// Wait on `cond` until `is_free` holds. `Ok(false)` means the policy gave up.
    fn await_free<T>(
        &self,
        cond: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        policy: WaitPolicy,
        is_free: impl Fn(&T) -> bool,
    ) -> LockResult<bool> {
        let interval = self.config.interrupt_check_interval();

        loop {
            if is_free(&**guard) {
                return Ok(true);
            }

            trace!(backing = B::NAME, ?policy, "Waiting for resources");
            match policy {
                WaitPolicy::Uninterruptible => {
                    cond.wait(guard);
                }
                WaitPolicy::Interruptible => {
                    check_interrupt()?;
                    cond.wait_for(guard, interval);
                }
                WaitPolicy::Until(deadline) => {
                    check_interrupt()?;
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    cond.wait_for(guard, (deadline - now).min(interval));
                }
                WaitPolicy::Immediate => return Ok(false),
            }
        }
    }

    fn after_release(&self) {
        if self.config.yield_on_release {
            thread::yield_now();
        }
    }
}

fn check_interrupt() -> LockResult<()> {
    if interrupt::interrupted() {
        Err(LockError::Interrupted)
    } else {
        Ok(())
    }
}

/// Undoes an exclusive claim unless disarmed
struct ExclusiveRollback<'a, K: Clone, B: Backing<K>> {
    coordinator: &'a Coordinator<K, B>,
    resources: &'a [K],
    armed: bool,
}

impl<K: Clone, B: Backing<K>> ExclusiveRollback<'_, K, B> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K: Clone, B: Backing<K>> Drop for ExclusiveRollback<'_, K, B> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                backing = B::NAME,
                resources = self.resources.len(),
                panicking = thread::panicking(),
                "Rolling back exclusive claim after failed drain"
            );
            self.coordinator.release_exclusive(self.resources);
        }
    }
}
