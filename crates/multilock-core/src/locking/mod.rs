//! Multi-resource read/write locking
//!
//! A lock covers a fixed set of resource identifiers and is acquired as one
//! unit, either shared (read) or exclusive (write). Locks created by the
//! same provider coordinate through one registry, so a write lock on
//! `{"x", "y"}` excludes a read lock on `{"y"}`.
//!
//! # Architecture
//!
//! - **Registry**: per-resource ledgers of exclusive owners and shared holders
//! - **Coordinator**: the two-monitor acquisition protocol with rollback
//! - **Lock pair**: `MultiLock` read and write halves over one `ResourceSet`
//! - **Provider**: `LockProvider` building `MultiReadWriteLock`s on demand
//! - **Guards**: RAII-style guards for automatic release
//!
//! # Example
//!
//! ```
//! use multilock_core::locking::LockFactory;
//! use std::time::Duration;
//!
//! let provider = LockFactory::hashed();
//! let lock = provider.new_lock(["accounts/1", "accounts/2"]);
//!
//! lock.write_lock().lock()?;
//! // Mutate both accounts...
//! lock.write_lock().unlock()?;
//!
//! // Or let a guard release it
//! if let Some(_guard) = lock.read_lock().try_guard_for(Duration::from_millis(100))? {
//!     // Read both accounts...
//! }
//! # Ok::<(), multilock_core::LockError>(())
//! ```

mod coordinator;
pub mod guard;
pub mod interrupt;
pub mod multi_lock;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod types;

// Re-export main types
pub use guard::MultiLockGuard;
pub use interrupt::Interrupter;
pub use multi_lock::MultiLock;
pub use provider::{
    HashLockProvider, LockFactory, LockProvider, MultiReadWriteLock, SortedLockProvider,
};
pub use registry::{Backing, HashBacking, SortedBacking};
pub use resources::ResourceSet;
pub use types::{LockKind, LockState, RegistrySnapshot, ResourceStatus};
