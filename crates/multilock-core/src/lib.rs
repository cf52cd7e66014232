//! Multilock Core Library
//!
//! This crate provides multi-resource read/write locks, including:
//! - Atomic shared or exclusive acquisition of a whole resource set
//! - Blocking, interruptible, non-blocking, and bounded acquisition
//! - Two-phase write acquisition with rollback on timeout, interrupt, or panic
//! - Hash-keyed and order-keyed registries
//! - Registry introspection and RAII guards

pub mod config;
pub mod error;
pub mod locking;

pub use error::{LockError, LockResult};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MultiLockConfig;
    pub use crate::error::{LockError, LockResult};
    pub use crate::locking::{
        HashLockProvider, LockFactory, LockKind, MultiLock, MultiReadWriteLock, SortedLockProvider,
    };
}
