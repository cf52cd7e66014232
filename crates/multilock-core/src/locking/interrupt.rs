//! Cooperative thread interruption
//!
//! Every thread owns an interrupt flag, created on first use. Another
//! thread sets it through an [`Interrupter`]; interruptible lock operations
//! observe it on entry and while waiting, clear it, and fail with
//! [`LockError::Interrupted`](crate::error::LockError::Interrupted).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

thread_local! {
    static FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Handle for interrupting a specific thread
#[derive(Debug, Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
    thread: ThreadId,
}

impl Interrupter {
    /// Request interruption of the target thread
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check the target thread's flag without clearing it
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The thread this handle interrupts
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

/// Interrupter for the calling thread
pub fn current() -> Interrupter {
    Interrupter {
        flag: FLAG.with(Arc::clone),
        thread: thread::current().id(),
    }
}

/// Check the calling thread's flag without clearing it
pub fn is_interrupted() -> bool {
    FLAG.with(|flag| flag.load(Ordering::SeqCst))
}

/// Test and clear the calling thread's flag
pub fn interrupted() -> bool {
    FLAG.with(|flag| flag.swap(false, Ordering::SeqCst))
}
