//! Error types for multi-resource locks

use crate::locking::LockKind;
use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
///
/// Timeouts are not errors: bounded acquisition reports expiry as `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The calling thread already holds this lock instance
    #[error("{0} lock is already held by the current thread; unlock it before locking again")]
    AlreadyHeld(LockKind),

    /// The calling thread does not hold this lock instance
    #[error("{0} lock is not held by the current thread")]
    NotHeld(LockKind),

    /// The calling thread was interrupted while acquiring
    #[error("Lock acquisition interrupted")]
    Interrupted,

    /// Condition variables cannot be derived from a multi-resource lock
    #[error("Conditions are not supported by multi-resource locks")]
    ConditionUnsupported,

    /// Invalid lock configuration
    #[error("Invalid lock configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyHeld(_) => "E300",
            Self::NotHeld(_) => "E301",
            Self::Interrupted => "E302",
            Self::ConditionUnsupported => "E303",
            Self::InvalidConfig(_) => "E304",
        }
    }

    /// Whether this error signals a programming mistake rather than a runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::AlreadyHeld(_) | Self::NotHeld(_))
    }
}
