//! Lock kinds, states, and registry introspection types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of a read/write pair a lock is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Shared access
    Read,
    /// Exclusive access
    Write,
}

impl LockKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hold state of a lock instance as seen by one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    Locked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlocked => write!(f, "unlocked"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// Registry view of a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ResourceStatus {
    /// Nobody holds the resource
    Available,
    /// Held by one or more readers; `holders` counts shared holds
    Shared { holders: usize },
    /// Held exclusively by a writer that has finished draining readers
    Exclusive { held_by_current_thread: bool },
    /// Claimed by a writer that is still waiting for readers to leave
    Draining { shared_holders: usize },
}

impl ResourceStatus {
    /// Check if the resource has no holders at all
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Point-in-time counts of a provider's registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Resources with an exclusive owner
    pub exclusive_resources: usize,

    /// Resources with at least one shared holder
    pub shared_resources: usize,

    /// Sum of shared holders over all resources
    pub shared_holds: usize,
}

impl RegistrySnapshot {
    /// Check if nothing is held
    pub fn is_idle(&self) -> bool {
        self.exclusive_resources == 0 && self.shared_resources == 0
    }
}
