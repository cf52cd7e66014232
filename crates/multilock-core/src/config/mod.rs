//! Lock configuration with TOML loading

use crate::error::{LockError, LockResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound for the interrupt check interval
const MAX_INTERRUPT_CHECK_MS: u64 = 1000;

/// Configuration shared by every lock a provider hands out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiLockConfig {
    /// How often an interruptible wait wakes to look at the interrupt flag
    pub interrupt_check_interval_ms: u64,

    /// Yield the releasing thread after waking waiters.
    ///
    /// A weak starvation heuristic: it gives woken writers a chance to run
    /// before the releasing thread re-acquires, but guarantees nothing.
    pub yield_on_release: bool,
}

impl Default for MultiLockConfig {
    fn default() -> Self {
        Self {
            interrupt_check_interval_ms: 10,
            yield_on_release: true,
        }
    }
}

impl MultiLockConfig {
    /// Set the interrupt check interval
    pub fn with_interrupt_check_interval(mut self, interval: Duration) -> Self {
        self.interrupt_check_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable yielding after release
    pub fn with_yield_on_release(mut self, enabled: bool) -> Self {
        self.yield_on_release = enabled;
        self
    }

    /// The interrupt check interval as a `Duration`
    pub fn interrupt_check_interval(&self) -> Duration {
        Duration::from_millis(self.interrupt_check_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> LockResult<()> {
        if !(1..=MAX_INTERRUPT_CHECK_MS).contains(&self.interrupt_check_interval_ms) {
            return Err(LockError::InvalidConfig(format!(
                "interrupt_check_interval_ms must be between 1 and {}, got {}",
                MAX_INTERRUPT_CHECK_MS, self.interrupt_check_interval_ms
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> LockResult<Self> {
        let config: MultiLockConfig =
            toml::from_str(contents).map_err(|e| LockError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lock config file: {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse lock config file: {}", path.display()))?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize lock config")
    }
}
