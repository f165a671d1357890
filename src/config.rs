//! Engine configuration
//!
//! Timing and capacity knobs for the producer loop and the monitor channel.
//! All values have conservative defaults suitable for a live experiment; the
//! test suite shrinks the intervals to keep runs fast.

use crate::error::{Result, SortError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a [`crate::pipeline::Pipeline`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backoff before re-reading a file source that has reached current
    /// end-of-data without `stop_at_end` (a live logger may still append)
    pub file_retry_ms: u64,
    /// Poll interval for an online source that reported no data available
    pub online_poll_ms: u64,
    /// Granularity of cooperative cancellation checks while sleeping
    pub stop_poll_ms: u64,
    /// Capacity of the monitor notification channel; events beyond this are
    /// dropped and counted rather than blocking the producer
    pub monitor_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_retry_ms: 10_000,
            online_poll_ms: 1_000,
            stop_poll_ms: 50,
            monitor_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SortError::Config(format!("Failed to parse engine config: {}", e)))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SortError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| SortError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            SortError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// File-source retry backoff as a [`Duration`]
    pub fn file_retry(&self) -> Duration {
        Duration::from_millis(self.file_retry_ms)
    }

    /// Online poll interval as a [`Duration`]
    pub fn online_poll(&self) -> Duration {
        Duration::from_millis(self.online_poll_ms)
    }

    /// Cancellation check granularity as a [`Duration`]
    pub fn stop_poll(&self) -> Duration {
        Duration::from_millis(self.stop_poll_ms.max(1))
    }
}
