//! Reconnection policy
//!
//! Fixed backoff with a bounded number of attempts. The scheduling itself
//! lives in the manager; this is only the knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive automatic attempts
    pub max_attempts: u32,
    /// Delay before each attempt (ms)
    pub interval_ms: u64,
    /// Initial value of the auto-reconnect flag
    pub enabled: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval_ms: 5000, // 5 seconds
            enabled: true,
        }
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Whether another attempt may be scheduled after `attempts` have been made
    pub fn has_remaining(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
