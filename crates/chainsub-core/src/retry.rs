//! Bounded exponential backoff for rebuilding a session after a reconnect.
//!
//! The transport retries dropped connections on its own; this policy only
//! governs how often the controller re-runs the full setup procedure when
//! that setup itself fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconnect backoff settings, in milliseconds so they load from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Setup attempts after the first failure. `0` gives up immediately.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Caps exponential growth.
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Stateless; computes the delay before a given attempt.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once
    /// `max_attempts` is exceeded.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_attempts {
            return None;
        }
        let base_ms = self.config.initial_backoff_ms as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
