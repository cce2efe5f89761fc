//! Circuit breaker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub fail_max: u32,

    /// Seconds the circuit stays open before a half-open trial is allowed
    pub reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 5,
            reset_timeout_secs: 60,
        }
    }
}

impl BreakerConfig {
    /// Create a new config with a custom failure threshold
    pub fn with_fail_max(mut self, fail_max: u32) -> Self {
        self.fail_max = fail_max;
        self
    }

    /// Create a new config with a custom reset timeout
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_secs = timeout.as_secs();
        self
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}
