//! Supervisor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the deposit pipeline supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Start the recurring monitoring pass with the process.
    /// When disabled, passes only run through `run_once`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between monitoring passes (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Grace period given to in-flight jobs before a shut down pool aborts
    /// its workers (seconds).
    #[serde(default = "default_unavailable_delay")]
    pub unavailable_delay_secs: u64,

    /// Delay before a shut down pool releases its bookkeeping (seconds).
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_unavailable_delay() -> u64 {
    30
}

fn default_cleanup_delay() -> u64 {
    60
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            unavailable_delay_secs: default_unavailable_delay(),
            cleanup_delay_secs: default_cleanup_delay(),
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn unavailable_delay(&self) -> Duration {
        Duration::from_secs(self.unavailable_delay_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_unavailable_delay_secs(mut self, secs: u64) -> Self {
        self.unavailable_delay_secs = secs;
        self
    }

    pub fn with_cleanup_delay_secs(mut self, secs: u64) -> Self {
        self.cleanup_delay_secs = secs;
        self
    }
}
