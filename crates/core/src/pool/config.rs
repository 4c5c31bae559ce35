use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of the worker pool serving one job type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Job type whose queue segment this pool drains. Also the pool name.
    pub job_type: String,

    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long an idle worker sleeps before polling the queue again
    /// (milliseconds).
    #[serde(default = "default_idle_poll_interval")]
    pub idle_poll_interval_ms: u64,

    /// Per-job time limit, enforced through the cooperative stop check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
}

fn default_workers() -> usize {
    2
}

fn default_idle_poll_interval() -> u64 {
    500
}

impl PoolConfig {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            workers: default_workers(),
            idle_poll_interval_ms: default_idle_poll_interval(),
            job_timeout_secs: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_idle_poll_interval_ms(mut self, ms: u64) -> Self {
        self.idle_poll_interval_ms = ms;
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = Some(secs);
        self
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}
