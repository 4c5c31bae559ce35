//! Types for the pipeline supervisor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::{MonitorError, PassReport};
use crate::pool::PoolStatus;
use crate::status::{PipelineStatus, StatusError};

/// Errors surfaced by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A reconciliation pass failed.
    #[error("reconciliation pass failed: {0}")]
    Pass(#[from] MonitorError),

    /// Status store error outside a pass.
    #[error("status store error: {0}")]
    Status(#[from] StatusError),

    /// The blocking pass task panicked or was cancelled.
    #[error("reconciliation task did not complete: {0}")]
    Join(String),
}

/// Current status of the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorStatus {
    /// Pipeline record, `None` when the store could not be read.
    pub pipeline: Option<PipelineStatus>,
    /// Whether the recurring pass timer is running.
    pub running: bool,
    pub passes_ok: u64,
    pub passes_failed: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_report: Option<PassReport>,
    /// Last pass error message, cleared by the next successful pass.
    pub last_error: Option<String>,
    pub pools: Vec<PoolStatus>,
}

/// Outcome of the most recent pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct LastPass {
    pub(crate) at: Option<DateTime<Utc>>,
    pub(crate) report: Option<PassReport>,
    pub(crate) error: Option<String>,
}

/// Pass counters shared between `run_once` callers and the timer loop.
#[derive(Debug, Default)]
pub(crate) struct PassStats {
    ok: AtomicU64,
    failed: AtomicU64,
    last: Mutex<LastPass>,
}

impl PassStats {
    pub(crate) fn record(&self, result: &Result<PassReport, SupervisorError>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.at = Some(Utc::now());
        match result {
            Ok(report) => {
                self.ok.fetch_add(1, Ordering::Relaxed);
                last.report = Some(report.clone());
                last.error = None;
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                last.error = Some(e.to_string());
            }
        }
    }

    /// `(passes_ok, passes_failed, last pass)`
    pub(crate) fn snapshot(&self) -> (u64, u64, LastPass) {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner).clone();
        (
            self.ok.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            last,
        )
    }
}
