use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time status of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name, equal to the job type it serves.
    pub name: String,
    pub workers: usize,
    pub paused: bool,
    pub shutdown: bool,
    /// All workers have exited after a shutdown.
    pub terminated: bool,
    pub active_jobs: usize,
    /// Descriptors waiting on the pool's queue segment.
    pub queued_jobs: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_interrupted: u64,
}

/// Counters shared by the workers of one pool.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    pub(crate) active: AtomicUsize,
    pub(crate) processed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) interrupted: AtomicU64,
}

impl PoolStats {
    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn totals(&self) -> (u64, u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.interrupted.load(Ordering::Relaxed),
        )
    }
}
