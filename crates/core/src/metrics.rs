//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reconciliation passes of the action monitoring task
//! - Pipeline and deposit transitions
//! - Job dispatch and execution
//! - Worker pools

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts,
};

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconciliation passes total by result.
pub static RECONCILE_PASSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_reconcile_passes_total",
            "Total reconciliation passes",
        ),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Reconciliation pass duration in seconds.
pub static RECONCILE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "deposit_reconcile_duration_seconds",
            "Duration of a reconciliation pass",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .unwrap()
});

/// Deposits examined by the most recent pass.
pub static DEPOSITS_EXAMINED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deposit_reconcile_deposits_examined",
        "Deposits in the working set during the last pass",
    )
    .unwrap()
});

// =============================================================================
// Transitions
// =============================================================================

/// Pipeline state transitions.
pub static PIPELINE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_pipeline_transitions_total",
            "Pipeline state transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Deposit state transitions applied by the monitoring task.
pub static DEPOSIT_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_state_transitions_total",
            "Deposit state transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Pending actions discarded without effect.
pub static STALE_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_stale_actions_total",
            "Pending actions cleared without effect",
        ),
        &["scope", "action"], // scope: "pipeline", "deposit"
    )
    .unwrap()
});

/// Deposit actions deferred by the pipeline gate.
pub static DEFERRED_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_deferred_actions_total",
            "Deposit actions kept for a later pass",
        ),
        &["action"],
    )
    .unwrap()
});

// =============================================================================
// Jobs
// =============================================================================

/// Job dispatches by job type and result.
pub static JOB_DISPATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deposit_job_dispatches_total", "Job dispatch attempts"),
        &["job_type", "result"], // result: "ok", "failed"
    )
    .unwrap()
});

/// Job outcomes by job type.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deposit_job_outcomes_total", "Executed job outcomes"),
        &["job_type", "outcome"], // "finished", "failed", "interrupted", "stale"
    )
    .unwrap()
});

// =============================================================================
// Worker pools
// =============================================================================

/// Jobs currently executing per pool.
pub static POOL_ACTIVE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("deposit_pool_active_jobs", "Jobs executing in a worker pool"),
        &["pool"],
    )
    .unwrap()
});

/// Whether a pool is paused (1) or taking work (0).
pub static POOL_PAUSED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("deposit_pool_paused", "Worker pool paused flag"),
        &["pool"],
    )
    .unwrap()
});

/// Forced worker terminations after the shutdown grace period.
pub static WORKERS_ABORTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "deposit_pool_workers_aborted_total",
            "Workers aborted after the shutdown grace period",
        ),
        &["pool"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Reconciliation
        Box::new(RECONCILE_PASSES.clone()),
        Box::new(RECONCILE_DURATION.clone()),
        Box::new(DEPOSITS_EXAMINED.clone()),
        // Transitions
        Box::new(PIPELINE_TRANSITIONS.clone()),
        Box::new(DEPOSIT_TRANSITIONS.clone()),
        Box::new(STALE_ACTIONS.clone()),
        Box::new(DEFERRED_ACTIONS.clone()),
        // Jobs
        Box::new(JOB_DISPATCHES.clone()),
        Box::new(JOB_OUTCOMES.clone()),
        // Pools
        Box::new(POOL_ACTIVE_JOBS.clone()),
        Box::new(POOL_PAUSED.clone()),
        Box::new(WORKERS_ABORTED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        JOB_DISPATCHES.with_label_values(&["finalize", "ok"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "deposit_job_dispatches_total"));
    }
}
