//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the deposit pipeline server:
//! - HTTP request metrics (latency, counts)
//! - Deposit counts by state and the pipeline state (collected on scrape)
//! - Core reconciliation, job and pool metrics (registered from the core)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::error;

use deposit_core::{DepositFilter, DepositState, PipelineState};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "deposit_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deposit_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deposit_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics (collected on scrape)
// =============================================================================

/// Deposits by current state.
pub static DEPOSITS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("deposits_by_state", "Current deposit count by state"),
        &["state"],
    )
    .unwrap()
});

/// Pipeline state, 1 for the current state and 0 for the others.
pub static PIPELINE_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("deposit_pipeline_state", "Current pipeline state"),
        &["state"],
    )
    .unwrap()
});

/// Reconciliation timer running (1) or stopped (0).
pub static SUPERVISOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "deposit_supervisor_running",
        "Whether the reconciliation timer is running",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(DEPOSITS_BY_STATE.clone()),
        Box::new(PIPELINE_STATE.clone()),
        Box::new(SUPERVISOR_RUNNING.clone()),
    ];

    for metric in local.into_iter().chain(deposit_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(metric) {
            error!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Refresh gauges derived from the status store and supervisor.
pub fn collect_dynamic_metrics(state: &AppState) {
    let supervisor = state.supervisor();
    SUPERVISOR_RUNNING.set(i64::from(supervisor.is_running()));

    if let Ok(pipeline) = supervisor.store().pipeline_status() {
        for candidate in [
            PipelineState::Active,
            PipelineState::Quieted,
            PipelineState::Stopped,
            PipelineState::Shutdown,
        ] {
            PIPELINE_STATE
                .with_label_values(&[candidate.as_str()])
                .set(i64::from(candidate == pipeline.state));
        }
    }

    for deposit_state in DepositState::working_set()
        .into_iter()
        .chain([DepositState::Finished, DepositState::Failed])
    {
        let filter = DepositFilter::new().with_state(deposit_state);
        if let Ok(count) = supervisor.store().count_deposits(&filter) {
            DEPOSITS_BY_STATE
                .with_label_values(&[deposit_state.as_str()])
                .set(count);
        }
    }
}
