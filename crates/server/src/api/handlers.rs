use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use deposit_core::{Config, SupervisorStatus};
use tracing::error;

use crate::metrics;
use crate::state::AppState;

/// Maximum allowed limit for list queries
pub const MAX_LIMIT: i64 = 1000;

/// Default limit for list queries
pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by API handlers: a status code and a JSON message.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn internal_error(context: &str, e: impl Display) -> ApiError {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
}

pub fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

/// Supervisor status: pipeline record, timer, pass counters and pools
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SupervisorStatus> {
    Json(state.supervisor().status())
}

/// Prometheus text exposition
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    metrics::collect_dynamic_metrics(&state);
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => internal_error("Failed to encode metrics", e).into_response(),
    }
}
