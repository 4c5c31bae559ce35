//! Read-only deposit status handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use deposit_core::{DepositFilter, DepositState, DepositStatus};

use super::handlers::{internal_error, not_found, ApiError, ErrorResponse, DEFAULT_LIMIT, MAX_LIMIT};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDepositsParams {
    /// Filter by state, e.g. `queued`
    pub state: Option<String>,
    pub submitted_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListDepositsResponse {
    pub deposits: Vec<DepositStatus>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List deposits, highest priority first
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDepositsParams>,
) -> Result<Json<ListDepositsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = DepositFilter::new();
    if let Some(ref raw) = params.state {
        let deposit_state: DepositState = raw.parse().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("{}", e),
                }),
            )
        })?;
        filter = filter.with_state(deposit_state);
    }
    if let Some(submitted_by) = params.submitted_by {
        filter = filter.with_submitted_by(submitted_by);
    }

    let store = state.supervisor().store();
    let total = store
        .count_deposits(&filter)
        .map_err(|e| internal_error("Failed to count deposits", e))?;
    let deposits = store
        .list_deposits(&filter.with_limit(limit).with_offset(offset))
        .map_err(|e| internal_error("Failed to list deposits", e))?;

    Ok(Json(ListDepositsResponse {
        deposits,
        total,
        limit,
        offset,
    }))
}

pub async fn get_deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DepositStatus>, ApiError> {
    match state.supervisor().store().get_deposit(&id) {
        Ok(Some(deposit)) => Ok(Json(deposit)),
        Ok(None) => Err(not_found(format!("deposit not found: {}", id))),
        Err(e) => Err(internal_error("Failed to read deposit", e)),
    }
}
