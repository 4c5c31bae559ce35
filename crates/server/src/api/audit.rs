use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use deposit_core::{AuditFilter, AuditRecord};

use super::handlers::{internal_error, ApiError, DEFAULT_LIMIT, MAX_LIMIT};
use crate::state::AppState;

/// Query parameters for the audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub deposit_id: Option<String>,
    /// Comma-separated; an event matching any listed type is returned
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    /// Events at or after this timestamp (RFC 3339)
    pub since: Option<DateTime<Utc>>,
    /// Events at or before this timestamp (RFC 3339)
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// Matching events, newest first
    pub events: Vec<AuditRecord>,
    /// Total matching events, ignoring pagination
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = AuditFilter::new();
    if let Some(deposit_id) = params.deposit_id {
        filter = filter.with_deposit_id(deposit_id);
    }
    for event_type in params
        .event_type
        .iter()
        .flat_map(|types| types.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        filter = filter.with_event_type(event_type);
    }
    if let Some(user_id) = params.user_id {
        filter = filter.with_user_id(user_id);
    }
    if let Some(since) = params.since {
        filter = filter.since(since);
    }
    if let Some(until) = params.until {
        filter = filter.until(until);
    }

    let total = state
        .audit_store()
        .count(&filter)
        .map_err(|e| internal_error("Failed to count audit events", e))?;
    let events = state
        .audit_store()
        .query(&filter.with_limit(limit).with_offset(offset))
        .map_err(|e| internal_error("Failed to query audit events", e))?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
