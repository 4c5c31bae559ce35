use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored row could not be decoded.
    #[error("corrupt audit record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Audit query. Results are ordered newest first.
///
/// Every set criterion must match; `event_types` matches any of its entries.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub deposit_id: Option<String>,
    pub event_types: Vec<String>,
    pub user_id: Option<String>,
    /// Inclusive lower bound on the event timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event timestamp.
    pub until: Option<DateTime<Utc>>,
    /// `None` returns every match.
    pub limit: Option<i64>,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditFilter {
    /// Match everything, first 100 records.
    pub fn new() -> Self {
        Self {
            deposit_id: None,
            event_types: Vec::new(),
            user_id: None,
            since: None,
            until: None,
            limit: Some(100),
            offset: 0,
        }
    }

    /// Full history of one deposit.
    pub fn for_deposit(deposit_id: impl Into<String>) -> Self {
        Self::new().with_deposit_id(deposit_id).unbounded()
    }

    pub fn with_deposit_id(mut self, deposit_id: impl Into<String>) -> Self {
        self.deposit_id = Some(deposit_id.into());
        self
    }

    /// Add an accepted event type (see `AuditEvent::event_type`).
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Persistence for audit records.
pub trait AuditStore: Send + Sync {
    /// Insert a record, returning its assigned id.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Count matches, ignoring `limit` and `offset`.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
