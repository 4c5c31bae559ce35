//! Status store trait and query types.

use thiserror::Error;

use super::{
    DepositAction, DepositField, DepositState, DepositStatus, PipelineAction, PipelineState,
    PipelineStatus,
};

/// Error type for status store operations.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Deposit record not found.
    #[error("deposit not found: {0}")]
    NotFound(String),

    /// A deposit with this id already exists.
    #[error("deposit already exists: {0}")]
    AlreadyExists(String),

    /// A persisted record could not be decoded.
    #[error("corrupt status record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Database/connectivity error.
    #[error("database error: {0}")]
    Database(String),
}

/// Filter for querying deposit records.
#[derive(Debug, Clone, Default)]
pub struct DepositFilter {
    /// Filter by state.
    pub state: Option<DepositState>,
    /// Filter by submitting principal.
    pub submitted_by: Option<String>,
    /// Maximum number of results (`None` = unbounded).
    pub limit: Option<i64>,
    /// Offset for pagination.
    pub offset: i64,
}

impl DepositFilter {
    /// Create a new filter with defaults (first 100 records).
    pub fn new() -> Self {
        Self {
            state: None,
            submitted_by: None,
            limit: Some(100),
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: DepositState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_submitted_by(mut self, submitted_by: impl Into<String>) -> Self {
        self.submitted_by = Some(submitted_by.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Remove the result limit.
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Shared, key-addressable store of pipeline and deposit status records.
///
/// Writers that resolve actions use the conditional operations
/// (`clear_*_action`, `update_deposit_if`, `claim_deposit`, ...) so that a value
/// written concurrently by another actor is never overwritten or lost.
pub trait StatusStore: Send + Sync {
    /// Read the singleton pipeline record.
    fn pipeline_status(&self) -> Result<PipelineStatus, StatusError>;

    /// Overwrite the pipeline state.
    fn set_pipeline_state(&self, state: PipelineState) -> Result<(), StatusError>;

    /// Write the pipeline pending action, replacing any earlier request.
    fn request_pipeline_action(&self, action: PipelineAction) -> Result<(), StatusError>;

    /// Clear the pipeline pending action if it still equals `observed`.
    /// Returns whether the field was cleared.
    fn clear_pipeline_action(&self, observed: PipelineAction) -> Result<bool, StatusError>;

    /// Get a deposit record by id.
    fn get_deposit(&self, id: &str) -> Result<Option<DepositStatus>, StatusError>;

    /// Insert a new deposit record.
    fn insert_deposit(&self, status: &DepositStatus) -> Result<(), StatusError>;

    /// Overwrite a whole deposit record.
    fn put_deposit(&self, status: &DepositStatus) -> Result<(), StatusError>;

    /// Write several fields of a deposit record at once.
    fn set_deposit_fields(&self, id: &str, fields: &[DepositField]) -> Result<(), StatusError>;

    /// Write a single field of a deposit record.
    fn set_deposit_field(&self, id: &str, field: DepositField) -> Result<(), StatusError> {
        self.set_deposit_fields(id, std::slice::from_ref(&field))
    }

    /// Write fields only if the deposit is still in `expected` state.
    /// Returns whether the write happened.
    fn update_deposit_if(
        &self,
        id: &str,
        expected: DepositState,
        fields: &[DepositField],
    ) -> Result<bool, StatusError>;

    /// Write the deposit pending action, replacing any earlier request.
    fn request_deposit_action(&self, id: &str, action: DepositAction) -> Result<(), StatusError> {
        self.set_deposit_field(id, DepositField::PendingAction(Some(action)))
    }

    /// Write the deposit pending action only if no action is outstanding.
    /// Returns whether the action was written.
    fn offer_deposit_action(&self, id: &str, action: DepositAction) -> Result<bool, StatusError>;

    /// Clear the deposit pending action if it still equals `observed`.
    fn clear_deposit_action(&self, id: &str, observed: DepositAction)
        -> Result<bool, StatusError>;

    /// Move a `queued` deposit whose current job is `job_id` to `running`.
    /// Returns false when the descriptor is stale.
    fn claim_deposit(&self, id: &str, job_id: &str) -> Result<bool, StatusError>;

    /// Record the outcome of job `job_id`, unless the deposit has since been
    /// handed to another job.
    fn complete_deposit(
        &self,
        id: &str,
        job_id: &str,
        outcome: DepositState,
        error: Option<String>,
    ) -> Result<bool, StatusError>;

    /// Ids of all deposits not in a terminal state, highest priority first.
    fn active_deposit_ids(&self) -> Result<Vec<String>, StatusError>;

    /// List deposits matching the filter.
    fn list_deposits(&self, filter: &DepositFilter) -> Result<Vec<DepositStatus>, StatusError>;

    /// Count deposits matching the filter.
    fn count_deposits(&self, filter: &DepositFilter) -> Result<i64, StatusError>;
}
