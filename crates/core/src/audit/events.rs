use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{DepositAction, DepositState, PipelineAction, PipelineState};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Registration and operator intent
    DepositRegistered {
        deposit_id: String,
        submitted_by: String,
        destination: String,
        job_type: String,
        packaging_type: String,
    },
    PipelineActionRequested {
        action: PipelineAction,
        requested_by: String,
    },
    DepositActionRequested {
        deposit_id: String,
        action: DepositAction,
        requested_by: String,
    },

    // Reconciliation
    PipelineStateChanged {
        from_state: PipelineState,
        to_state: PipelineState,
        action: PipelineAction,
    },
    DepositStateChanged {
        deposit_id: String,
        from_state: DepositState,
        to_state: DepositState,
        /// Action that drove the transition, `None` for pipeline side effects.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<DepositAction>,
    },
    /// A pending action was cleared without effect.
    ActionDiscarded {
        /// `None` for the pipeline-wide action.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deposit_id: Option<String>,
        action: String,
        state: String,
    },

    // Jobs
    JobDispatched {
        deposit_id: String,
        job_id: String,
        job_type: String,
    },
    JobDispatchFailed {
        deposit_id: String,
        job_type: String,
        error: String,
    },
    JobStarted {
        deposit_id: String,
        job_id: String,
        job_type: String,
    },
    JobCompleted {
        deposit_id: String,
        job_id: String,
        job_type: String,
        duration_ms: u64,
    },
    JobFailed {
        deposit_id: String,
        job_id: String,
        job_type: String,
        error: String,
    },
    JobInterrupted {
        deposit_id: String,
        job_id: String,
        job_type: String,
        reason: String,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::DepositRegistered { .. } => "deposit_registered",
            Self::PipelineActionRequested { .. } => "pipeline_action_requested",
            Self::DepositActionRequested { .. } => "deposit_action_requested",
            Self::PipelineStateChanged { .. } => "pipeline_state_changed",
            Self::DepositStateChanged { .. } => "deposit_state_changed",
            Self::ActionDiscarded { .. } => "action_discarded",
            Self::JobDispatched { .. } => "job_dispatched",
            Self::JobDispatchFailed { .. } => "job_dispatch_failed",
            Self::JobStarted { .. } => "job_started",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobInterrupted { .. } => "job_interrupted",
        }
    }

    pub fn deposit_id(&self) -> Option<&str> {
        match self {
            Self::DepositRegistered { deposit_id, .. }
            | Self::DepositActionRequested { deposit_id, .. }
            | Self::DepositStateChanged { deposit_id, .. }
            | Self::JobDispatched { deposit_id, .. }
            | Self::JobDispatchFailed { deposit_id, .. }
            | Self::JobStarted { deposit_id, .. }
            | Self::JobCompleted { deposit_id, .. }
            | Self::JobFailed { deposit_id, .. }
            | Self::JobInterrupted { deposit_id, .. } => Some(deposit_id),
            Self::ActionDiscarded { deposit_id, .. } => deposit_id.as_deref(),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::DepositRegistered { submitted_by, .. } => Some(submitted_by),
            Self::PipelineActionRequested { requested_by, .. }
            | Self::DepositActionRequested { requested_by, .. } => Some(requested_by),
            _ => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub deposit_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
