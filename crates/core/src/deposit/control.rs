use std::sync::Arc;

use tracing::info;

use crate::audit::{AuditEvent, AuditHandle};
use crate::status::{DepositAction, PipelineAction, StatusError, StatusStore};

/// Operator requests. Each is a single write of a pending action; the
/// monitoring task decides on the next pass whether it applies.
pub struct OperatorControl {
    store: Arc<dyn StatusStore>,
    audit: Option<AuditHandle>,
}

impl OperatorControl {
    pub fn new(store: Arc<dyn StatusStore>, audit: Option<AuditHandle>) -> Self {
        Self { store, audit }
    }

    /// Request a pipeline-wide action, replacing any outstanding request.
    pub fn request_pipeline_action(
        &self,
        action: PipelineAction,
        requested_by: &str,
    ) -> Result<(), StatusError> {
        self.store.request_pipeline_action(action)?;
        info!(%action, requested_by, "Pipeline action requested");

        if let Some(ref audit) = self.audit {
            audit.try_emit(AuditEvent::PipelineActionRequested {
                action,
                requested_by: requested_by.to_string(),
            });
        }
        Ok(())
    }

    /// Request an action on one deposit, replacing any outstanding request.
    pub fn request_deposit_action(
        &self,
        deposit_id: &str,
        action: DepositAction,
        requested_by: &str,
    ) -> Result<(), StatusError> {
        self.store.request_deposit_action(deposit_id, action)?;
        info!(deposit_id, %action, requested_by, "Deposit action requested");

        if let Some(ref audit) = self.audit {
            audit.try_emit(AuditEvent::DepositActionRequested {
                deposit_id: deposit_id.to_string(),
                action,
                requested_by: requested_by.to_string(),
            });
        }
        Ok(())
    }
}
