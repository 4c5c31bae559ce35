use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::DepositsConfig;
use crate::status::{DepositAction, DepositMetadata, DepositState, DepositStatus, StatusError, StatusStore};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("deposit destination must not be empty")]
    EmptyDestination,

    #[error("deposit submitter must not be empty")]
    EmptySubmitter,

    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Registration entry point for new deposits.
///
/// Registration only writes the initial record (`unregistered`, pending
/// `register`); the monitoring task dispatches it once the pipeline is active.
pub struct DepositHandler {
    store: Arc<dyn StatusStore>,
    deposits: DepositsConfig,
    audit: Option<AuditHandle>,
}

impl DepositHandler {
    pub fn new(
        store: Arc<dyn StatusStore>,
        deposits: DepositsConfig,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            deposits,
            audit,
        }
    }

    /// Register a deposit and return its id.
    pub fn register(
        &self,
        destination: &str,
        metadata: DepositMetadata,
    ) -> Result<String, RegistrationError> {
        if destination.trim().is_empty() {
            return Err(RegistrationError::EmptyDestination);
        }
        if metadata.submitted_by.trim().is_empty() {
            return Err(RegistrationError::EmptySubmitter);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let job_type = self.deposits.job_type_for(&metadata.packaging_type).to_string();
        let now = Utc::now();

        let status = DepositStatus {
            id: id.clone(),
            state: DepositState::Unregistered,
            pending_action: Some(DepositAction::Register),
            destination: destination.to_string(),
            job_type: job_type.clone(),
            current_job_id: None,
            metadata,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_deposit(&status)?;

        info!(
            deposit_id = %id,
            job_type = %job_type,
            submitted_by = %status.metadata.submitted_by,
            "Deposit registered"
        );

        if let Some(ref audit) = self.audit {
            audit.try_emit(AuditEvent::DepositRegistered {
                deposit_id: id.clone(),
                submitted_by: status.metadata.submitted_by,
                destination: status.destination,
                job_type,
                packaging_type: status.metadata.packaging_type,
            });
        }

        Ok(id)
    }
}
