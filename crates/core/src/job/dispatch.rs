use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::queue::{JobDescriptor, QueueError, WorkQueue};

use super::JobFactory;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no job registered for type {0}")]
    UnknownJobType(String),

    #[error("work queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Places job descriptors on the work queue.
///
/// Dispatch is fire-and-forget: a successful `submit` means the descriptor is
/// queued, not that any worker has seen it.
#[derive(Clone)]
pub struct JobDispatcher {
    factory: Arc<JobFactory>,
    queue: Arc<dyn WorkQueue>,
}

impl JobDispatcher {
    pub fn new(factory: Arc<JobFactory>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { factory, queue }
    }

    /// Mint a descriptor with a fresh job id for a registered job type.
    pub fn prepare(&self, job_type: &str, deposit_id: &str) -> Result<JobDescriptor, DispatchError> {
        if !self.factory.is_registered(job_type) {
            return Err(DispatchError::UnknownJobType(job_type.to_string()));
        }
        Ok(JobDescriptor::new(
            job_type,
            Uuid::new_v4().to_string(),
            deposit_id,
        ))
    }

    pub fn submit(&self, descriptor: &JobDescriptor) -> Result<(), DispatchError> {
        self.queue.push(descriptor)?;
        debug!(
            job_type = %descriptor.job_type,
            job_id = %descriptor.job_id,
            deposit_id = %descriptor.deposit_id,
            "Job descriptor queued"
        );
        Ok(())
    }
}
