use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque unit of work placed on the queue.
///
/// Workers of the pool registered for `job_type` pop descriptors and hand them
/// to the job factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_type: String,
    pub job_id: String,
    pub deposit_id: String,
}

impl JobDescriptor {
    pub fn new(
        job_type: impl Into<String>,
        job_id: impl Into<String>,
        deposit_id: impl Into<String>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            job_id: job_id.into(),
            deposit_id: deposit_id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue storage error: {0}")]
    Storage(String),
}

/// FIFO queue segmented by job type.
pub trait WorkQueue: Send + Sync {
    /// Append a descriptor to its job type's segment.
    fn push(&self, descriptor: &JobDescriptor) -> Result<(), QueueError>;

    /// Remove and return the oldest descriptor of `job_type`, if any.
    fn pop(&self, job_type: &str) -> Result<Option<JobDescriptor>, QueueError>;

    /// Number of descriptors waiting for `job_type`.
    fn len(&self, job_type: &str) -> Result<usize, QueueError>;

    fn is_empty(&self, job_type: &str) -> Result<bool, QueueError> {
        Ok(self.len(job_type)? == 0)
    }
}
