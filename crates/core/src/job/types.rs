use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::status::StatusError;

#[derive(Debug, Error)]
pub enum JobError {
    /// The owning pool was shut down.
    #[error("job {job_id} interrupted")]
    Interrupted { job_id: String },

    /// The job ran past its configured time limit.
    #[error("job {job_id} exceeded its time limit of {limit:?}")]
    TimedOut { job_id: String, limit: Duration },

    #[error("unknown job type: {0}")]
    UnknownType(String),

    #[error("status store error: {0}")]
    Status(#[from] StatusError),

    #[error("job failed: {0}")]
    Failed(String),
}

impl JobError {
    /// Whether the error came from the cooperative stop check rather than a
    /// genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::TimedOut { .. })
    }
}

/// Execution context handed to a running job.
///
/// Carries the stop signal of the owning pool and an optional deadline. Both
/// surface through [`JobContext::interrupt_if_stopped`].
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub deposit_id: String,
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl JobContext {
    pub fn new(
        job_id: impl Into<String>,
        deposit_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            deposit_id: deposit_id.into(),
            cancel,
            deadline: None,
        }
    }

    /// Limit the job's run time, measured from now.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.deadline = Some((Instant::now() + limit, limit));
        self
    }

    /// Return an error if the job should stop at this point.
    pub fn interrupt_if_stopped(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Interrupted {
                job_id: self.job_id.clone(),
            });
        }
        if let Some((deadline, limit)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(JobError::TimedOut {
                    job_id: self.job_id.clone(),
                    limit,
                });
            }
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.interrupt_if_stopped().is_err()
    }

    /// Completes once the job should stop. Useful in `select!` around awaits
    /// that have no natural check point.
    pub async fn stopped(&self) {
        match self.deadline {
            Some((deadline, _)) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

/// Unit of work bound to one deposit.
///
/// Implementations call [`JobContext::interrupt_if_stopped`] at safe points in
/// long loops and propagate the error with `?`.
#[async_trait]
pub trait Job: Send {
    fn job_id(&self) -> &str;

    fn deposit_id(&self) -> &str;

    async fn run(&mut self, ctx: &JobContext) -> Result<(), JobError>;
}
