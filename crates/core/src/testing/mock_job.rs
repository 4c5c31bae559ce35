//! Mock job for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::job::{Job, JobContext, JobError};
use crate::queue::JobDescriptor;

/// What a [`MockJob`] does when run.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return `Ok` immediately.
    Succeed,
    /// Return `JobError::Failed` with the message.
    Fail(String),
    /// Wait until stopped, then return the stop error.
    BlockUntilStopped,
    /// Sleep, checking for stop every few milliseconds, then succeed.
    Work(Duration),
    /// Never return and ignore the stop signal.
    IgnoreStop,
}

/// Job with scripted behavior and an optional run counter.
#[derive(Debug)]
pub struct MockJob {
    job_id: String,
    deposit_id: String,
    behavior: MockBehavior,
    runs: Option<Arc<AtomicUsize>>,
}

impl MockJob {
    pub fn new(descriptor: &JobDescriptor, behavior: MockBehavior) -> Self {
        Self {
            job_id: descriptor.job_id.clone(),
            deposit_id: descriptor.deposit_id.clone(),
            behavior,
            runs: None,
        }
    }

    pub fn succeeding(descriptor: &JobDescriptor) -> Self {
        Self::new(descriptor, MockBehavior::Succeed)
    }

    pub fn failing(descriptor: &JobDescriptor, message: &str) -> Self {
        Self::new(descriptor, MockBehavior::Fail(message.to_string()))
    }

    pub fn blocking(descriptor: &JobDescriptor) -> Self {
        Self::new(descriptor, MockBehavior::BlockUntilStopped)
    }

    pub fn working(descriptor: &JobDescriptor, duration: Duration) -> Self {
        Self::new(descriptor, MockBehavior::Work(duration))
    }

    pub fn stubborn(descriptor: &JobDescriptor) -> Self {
        Self::new(descriptor, MockBehavior::IgnoreStop)
    }

    /// Count runs in a shared counter.
    pub fn with_counter(mut self, runs: Arc<AtomicUsize>) -> Self {
        self.runs = Some(runs);
        self
    }
}

#[async_trait]
impl Job for MockJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn deposit_id(&self) -> &str {
        &self.deposit_id
    }

    async fn run(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        if let Some(ref runs) = self.runs {
            runs.fetch_add(1, Ordering::SeqCst);
        }

        match self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail(ref message) => Err(JobError::Failed(message.clone())),
            MockBehavior::BlockUntilStopped => {
                ctx.stopped().await;
                ctx.interrupt_if_stopped()
            }
            MockBehavior::Work(duration) => {
                let step = Duration::from_millis(5);
                let mut elapsed = Duration::ZERO;
                while elapsed < duration {
                    ctx.interrupt_if_stopped()?;
                    tokio::time::sleep(step).await;
                    elapsed += step;
                }
                Ok(())
            }
            MockBehavior::IgnoreStop => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
