use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::queue::JobDescriptor;
use crate::status::StatusStore;

use super::{Job, JobContext, JobDeps, JobError};

pub const FINALIZE_JOB_TYPE: &str = "finalize";

const STEPS: [&str; 3] = ["verify", "index", "publish"];

/// Default job: checks the deposit record and walks the finalization steps,
/// stopping cleanly between steps when asked to.
pub struct FinalizeDepositJob {
    job_id: String,
    deposit_id: String,
    store: Arc<dyn StatusStore>,
    step_delay: Duration,
}

impl FinalizeDepositJob {
    pub fn new(descriptor: &JobDescriptor, deps: &JobDeps) -> Self {
        Self {
            job_id: descriptor.job_id.clone(),
            deposit_id: descriptor.deposit_id.clone(),
            store: Arc::clone(&deps.store),
            step_delay: Duration::ZERO,
        }
    }

    /// Pause between steps.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

#[async_trait]
impl Job for FinalizeDepositJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn deposit_id(&self) -> &str {
        &self.deposit_id
    }

    async fn run(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let deposit = self
            .store
            .get_deposit(&self.deposit_id)?
            .ok_or_else(|| JobError::Failed(format!("deposit {} has no status record", self.deposit_id)))?;

        if deposit.destination.is_empty() {
            return Err(JobError::Failed("deposit has no destination".to_string()));
        }

        for step in STEPS {
            ctx.interrupt_if_stopped()?;
            debug!(deposit_id = %self.deposit_id, step, "Finalize step");

            if !self.step_delay.is_zero() {
                tokio::select! {
                    _ = ctx.stopped() => {}
                    _ = tokio::time::sleep(self.step_delay) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
        ctx.interrupt_if_stopped()?;

        info!(
            deposit_id = %self.deposit_id,
            destination = %deposit.destination,
            "Deposit finalized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{DepositMetadata, DepositState, DepositStatus, SqliteStatusStore};
    use chrono::Utc;
    use tokio_util::sync::CancellationToken;

    fn setup(destination: &str) -> (Arc<dyn StatusStore>, JobDeps) {
        let store: Arc<dyn StatusStore> = Arc::new(SqliteStatusStore::in_memory().unwrap());
        let now = Utc::now();
        store
            .insert_deposit(&DepositStatus {
                id: "d1".to_string(),
                state: DepositState::Running,
                pending_action: None,
                destination: destination.to_string(),
                job_type: FINALIZE_JOB_TYPE.to_string(),
                current_job_id: Some("j1".to_string()),
                metadata: DepositMetadata::new("alice", "bagit"),
                error: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        let deps = JobDeps {
            store: Arc::clone(&store),
        };
        (store, deps)
    }

    #[tokio::test]
    async fn test_finalize_completes() {
        let (_store, deps) = setup("collections/theses");
        let descriptor = JobDescriptor::new(FINALIZE_JOB_TYPE, "j1", "d1");
        let mut job = FinalizeDepositJob::new(&descriptor, &deps);
        let ctx = JobContext::new("j1", "d1", CancellationToken::new());
        job.run(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_fails_without_record() {
        let (_store, deps) = setup("collections/theses");
        let descriptor = JobDescriptor::new(FINALIZE_JOB_TYPE, "j1", "missing");
        let mut job = FinalizeDepositJob::new(&descriptor, &deps);
        let ctx = JobContext::new("j1", "missing", CancellationToken::new());
        assert!(matches!(job.run(&ctx).await, Err(JobError::Failed(_))));
    }

    #[tokio::test]
    async fn test_finalize_stops_when_cancelled() {
        let (_store, deps) = setup("collections/theses");
        let descriptor = JobDescriptor::new(FINALIZE_JOB_TYPE, "j1", "d1");
        let mut job = FinalizeDepositJob::new(&descriptor, &deps)
            .with_step_delay(Duration::from_secs(60));

        let token = CancellationToken::new();
        let ctx = JobContext::new("j1", "d1", token.clone());
        token.cancel();

        let err = job.run(&ctx).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}
