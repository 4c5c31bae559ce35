use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditHandle;
use crate::job::JobFactory;
use crate::queue::WorkQueue;

use super::{PoolConfig, PoolStatus, WorkerPool};

/// The set of worker pools owned by the supervisor, one per job type.
pub struct WorkerPools {
    pools: Vec<Arc<WorkerPool>>,
}

impl WorkerPools {
    pub fn new(
        configs: &[PoolConfig],
        cleanup_delay: Duration,
        factory: Arc<JobFactory>,
        queue: Arc<dyn WorkQueue>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let pools = configs
            .iter()
            .map(|config| {
                Arc::new(WorkerPool::new(
                    config.clone(),
                    cleanup_delay,
                    Arc::clone(&factory),
                    Arc::clone(&queue),
                    audit.clone(),
                ))
            })
            .collect();
        Self { pools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<WorkerPool>> {
        self.pools.iter().find(|pool| pool.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkerPool>> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn start_all(&self) {
        self.pools.iter().for_each(|pool| pool.start());
    }

    pub fn pause_all(&self) {
        self.pools.iter().for_each(|pool| pool.pause());
    }

    pub fn resume_all(&self) {
        self.pools.iter().for_each(|pool| pool.resume());
    }

    pub fn shutdown_all(&self, grace: Duration) {
        self.pools.iter().for_each(|pool| pool.shutdown(grace));
    }

    pub fn all_shutdown(&self) -> bool {
        self.pools.iter().all(|pool| pool.is_shutdown())
    }

    /// Whether any pool is executing a job for the deposit.
    pub fn is_executing(&self, deposit_id: &str) -> bool {
        self.pools.iter().any(|pool| pool.is_executing(deposit_id))
    }

    pub fn statuses(&self) -> Vec<PoolStatus> {
        self.pools.iter().map(|pool| pool.status()).collect()
    }

    /// Wait for every pool to terminate after `shutdown_all`.
    pub async fn wait_terminated(&self) {
        futures::future::join_all(self.pools.iter().map(|pool| pool.terminated())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryWorkQueue;
    use crate::status::{SqliteStatusStore, StatusStore};
    use crate::testing::MockJob;

    fn pools() -> WorkerPools {
        let store: Arc<dyn StatusStore> = Arc::new(SqliteStatusStore::in_memory().unwrap());
        let factory = JobFactory::new(store)
            .with_job("a", |d, _| Box::new(MockJob::succeeding(d)))
            .with_job("b", |d, _| Box::new(MockJob::succeeding(d)));
        WorkerPools::new(
            &[PoolConfig::new("a"), PoolConfig::new("b").with_workers(1)],
            Duration::from_millis(10),
            Arc::new(factory),
            Arc::new(MemoryWorkQueue::new()),
            None,
        )
    }

    #[tokio::test]
    async fn test_pause_resume_all() {
        let pools = pools();
        pools.start_all();

        pools.pause_all();
        assert!(pools.iter().all(|p| p.is_paused()));

        pools.resume_all();
        assert!(pools.iter().all(|p| !p.is_paused()));
    }

    #[tokio::test]
    async fn test_shutdown_all_terminates() {
        let pools = pools();
        pools.start_all();
        pools.shutdown_all(Duration::from_secs(1));
        assert!(pools.all_shutdown());

        tokio::time::timeout(Duration::from_secs(2), pools.wait_terminated())
            .await
            .expect("pools should terminate");
        assert!(pools.statuses().iter().all(|s| s.terminated));
    }

    #[test]
    fn test_lookup_by_name() {
        let pools = pools();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools.get("b").unwrap().config().workers, 1);
        assert!(pools.get("c").is_none());
        assert!(!pools.is_executing("d1"));
    }
}
