//! A named group of workers draining one job type's queue segment.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::job::{JobContext, JobError, JobFactory};
use crate::metrics;
use crate::queue::{JobDescriptor, WorkQueue};
use crate::status::{DepositState, StatusStore};

use super::types::PoolStats;
use super::{PoolConfig, PoolStatus};

/// State shared between the pool handle and its workers.
struct PoolShared {
    config: PoolConfig,
    factory: Arc<JobFactory>,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn StatusStore>,
    audit: Option<AuditHandle>,
    paused: watch::Sender<bool>,
    shutdown: CancellationToken,
    terminated: watch::Sender<bool>,
    stats: PoolStats,
    /// deposit id -> job id of jobs currently executing.
    executing: RwLock<HashMap<String, String>>,
}

/// Worker pool for one job type.
///
/// `pause` and `resume` only gate new pickups. `shutdown` is irreversible: it
/// signals in-flight jobs through their [`JobContext`] and aborts workers that
/// are still busy once the grace period has passed.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    cleanup_delay: Duration,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        config: PoolConfig,
        cleanup_delay: Duration,
        factory: Arc<JobFactory>,
        queue: Arc<dyn WorkQueue>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let store = Arc::clone(factory.store());
        let (paused, _) = watch::channel(false);
        let (terminated, _) = watch::channel(false);

        Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                queue,
                store,
                audit,
                paused,
                shutdown: CancellationToken::new(),
                terminated,
                stats: PoolStats::default(),
                executing: RwLock::new(HashMap::new()),
            }),
            cleanup_delay,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.job_type
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.is_shutdown() {
            warn!(pool = %self.name(), "Cannot start a pool that was shut down");
            return;
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            warn!(pool = %self.name(), "Worker pool already started");
            return;
        }

        for index in 0..self.shared.config.workers {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(worker_loop(shared, index)));
        }

        info!(
            pool = %self.name(),
            workers = self.shared.config.workers,
            paused = self.is_paused(),
            "Worker pool started"
        );
    }

    /// Stop taking new work. In-flight jobs continue.
    pub fn pause(&self) {
        if self.is_shutdown() {
            return;
        }
        if !self.shared.paused.send_replace(true) {
            info!(pool = %self.name(), "Worker pool paused");
        }
        metrics::POOL_PAUSED.with_label_values(&[self.name()]).set(1);
    }

    /// Take new work again.
    pub fn resume(&self) {
        if self.is_shutdown() {
            return;
        }
        if self.shared.paused.send_replace(false) {
            info!(pool = %self.name(), "Worker pool resumed");
        }
        metrics::POOL_PAUSED.with_label_values(&[self.name()]).set(0);
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Shut the pool down. Returns immediately; workers still running after
    /// `grace` are aborted in the background. Idempotent.
    pub fn shutdown(&self, grace: Duration) {
        if self.is_shutdown() {
            return;
        }
        self.shared.shutdown.cancel();
        info!(pool = %self.name(), grace_secs = grace.as_secs_f64(), "Worker pool shutting down");

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(reap(
                    Arc::clone(&self.shared),
                    workers,
                    grace,
                    self.cleanup_delay,
                ));
            }
            Err(_) => {
                for worker in &workers {
                    worker.abort();
                }
                self.shared.terminated.send_replace(true);
            }
        }
    }

    /// Wait until every worker has exited after `shutdown`.
    pub async fn terminated(&self) {
        let mut rx = self.shared.terminated.subscribe();
        // The sender lives as long as `self`, so this only returns on `true`.
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    /// Whether a job for this deposit is executing right now.
    pub fn is_executing(&self, deposit_id: &str) -> bool {
        self.shared
            .executing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(deposit_id)
    }

    pub fn status(&self) -> PoolStatus {
        let (total_processed, total_failed, total_interrupted) = self.shared.stats.totals();
        PoolStatus {
            name: self.name().to_string(),
            workers: self.shared.config.workers,
            paused: self.is_paused(),
            shutdown: self.is_shutdown(),
            terminated: *self.shared.terminated.borrow(),
            active_jobs: self.shared.stats.active(),
            queued_jobs: self.shared.queue.len(self.name()).unwrap_or(0),
            total_processed,
            total_failed,
            total_interrupted,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        for worker in self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            worker.abort();
        }
    }
}

async fn reap(
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
    cleanup_delay: Duration,
) {
    let pool = shared.config.job_type.clone();
    let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

    if tokio::time::timeout(grace, futures::future::join_all(workers))
        .await
        .is_err()
    {
        let stragglers = aborts.iter().filter(|a| !a.is_finished()).count();
        for abort in &aborts {
            abort.abort();
        }
        warn!(pool = %pool, stragglers, "Workers still busy after grace period; aborted");
        metrics::WORKERS_ABORTED
            .with_label_values(&[&pool])
            .inc_by(stragglers as u64);
    }

    shared.terminated.send_replace(true);
    info!(pool = %pool, "Worker pool terminated");

    tokio::time::sleep(cleanup_delay).await;
    shared
        .executing
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    shared.stats.active.store(0, Ordering::Relaxed);
    metrics::POOL_ACTIVE_JOBS.with_label_values(&[&pool]).set(0);
    debug!(pool = %pool, "Worker pool resources released");
}

async fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    let mut paused_rx = shared.paused.subscribe();
    debug!(pool = %shared.config.job_type, worker = index, "Worker started");

    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }

        let paused = *paused_rx.borrow_and_update();
        if paused {
            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                resumed = async { paused_rx.wait_for(|p| !*p).await.is_ok() } => {
                    if !resumed {
                        break;
                    }
                }
            }
            continue;
        }

        match shared.queue.pop(&shared.config.job_type) {
            Ok(Some(descriptor)) => shared.execute(descriptor).await,
            Ok(None) => shared.idle().await,
            Err(e) => {
                warn!(pool = %shared.config.job_type, "Failed to pop from work queue: {}", e);
                shared.idle().await;
            }
        }
    }

    debug!(pool = %shared.config.job_type, worker = index, "Worker stopped");
}

impl PoolShared {
    async fn idle(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.idle_poll_interval()) => {}
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    async fn execute(&self, descriptor: JobDescriptor) {
        let pool = self.config.job_type.as_str();

        match self
            .store
            .claim_deposit(&descriptor.deposit_id, &descriptor.job_id)
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    pool,
                    deposit_id = %descriptor.deposit_id,
                    job_id = %descriptor.job_id,
                    "Dropping stale job descriptor"
                );
                metrics::JOB_OUTCOMES.with_label_values(&[pool, "stale"]).inc();
                return;
            }
            Err(e) => {
                warn!(
                    pool,
                    deposit_id = %descriptor.deposit_id,
                    "Failed to claim deposit, requeueing: {}", e
                );
                if let Err(e) = self.queue.push(&descriptor) {
                    error!(pool, deposit_id = %descriptor.deposit_id, "Failed to requeue job: {}", e);
                }
                self.idle().await;
                return;
            }
        }

        self.executing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.deposit_id.clone(), descriptor.job_id.clone());
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        metrics::POOL_ACTIVE_JOBS.with_label_values(&[pool]).inc();

        info!(pool, deposit_id = %descriptor.deposit_id, job_id = %descriptor.job_id, "Job started");
        self.emit(AuditEvent::JobStarted {
            deposit_id: descriptor.deposit_id.clone(),
            job_id: descriptor.job_id.clone(),
            job_type: descriptor.job_type.clone(),
        })
        .await;

        let mut ctx = JobContext::new(
            descriptor.job_id.as_str(),
            descriptor.deposit_id.as_str(),
            self.shutdown.child_token(),
        );
        if let Some(limit) = self.config.job_timeout() {
            ctx = ctx.with_timeout(limit);
        }

        let started = Instant::now();
        let result = match self.factory.materialize(
            &descriptor.job_type,
            &descriptor.job_id,
            &descriptor.deposit_id,
        ) {
            Ok(mut job) => job.run(&ctx).await,
            Err(e) => Err(e),
        };

        self.record_outcome(&descriptor, result, started.elapsed()).await;

        self.executing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&descriptor.deposit_id);
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        metrics::POOL_ACTIVE_JOBS.with_label_values(&[pool]).dec();
    }

    async fn record_outcome(
        &self,
        descriptor: &JobDescriptor,
        result: Result<(), JobError>,
        elapsed: Duration,
    ) {
        let pool = self.config.job_type.as_str();
        let deposit_id = descriptor.deposit_id.clone();
        let job_id = descriptor.job_id.clone();
        let job_type = descriptor.job_type.clone();

        let (outcome, error) = match result {
            Ok(()) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                info!(pool, deposit_id = %deposit_id, elapsed_ms = elapsed.as_millis() as u64, "Job finished");
                self.emit(AuditEvent::JobCompleted {
                    deposit_id: deposit_id.clone(),
                    job_id: job_id.clone(),
                    job_type,
                    duration_ms: elapsed.as_millis() as u64,
                })
                .await;
                metrics::JOB_OUTCOMES.with_label_values(&[pool, "finished"]).inc();
                (DepositState::Finished, None)
            }
            Err(e @ JobError::Interrupted { .. }) => {
                self.stats.interrupted.fetch_add(1, Ordering::Relaxed);
                info!(pool, deposit_id = %deposit_id, "Job interrupted by shutdown; deposit left running");
                self.emit(AuditEvent::JobInterrupted {
                    deposit_id,
                    job_id,
                    job_type,
                    reason: e.to_string(),
                })
                .await;
                metrics::JOB_OUTCOMES.with_label_values(&[pool, "interrupted"]).inc();
                return;
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(pool, deposit_id = %deposit_id, "Job failed: {}", e);
                self.emit(AuditEvent::JobFailed {
                    deposit_id: deposit_id.clone(),
                    job_id: job_id.clone(),
                    job_type,
                    error: e.to_string(),
                })
                .await;
                metrics::JOB_OUTCOMES.with_label_values(&[pool, "failed"]).inc();
                (DepositState::Failed, Some(e.to_string()))
            }
        };

        match self
            .store
            .complete_deposit(&deposit_id, &job_id, outcome, error)
        {
            Ok(true) => {}
            Ok(false) => debug!(
                pool,
                deposit_id = %deposit_id,
                job_id = %job_id,
                "Deposit was re-dispatched; outcome not recorded"
            ),
            Err(e) => error!(pool, deposit_id = %deposit_id, "Failed to record job outcome: {}", e),
        }
    }
}
