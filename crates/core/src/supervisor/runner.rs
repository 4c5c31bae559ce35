//! Deposit pipeline supervisor implementation.
//!
//! Owns the worker pools and the action monitoring task, and drives the task
//! from a single background timer. Passes are serialized: the timer loop and
//! `run_once` callers share one pass lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::AuditHandle;
use crate::job::{JobDispatcher, JobFactory};
use crate::metrics;
use crate::monitor::{ActionMonitoringTask, PassReport};
use crate::pool::{PoolConfig, WorkerPools};
use crate::queue::WorkQueue;
use crate::status::{PipelineState, StatusStore};

use super::config::SupervisorConfig;
use super::types::{PassStats, SupervisorError, SupervisorStatus};

/// Runs serialized passes and records their outcome.
#[derive(Clone)]
struct Reconciler {
    task: Arc<ActionMonitoringTask>,
    pass_lock: Arc<tokio::sync::Mutex<()>>,
    stats: Arc<PassStats>,
}

impl Reconciler {
    async fn run_pass(&self) -> Result<PassReport, SupervisorError> {
        let _pass = self.pass_lock.lock().await;

        let task = Arc::clone(&self.task);
        let timer = metrics::RECONCILE_DURATION.start_timer();
        let result = match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(result) => result.map_err(SupervisorError::from),
            Err(e) => Err(SupervisorError::Join(e.to_string())),
        };
        timer.observe_duration();

        match &result {
            Ok(report) => {
                metrics::RECONCILE_PASSES.with_label_values(&["ok"]).inc();
                metrics::DEPOSITS_EXAMINED.set(report.deposits_examined as i64);
                if !report.is_noop() {
                    debug!(
                        pipeline = %report.pipeline_state,
                        examined = report.deposits_examined,
                        transitions = report.transitions,
                        deferred = report.deferred,
                        discarded = report.discarded,
                        "Reconciliation pass applied changes"
                    );
                }
            }
            Err(e) => {
                metrics::RECONCILE_PASSES.with_label_values(&["error"]).inc();
                error!("Reconciliation pass failed: {}", e);
            }
        }

        self.stats.record(&result);
        result
    }
}

/// The deposit pipeline supervisor.
pub struct PipelineSupervisor {
    config: SupervisorConfig,
    store: Arc<dyn StatusStore>,
    pools: Arc<WorkerPools>,
    reconciler: Reconciler,

    // Runtime state
    started: AtomicBool,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineSupervisor {
    /// Create a supervisor with one worker pool per entry of `pool_configs`.
    ///
    /// The status store is the one the factory hands to jobs.
    pub fn new(
        config: SupervisorConfig,
        factory: Arc<JobFactory>,
        queue: Arc<dyn WorkQueue>,
        pool_configs: &[PoolConfig],
        audit: Option<AuditHandle>,
    ) -> Self {
        let store = Arc::clone(factory.store());
        let pools = Arc::new(WorkerPools::new(
            pool_configs,
            config.cleanup_delay(),
            Arc::clone(&factory),
            Arc::clone(&queue),
            audit.clone(),
        ));
        let task = ActionMonitoringTask::new(
            Arc::clone(&store),
            Arc::clone(&pools),
            JobDispatcher::new(factory, queue),
            config.unavailable_delay(),
            audit,
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            pools,
            reconciler: Reconciler {
                task: Arc::new(task),
                pass_lock: Arc::new(tokio::sync::Mutex::new(())),
                stats: Arc::new(PassStats::default()),
            },
            started: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            timer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    pub fn pools(&self) -> &Arc<WorkerPools> {
        &self.pools
    }

    /// Start the worker pools and, when enabled, the recurring pass.
    ///
    /// Pools are first aligned with the persisted pipeline state: paused when
    /// `quieted`, shut down when `stopped`. Must be called from within a Tokio
    /// runtime.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Supervisor already started");
            return Ok(());
        }

        let pipeline = match self.store.pipeline_status() {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        match pipeline.state {
            PipelineState::Active => self.pools.start_all(),
            PipelineState::Quieted => {
                self.pools.pause_all();
                self.pools.start_all();
            }
            PipelineState::Stopped | PipelineState::Shutdown => {
                self.pools.shutdown_all(Duration::ZERO);
            }
        }

        if self.config.enabled {
            self.spawn_timer();
        } else {
            info!("Recurring reconciliation disabled");
        }

        info!(
            pipeline = %pipeline.state,
            pools = self.pools.len(),
            poll_interval_ms = self.config.poll_interval_ms,
            "Deposit pipeline supervisor started"
        );
        Ok(())
    }

    /// Run one reconciliation pass, waiting for any pass in flight first.
    pub async fn run_once(&self) -> Result<PassReport, SupervisorError> {
        self.reconciler.run_pass().await
    }

    /// Halt the recurring pass. With `await_completion`, wait until the timer
    /// loop has exited and any pass in flight, including one started by
    /// `run_once`, has finished.
    pub async fn stop(&self, await_completion: bool) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping reconciliation timer");
            let _ = self.shutdown_tx.send(());

            let handle = self
                .timer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if await_completion {
                if let Some(handle) = handle {
                    if let Err(e) = handle.await {
                        warn!("Reconciliation timer ended abnormally: {}", e);
                    }
                }
            }
        } else {
            debug!("Reconciliation timer not running");
        }

        if await_completion {
            // Held for the whole of every pass
            drop(self.reconciler.pass_lock.lock().await);
        }
    }

    /// Process-level shutdown: stop the timer, record pipeline state
    /// `shutdown`, shut every pool down and wait for the workers to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down deposit pipeline supervisor");
        self.stop(true).await;

        {
            // Keep `run_once` callers out while the terminal state is written
            let _pass = self.reconciler.pass_lock.lock().await;
            match self.store.set_pipeline_state(PipelineState::Shutdown) {
                Ok(()) => info!("Pipeline state set to shutdown"),
                Err(e) => error!("Failed to record pipeline shutdown: {}", e),
            }
            self.pools.shutdown_all(self.config.unavailable_delay());
        }

        self.pools.wait_terminated().await;
        info!("Deposit pipeline supervisor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Current supervisor status.
    pub fn status(&self) -> SupervisorStatus {
        let pipeline = match self.store.pipeline_status() {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                warn!("Failed to read pipeline status: {}", e);
                None
            }
        };
        let (passes_ok, passes_failed, last) = self.reconciler.stats.snapshot();

        SupervisorStatus {
            pipeline,
            running: self.is_running(),
            passes_ok,
            passes_failed,
            last_pass_at: last.at,
            last_report: last.report,
            last_error: last.error,
            pools: self.pools.statuses(),
        }
    }

    fn spawn_timer(&self) {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let reconciler = self.reconciler.clone();
        let poll_interval = self.config.poll_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Reconciliation loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reconciliation loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        // Failures are logged and counted; the next tick retries
                        let _ = reconciler.run_pass().await;
                    }
                }
            }
            info!("Reconciliation loop stopped");
        });

        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
