use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::job::JobDispatcher;
use crate::metrics;
use crate::pool::WorkerPools;
use crate::status::{
    DepositAction, DepositField, DepositFilter, DepositState, DepositStatus, PipelineAction,
    PipelineState, StatusError, StatusStore,
};

use super::{decide, DepositDecision, MonitorError, PassReport};

/// Reconciles pending actions into pipeline, deposit and pool state.
///
/// Each call to [`run`](Self::run) is one pass:
/// 1. resolve the pipeline's pending action (side effects, then state, then
///    compare-and-clear of the observed action);
/// 2. align the pools with the resulting pipeline state, releasing deposits
///    left `quieted` while the pipeline is active;
/// 3. enumerate every non-terminal deposit;
/// 4. resolve each deposit's pending action under the pipeline state from 1.
///
/// Passes are not re-entrant; the supervisor serializes them.
pub struct ActionMonitoringTask {
    store: Arc<dyn StatusStore>,
    pools: Arc<WorkerPools>,
    dispatcher: JobDispatcher,
    unavailable_delay: Duration,
    audit: Option<AuditHandle>,
}

impl ActionMonitoringTask {
    pub fn new(
        store: Arc<dyn StatusStore>,
        pools: Arc<WorkerPools>,
        dispatcher: JobDispatcher,
        unavailable_delay: Duration,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            pools,
            dispatcher,
            unavailable_delay,
            audit,
        }
    }

    /// Run one reconciliation pass.
    pub fn run(&self) -> Result<PassReport, MonitorError> {
        let mut report = PassReport::default();

        let touched = self.resolve_pipeline(&mut report)?;
        self.align_pools(report.pipeline_state);
        if report.pipeline_state.is_active() {
            self.release_quieted(&touched, &mut report)?;
        }

        let ids = self
            .store
            .active_deposit_ids()
            .map_err(MonitorError::Enumeration)?;

        for id in ids {
            // Already moved by this pass's pipeline side effects
            if touched.contains(&id) {
                continue;
            }
            report.deposits_examined += 1;

            if let Err(e) = self.resolve_deposit(&id, report.pipeline_state, &mut report) {
                warn!(deposit_id = %id, "Skipping deposit this pass: {}", e);
                report.deposit_errors += 1;
            }
        }

        report.deposits_examined += touched.len();
        Ok(report)
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Resolve the pipeline action. Returns the deposits moved by its side
    /// effects.
    fn resolve_pipeline(&self, report: &mut PassReport) -> Result<HashSet<String>, MonitorError> {
        let pipeline = self.store.pipeline_status().map_err(MonitorError::Pipeline)?;
        report.pipeline_state = pipeline.state;
        report.pipeline_action = pipeline.pending_action;

        let Some(action) = pipeline.pending_action else {
            return Ok(HashSet::new());
        };

        let target = match (pipeline.state, action) {
            (PipelineState::Active, PipelineAction::Quiet) => Some(PipelineState::Quieted),
            (PipelineState::Quieted, PipelineAction::Unquiet) => Some(PipelineState::Active),
            (PipelineState::Active | PipelineState::Quieted, PipelineAction::Stop) => {
                Some(PipelineState::Stopped)
            }
            _ => None,
        };

        let mut touched = HashSet::new();

        if let Some(target) = target {
            touched = self
                .apply_side_effects(action, report)
                .map_err(|source| MonitorError::SideEffects { action, source })?;

            self.store
                .set_pipeline_state(target)
                .map_err(MonitorError::Pipeline)?;

            info!(from = %pipeline.state, to = %target, %action, "Pipeline state changed");
            metrics::PIPELINE_TRANSITIONS
                .with_label_values(&[pipeline.state.as_str(), target.as_str()])
                .inc();
            self.emit(AuditEvent::PipelineStateChanged {
                from_state: pipeline.state,
                to_state: target,
                action,
            });

            report.pipeline_state = target;
            report.pipeline_action_applied = true;
        } else {
            debug!(state = %pipeline.state, %action, "Discarding pipeline action");
            metrics::STALE_ACTIONS
                .with_label_values(&["pipeline", action.as_str()])
                .inc();
            self.emit(AuditEvent::ActionDiscarded {
                deposit_id: None,
                action: action.to_string(),
                state: pipeline.state.to_string(),
            });
        }

        let cleared = self
            .store
            .clear_pipeline_action(action)
            .map_err(MonitorError::Pipeline)?;
        if !cleared {
            debug!(%action, "Pipeline action replaced during the pass; left for the next pass");
        }

        Ok(touched)
    }

    fn apply_side_effects(
        &self,
        action: PipelineAction,
        report: &mut PassReport,
    ) -> Result<HashSet<String>, StatusError> {
        let mut touched = HashSet::new();

        match action {
            PipelineAction::Quiet => {
                self.pools.pause_all();
                for deposit in self.deposits_in(DepositState::Running)? {
                    let moved = self.store.update_deposit_if(
                        &deposit.id,
                        DepositState::Running,
                        &[DepositField::State(DepositState::Quieted)],
                    )?;
                    if moved {
                        self.record_transition(&deposit.id, DepositState::Running, DepositState::Quieted, None);
                        report.transitions += 1;
                        touched.insert(deposit.id);
                    }
                }
            }
            PipelineAction::Unquiet => {
                for deposit in self.deposits_in(DepositState::Quieted)? {
                    // An outstanding action (typically a deferred pause) survives
                    if self
                        .store
                        .offer_deposit_action(&deposit.id, DepositAction::Resume)?
                    {
                        debug!(deposit_id = %deposit.id, "Resume requested for quieted deposit");
                    }
                    touched.insert(deposit.id);
                }
                self.pools.resume_all();
            }
            PipelineAction::Stop => {
                self.pools.shutdown_all(self.unavailable_delay);
            }
        }

        Ok(touched)
    }

    /// Bring pool state in line with the pipeline state. A pass that failed
    /// midway through a side-effect sweep can leave them apart.
    fn align_pools(&self, state: PipelineState) {
        match state {
            PipelineState::Active => self.pools.resume_all(),
            PipelineState::Quieted => self.pools.pause_all(),
            PipelineState::Stopped | PipelineState::Shutdown => {
                self.pools.shutdown_all(self.unavailable_delay)
            }
        }
    }

    /// Offer `resume` to deposits still `quieted` under an active pipeline.
    fn release_quieted(
        &self,
        touched: &HashSet<String>,
        report: &mut PassReport,
    ) -> Result<(), MonitorError> {
        let stranded = self
            .deposits_in(DepositState::Quieted)
            .map_err(MonitorError::Enumeration)?;

        for deposit in stranded {
            if touched.contains(&deposit.id) {
                continue;
            }
            match self
                .store
                .offer_deposit_action(&deposit.id, DepositAction::Resume)
            {
                Ok(true) => {
                    warn!(deposit_id = %deposit.id, "Deposit quieted under an active pipeline; resume requested");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(deposit_id = %deposit.id, "Cannot release quieted deposit: {}", e);
                    report.deposit_errors += 1;
                }
            }
        }
        Ok(())
    }

    fn deposits_in(&self, state: DepositState) -> Result<Vec<DepositStatus>, StatusError> {
        self.store
            .list_deposits(&DepositFilter::new().with_state(state).unbounded())
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    fn resolve_deposit(
        &self,
        id: &str,
        gate: PipelineState,
        report: &mut PassReport,
    ) -> Result<(), StatusError> {
        let Some(deposit) = self.store.get_deposit(id)? else {
            return Ok(());
        };
        if deposit.state.is_terminal() {
            return Ok(());
        }
        let Some(action) = deposit.pending_action else {
            return Ok(());
        };

        match decide(deposit.state, action, gate) {
            DepositDecision::Register | DepositDecision::Resume => {
                self.dispatch(&deposit, action, report)?;
            }
            DepositDecision::Pause => {
                self.transition(&deposit, action, DepositState::Paused, report)?;
            }
            DepositDecision::Defer => {
                debug!(
                    deposit_id = %id,
                    state = %deposit.state,
                    %action,
                    pipeline = %gate,
                    "Deferring deposit action"
                );
                metrics::DEFERRED_ACTIONS
                    .with_label_values(&[action.as_str()])
                    .inc();
                report.deferred += 1;
            }
            DepositDecision::Discard => {
                if self.store.clear_deposit_action(id, action)? {
                    debug!(deposit_id = %id, state = %deposit.state, %action, "Discarding deposit action");
                    metrics::STALE_ACTIONS
                        .with_label_values(&["deposit", action.as_str()])
                        .inc();
                    self.emit(AuditEvent::ActionDiscarded {
                        deposit_id: Some(id.to_string()),
                        action: action.to_string(),
                        state: deposit.state.to_string(),
                    });
                    report.discarded += 1;
                }
            }
        }

        Ok(())
    }

    /// Move the deposit to `to` if it is still in the state that was read,
    /// then consume the action.
    fn transition(
        &self,
        deposit: &DepositStatus,
        action: DepositAction,
        to: DepositState,
        report: &mut PassReport,
    ) -> Result<(), StatusError> {
        let moved = self.store.update_deposit_if(
            &deposit.id,
            deposit.state,
            &[DepositField::State(to)],
        )?;
        if !moved {
            debug!(deposit_id = %deposit.id, "Deposit changed during the pass; retrying next pass");
            return Ok(());
        }

        self.store.clear_deposit_action(&deposit.id, action)?;
        self.record_transition(&deposit.id, deposit.state, to, Some(action));
        report.transitions += 1;
        Ok(())
    }

    /// Queue a job for the deposit and move it to `queued`.
    ///
    /// The record is switched to the new job id before the descriptor is
    /// pushed, so a worker popping it immediately can claim it. A failed push
    /// restores the previous state and keeps the action for a retry.
    fn dispatch(
        &self,
        deposit: &DepositStatus,
        action: DepositAction,
        report: &mut PassReport,
    ) -> Result<(), StatusError> {
        // The previous job is still executing: it will write the outcome.
        if action == DepositAction::Resume && self.pools.is_executing(&deposit.id) {
            return self.transition(deposit, action, DepositState::Queued, report);
        }

        let descriptor = match self.dispatcher.prepare(&deposit.job_type, &deposit.id) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.dispatch_failed(deposit, &e.to_string(), report);
                return Ok(());
            }
        };

        let moved = self.store.update_deposit_if(
            &deposit.id,
            deposit.state,
            &[
                DepositField::CurrentJobId(Some(descriptor.job_id.clone())),
                DepositField::State(DepositState::Queued),
                DepositField::Error(None),
            ],
        )?;
        if !moved {
            debug!(deposit_id = %deposit.id, "Deposit changed during the pass; retrying next pass");
            return Ok(());
        }

        if let Err(e) = self.dispatcher.submit(&descriptor) {
            let restored = self.store.update_deposit_if(
                &deposit.id,
                DepositState::Queued,
                &[
                    DepositField::CurrentJobId(deposit.current_job_id.clone()),
                    DepositField::State(deposit.state),
                    DepositField::Error(deposit.error.clone()),
                ],
            );
            self.dispatch_failed(deposit, &e.to_string(), report);
            if let Err(rollback) = restored {
                error!(
                    deposit_id = %deposit.id,
                    job_id = %descriptor.job_id,
                    from = %deposit.state,
                    "Dispatch rollback failed; deposit left queued with no job behind it. \
                     Pause and resume it to re-dispatch: {}",
                    rollback
                );
                return Err(rollback);
            }
            return Ok(());
        }

        metrics::JOB_DISPATCHES
            .with_label_values(&[&deposit.job_type, "ok"])
            .inc();
        self.emit(AuditEvent::JobDispatched {
            deposit_id: deposit.id.clone(),
            job_id: descriptor.job_id,
            job_type: deposit.job_type.clone(),
        });

        self.store.clear_deposit_action(&deposit.id, action)?;
        self.record_transition(&deposit.id, deposit.state, DepositState::Queued, Some(action));
        report.transitions += 1;
        Ok(())
    }

    fn dispatch_failed(&self, deposit: &DepositStatus, reason: &str, report: &mut PassReport) {
        error!(
            deposit_id = %deposit.id,
            job_type = %deposit.job_type,
            "Job dispatch failed; will retry next pass: {}", reason
        );
        metrics::JOB_DISPATCHES
            .with_label_values(&[&deposit.job_type, "failed"])
            .inc();
        self.emit(AuditEvent::JobDispatchFailed {
            deposit_id: deposit.id.clone(),
            job_type: deposit.job_type.clone(),
            error: reason.to_string(),
        });
        report.dispatch_failures += 1;
    }

    fn record_transition(
        &self,
        id: &str,
        from: DepositState,
        to: DepositState,
        action: Option<DepositAction>,
    ) {
        info!(deposit_id = %id, %from, %to, "Deposit state changed");
        metrics::DEPOSIT_TRANSITIONS
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        self.emit(AuditEvent::DepositStateChanged {
            deposit_id: id.to_string(),
            from_state: from,
            to_state: to,
            action,
        });
    }
}
