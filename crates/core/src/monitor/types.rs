use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{DepositAction, DepositState, PipelineAction, PipelineState, StatusError};

/// Errors that abort a whole pass. Per-deposit failures are counted in the
/// [`PassReport`] instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("pipeline status unavailable: {0}")]
    Pipeline(#[source] StatusError),

    #[error("failed to apply {action} side effects: {source}")]
    SideEffects {
        action: PipelineAction,
        source: StatusError,
    },

    #[error("failed to enumerate deposits: {0}")]
    Enumeration(#[source] StatusError),
}

/// Outcome of evaluating one deposit's pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositDecision {
    /// Dispatch the registration job; `unregistered -> queued`.
    Register,
    /// `queued | running | quieted -> paused`.
    Pause,
    /// Re-dispatch; `paused | quieted -> queued`.
    Resume,
    /// Keep both state and action for a later pass.
    Defer,
    /// Clear the action without effect.
    Discard,
}

/// Decide what a deposit's pending action does under the given pipeline state.
pub fn decide(
    state: DepositState,
    action: DepositAction,
    pipeline: PipelineState,
) -> DepositDecision {
    use DepositDecision::*;

    let gated = |decision| if pipeline.is_active() { decision } else { Defer };

    match (state, action) {
        (DepositState::Unregistered, DepositAction::Register) => gated(Register),
        (DepositState::Queued | DepositState::Running, DepositAction::Pause) => Pause,
        (DepositState::Paused, DepositAction::Resume) => Resume,
        (DepositState::Quieted, DepositAction::Resume) => gated(Resume),
        // A pause requested while quiesced waits until the pipeline is active
        // again, then wins over the automatic resume.
        (DepositState::Quieted, DepositAction::Pause) => gated(Pause),
        _ => Discard,
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Pipeline state after the pipeline action was resolved.
    pub pipeline_state: PipelineState,
    /// Pipeline action observed at the start of the pass.
    pub pipeline_action: Option<PipelineAction>,
    pub pipeline_action_applied: bool,
    pub deposits_examined: usize,
    /// Deposit state changes, including pipeline side effects.
    pub transitions: usize,
    pub deferred: usize,
    pub discarded: usize,
    pub dispatch_failures: usize,
    pub deposit_errors: usize,
}

impl PassReport {
    /// Whether the pass wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.pipeline_action.is_none() && self.transitions == 0 && self.discarded == 0
    }
}
