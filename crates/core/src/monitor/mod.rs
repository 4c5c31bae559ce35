//! The action monitoring task: one reconciliation pass over the pipeline and
//! every deposit in the working set.

mod task;
mod types;

pub use task::ActionMonitoringTask;
pub use types::{decide, DepositDecision, MonitorError, PassReport};
