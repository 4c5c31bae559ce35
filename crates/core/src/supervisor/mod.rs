//! Deposit pipeline supervisor.
//!
//! Owns the worker pools and drives the action monitoring task on a timer.

mod config;
mod runner;
mod types;

pub use config::SupervisorConfig;
pub use runner::PipelineSupervisor;
pub use types::{SupervisorError, SupervisorStatus};
