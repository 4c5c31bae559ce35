//! HTTP surface of the deposit pipeline orchestrator.

pub mod api;
pub mod metrics;
pub mod state;
