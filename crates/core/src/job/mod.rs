//! Jobs, the job factory and dispatch onto the work queue.

mod dispatch;
mod factory;
mod finalize;
mod types;

pub use dispatch::{DispatchError, JobDispatcher};
pub use factory::{JobConstructor, JobDeps, JobFactory};
pub use finalize::{FinalizeDepositJob, FINALIZE_JOB_TYPE};
pub use types::*;
