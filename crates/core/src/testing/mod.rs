//! Testing utilities for unit and integration tests.
//!
//! Provides controllable jobs, fault-injecting wrappers around the status
//! store and work queue, and fixtures for seeding deposit records.
//!
//! # Example
//!
//! ```rust,ignore
//! use deposit_core::testing::{FaultyStatusStore, MockJob};
//!
//! let store = Arc::new(FaultyStatusStore::new(Arc::new(SqliteStatusStore::in_memory()?)));
//! let factory = JobFactory::new(store.clone())
//!     .with_job("mock", |descriptor, _| Box::new(MockJob::succeeding(descriptor)));
//!
//! store.fail_deposit("d-2");
//! ```

mod faults;
mod mock_job;

pub use faults::{FaultyStatusStore, FaultyWorkQueue};
pub use mock_job::{MockBehavior, MockJob};

use chrono::Utc;

use crate::status::{DepositAction, DepositMetadata, DepositState, DepositStatus, StatusStore};

/// Insert a deposit record in the given state, bypassing registration.
///
/// Panics on store errors; intended for test setup only.
pub fn insert_deposit(
    store: &dyn StatusStore,
    id: &str,
    state: DepositState,
    pending_action: Option<DepositAction>,
    current_job_id: Option<&str>,
) -> DepositStatus {
    let now = Utc::now();
    let status = DepositStatus {
        id: id.to_string(),
        state,
        pending_action,
        destination: "collections/test".to_string(),
        job_type: "mock".to_string(),
        current_job_id: current_job_id.map(String::from),
        metadata: DepositMetadata::new("tester", "simple"),
        error: None,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = store.insert_deposit(&status) {
        panic!("failed to seed deposit {}: {}", id, e);
    }
    status
}
