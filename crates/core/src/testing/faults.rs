//! Fault-injecting wrappers for the status store and work queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::queue::{JobDescriptor, QueueError, WorkQueue};
use crate::status::{
    DepositAction, DepositField, DepositFilter, DepositState, DepositStatus, PipelineAction,
    PipelineState, PipelineStatus, StatusError, StatusStore,
};

/// Status store wrapper that fails selected operations on demand.
pub struct FaultyStatusStore {
    inner: Arc<dyn StatusStore>,
    fail_pipeline: AtomicBool,
    fail_enumeration: AtomicBool,
    enumeration_delay: Mutex<Duration>,
    enumerations: AtomicUsize,
    failing_deposits: Mutex<HashSet<String>>,
}

impl FaultyStatusStore {
    pub fn new(inner: Arc<dyn StatusStore>) -> Self {
        Self {
            inner,
            fail_pipeline: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
            enumeration_delay: Mutex::new(Duration::ZERO),
            enumerations: AtomicUsize::new(0),
            failing_deposits: Mutex::new(HashSet::new()),
        }
    }

    /// Make every pipeline record operation fail.
    pub fn set_fail_pipeline(&self, fail: bool) {
        self.fail_pipeline.store(fail, Ordering::SeqCst);
    }

    /// Make working-set enumeration and listing fail.
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Block the calling thread this long in every working-set enumeration.
    pub fn set_enumeration_delay(&self, delay: Duration) {
        *self
            .enumeration_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of working-set enumerations started so far.
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Make every operation on one deposit fail.
    pub fn fail_deposit(&self, id: &str) {
        self.deposits().insert(id.to_string());
    }

    pub fn heal_deposit(&self, id: &str) {
        self.deposits().remove(id);
    }

    fn deposits(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing_deposits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_pipeline(&self) -> Result<(), StatusError> {
        if self.fail_pipeline.load(Ordering::SeqCst) {
            return Err(StatusError::Database("injected pipeline fault".to_string()));
        }
        Ok(())
    }

    fn check_enumeration(&self) -> Result<(), StatusError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(StatusError::Database("injected enumeration fault".to_string()));
        }
        Ok(())
    }

    fn check_deposit(&self, id: &str) -> Result<(), StatusError> {
        if self.deposits().contains(id) {
            return Err(StatusError::Database(format!("injected fault for {}", id)));
        }
        Ok(())
    }
}

impl StatusStore for FaultyStatusStore {
    fn pipeline_status(&self) -> Result<PipelineStatus, StatusError> {
        self.check_pipeline()?;
        self.inner.pipeline_status()
    }

    fn set_pipeline_state(&self, state: PipelineState) -> Result<(), StatusError> {
        self.check_pipeline()?;
        self.inner.set_pipeline_state(state)
    }

    fn request_pipeline_action(&self, action: PipelineAction) -> Result<(), StatusError> {
        self.check_pipeline()?;
        self.inner.request_pipeline_action(action)
    }

    fn clear_pipeline_action(&self, observed: PipelineAction) -> Result<bool, StatusError> {
        self.check_pipeline()?;
        self.inner.clear_pipeline_action(observed)
    }

    fn get_deposit(&self, id: &str) -> Result<Option<DepositStatus>, StatusError> {
        self.check_deposit(id)?;
        self.inner.get_deposit(id)
    }

    fn insert_deposit(&self, status: &DepositStatus) -> Result<(), StatusError> {
        self.check_deposit(&status.id)?;
        self.inner.insert_deposit(status)
    }

    fn put_deposit(&self, status: &DepositStatus) -> Result<(), StatusError> {
        self.check_deposit(&status.id)?;
        self.inner.put_deposit(status)
    }

    fn set_deposit_fields(&self, id: &str, fields: &[DepositField]) -> Result<(), StatusError> {
        self.check_deposit(id)?;
        self.inner.set_deposit_fields(id, fields)
    }

    fn update_deposit_if(
        &self,
        id: &str,
        expected: DepositState,
        fields: &[DepositField],
    ) -> Result<bool, StatusError> {
        self.check_deposit(id)?;
        self.inner.update_deposit_if(id, expected, fields)
    }

    fn offer_deposit_action(&self, id: &str, action: DepositAction) -> Result<bool, StatusError> {
        self.check_deposit(id)?;
        self.inner.offer_deposit_action(id, action)
    }

    fn clear_deposit_action(
        &self,
        id: &str,
        observed: DepositAction,
    ) -> Result<bool, StatusError> {
        self.check_deposit(id)?;
        self.inner.clear_deposit_action(id, observed)
    }

    fn claim_deposit(&self, id: &str, job_id: &str) -> Result<bool, StatusError> {
        self.check_deposit(id)?;
        self.inner.claim_deposit(id, job_id)
    }

    fn complete_deposit(
        &self,
        id: &str,
        job_id: &str,
        outcome: DepositState,
        error: Option<String>,
    ) -> Result<bool, StatusError> {
        self.check_deposit(id)?;
        self.inner.complete_deposit(id, job_id, outcome, error)
    }

    fn active_deposit_ids(&self) -> Result<Vec<String>, StatusError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .enumeration_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.check_enumeration()?;
        self.inner.active_deposit_ids()
    }

    fn list_deposits(&self, filter: &DepositFilter) -> Result<Vec<DepositStatus>, StatusError> {
        self.check_enumeration()?;
        self.inner.list_deposits(filter)
    }

    fn count_deposits(&self, filter: &DepositFilter) -> Result<i64, StatusError> {
        self.check_enumeration()?;
        self.inner.count_deposits(filter)
    }
}

/// Work queue wrapper whose pushes can be made to fail.
pub struct FaultyWorkQueue {
    inner: Arc<dyn WorkQueue>,
    fail_push: AtomicBool,
    failed_pushes: AtomicUsize,
}

impl FaultyWorkQueue {
    pub fn new(inner: Arc<dyn WorkQueue>) -> Self {
        Self {
            inner,
            fail_push: AtomicBool::new(false),
            failed_pushes: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Number of pushes rejected so far.
    pub fn failed_pushes(&self) -> usize {
        self.failed_pushes.load(Ordering::SeqCst)
    }
}

impl WorkQueue for FaultyWorkQueue {
    fn push(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        if self.fail_push.load(Ordering::SeqCst) {
            self.failed_pushes.fetch_add(1, Ordering::SeqCst);
            return Err(QueueError::Unavailable("injected push fault".to_string()));
        }
        self.inner.push(descriptor)
    }

    fn pop(&self, job_type: &str) -> Result<Option<JobDescriptor>, QueueError> {
        self.inner.pop(job_type)
    }

    fn len(&self, job_type: &str) -> Result<usize, QueueError> {
        self.inner.len(job_type)
    }
}
