use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{JobDescriptor, QueueError, WorkQueue};

/// In-process work queue.
#[derive(Default)]
pub struct MemoryWorkQueue {
    segments: Mutex<HashMap<String, VecDeque<JobDescriptor>>>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All waiting descriptors of a job type, oldest first.
    pub fn snapshot(&self, job_type: &str) -> Result<Vec<JobDescriptor>, QueueError> {
        let segments = self.lock()?;
        Ok(segments
            .get(job_type)
            .map(|segment| segment.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, VecDeque<JobDescriptor>>>, QueueError>
    {
        self.segments
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".to_string()))
    }
}

impl WorkQueue for MemoryWorkQueue {
    fn push(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        self.lock()?
            .entry(descriptor.job_type.clone())
            .or_default()
            .push_back(descriptor.clone());
        Ok(())
    }

    fn pop(&self, job_type: &str) -> Result<Option<JobDescriptor>, QueueError> {
        Ok(self
            .lock()?
            .get_mut(job_type)
            .and_then(|segment| segment.pop_front()))
    }

    fn len(&self, job_type: &str) -> Result<usize, QueueError> {
        Ok(self.lock()?.get(job_type).map_or(0, |segment| segment.len()))
    }
}
