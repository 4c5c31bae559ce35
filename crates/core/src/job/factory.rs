use std::collections::HashMap;
use std::sync::Arc;

use crate::queue::JobDescriptor;
use crate::status::StatusStore;

use super::{Job, JobError};

/// Collaborators handed to every job constructor.
#[derive(Clone)]
pub struct JobDeps {
    pub store: Arc<dyn StatusStore>,
}

/// Builds a job for one descriptor.
pub type JobConstructor = Arc<dyn Fn(&JobDescriptor, &JobDeps) -> Box<dyn Job> + Send + Sync>;

/// Registry of job types.
///
/// Adding a job type is a registration; materialization is a lookup plus a
/// constructor call, so it is deterministic for a given registry.
#[derive(Clone)]
pub struct JobFactory {
    deps: JobDeps,
    constructors: HashMap<String, JobConstructor>,
}

impl JobFactory {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self {
            deps: JobDeps { store },
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for a job type.
    pub fn register<F>(&mut self, job_type: impl Into<String>, constructor: F)
    where
        F: Fn(&JobDescriptor, &JobDeps) -> Box<dyn Job> + Send + Sync + 'static,
    {
        self.constructors
            .insert(job_type.into(), Arc::new(constructor));
    }

    pub fn with_job<F>(mut self, job_type: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&JobDescriptor, &JobDeps) -> Box<dyn Job> + Send + Sync + 'static,
    {
        self.register(job_type, constructor);
        self
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.constructors.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.deps.store
    }

    /// Construct a runnable job for `(job_type, job_id, deposit_id)`.
    pub fn materialize(
        &self,
        job_type: &str,
        job_id: &str,
        deposit_id: &str,
    ) -> Result<Box<dyn Job>, JobError> {
        let constructor = self
            .constructors
            .get(job_type)
            .ok_or_else(|| JobError::UnknownType(job_type.to_string()))?;

        let descriptor = JobDescriptor::new(job_type, job_id, deposit_id);
        Ok(constructor(&descriptor, &self.deps))
    }
}
