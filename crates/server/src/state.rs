use std::sync::Arc;
use deposit_core::{AuditStore, Config, PipelineSupervisor};

/// Shared application state
pub struct AppState {
    config: Config,
    supervisor: Arc<PipelineSupervisor>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        supervisor: Arc<PipelineSupervisor>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            supervisor,
            audit_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &PipelineSupervisor {
        &self.supervisor
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
