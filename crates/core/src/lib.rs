pub mod audit;
pub mod config;
pub mod deposit;
pub mod job;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod queue;
pub mod status;
pub mod supervisor;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    DepositsConfig, ServerConfig,
};
pub use deposit::{DepositHandler, OperatorControl, RegistrationError};
pub use job::{
    DispatchError, FinalizeDepositJob, Job, JobContext, JobDeps, JobDispatcher, JobError,
    JobFactory, FINALIZE_JOB_TYPE,
};
pub use monitor::{ActionMonitoringTask, MonitorError, PassReport};
pub use pool::{PoolConfig, PoolStatus, WorkerPool, WorkerPools};
pub use queue::{JobDescriptor, MemoryWorkQueue, QueueError, SqliteWorkQueue, WorkQueue};
pub use status::{
    DepositAction, DepositFilter, DepositMetadata, DepositState, DepositStatus, PipelineAction,
    PipelineState, PipelineStatus, SqliteStatusStore, StatusError, StatusStore,
};
pub use supervisor::{PipelineSupervisor, SupervisorConfig, SupervisorError, SupervisorStatus};
