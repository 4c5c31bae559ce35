//! Worker pools executing queued jobs, one pool per job type.

mod config;
mod pools;
mod types;
mod worker_pool;

pub use config::PoolConfig;
pub use pools::WorkerPools;
pub use types::PoolStatus;
pub use worker_pool::WorkerPool;
