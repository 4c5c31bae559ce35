//! Work queue carrying job descriptors to worker pools.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryWorkQueue;
pub use sqlite::SqliteWorkQueue;
pub use types::*;
