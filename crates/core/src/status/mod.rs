//! Pipeline and deposit status records and their store.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteStatusStore;
pub use store::{DepositFilter, StatusError, StatusStore};
pub use types::*;
