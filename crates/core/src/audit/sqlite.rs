use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ToSql};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

/// SQLite-backed audit store. Can share the database file with the status
/// store; it only owns the `audit_events` table.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open the audit store, creating the database file and table if needed
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                deposit_id TEXT,
                user_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_deposit_id ON audit_events(deposit_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
            "#,
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref deposit_id) = filter.deposit_id {
            conditions.push("deposit_id = ?".to_string());
            params.push(Box::new(deposit_id.clone()));
        }

        if !filter.event_types.is_empty() {
            let placeholders = vec!["?"; filter.event_types.len()].join(", ");
            conditions.push(format!("event_type IN ({})", placeholders));
            for event_type in &filter.event_types {
                params.push(Box::new(event_type.clone()));
            }
        }

        if let Some(ref user_id) = filter.user_id {
            conditions.push("user_id = ?".to_string());
            params.push(Box::new(user_id.clone()));
        }

        if let Some(since) = filter.since {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(since.to_rfc3339()));
        }

        if let Some(until) = filter.until {
            conditions.push("timestamp <= ?".to_string());
            params.push(Box::new(until.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let conn = self.conn()?;

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, deposit_id, user_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.deposit_id,
                record.user_id,
                data_json,
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        // id breaks ties between events written within the same instant
        let sql = format!(
            "SELECT id, timestamp, event_type, deposit_id, user_id, data FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn ToSql>> = params;
        // A negative LIMIT means no limit in SQLite
        all_params.push(Box::new(filter.limit.unwrap_or(-1)));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, event_type, deposit_id, user_id, data_json) =
                row_result.map_err(db_err)?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| AuditError::Corrupt {
                    id,
                    reason: format!("invalid timestamp: {}", e),
                })?
                .into();

            let data: AuditEvent =
                serde_json::from_str(&data_json).map_err(|e| AuditError::Corrupt {
                    id,
                    reason: e.to_string(),
                })?;

            records.push(AuditRecord {
                id,
                timestamp,
                event_type,
                deposit_id,
                user_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> AuditError {
    AuditError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DepositState;
    use chrono::Duration;

    fn create_test_store() -> SqliteAuditStore {
        SqliteAuditStore::in_memory().unwrap()
    }

    fn record_for(event: AuditEvent) -> AuditRecord {
        AuditRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type().to_string(),
            deposit_id: event.deposit_id().map(String::from),
            user_id: event.user_id().map(String::from),
            data: event,
        }
    }

    fn service_started() -> AuditRecord {
        record_for(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        })
    }

    fn registered(deposit_id: &str, user: &str) -> AuditRecord {
        record_for(AuditEvent::DepositRegistered {
            deposit_id: deposit_id.to_string(),
            submitted_by: user.to_string(),
            destination: "collections/theses".to_string(),
            job_type: "finalize".to_string(),
            packaging_type: "bagit".to_string(),
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = create_test_store();
        let id = store.insert(&service_started()).unwrap();
        assert!(id > 0);

        let results = store.query(&AuditFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "service_started");
    }

    #[test]
    fn test_query_by_deposit_and_event_type() {
        let store = create_test_store();
        store.insert(&service_started()).unwrap();
        store.insert(&registered("d-1", "alice")).unwrap();
        store.insert(&registered("d-2", "bob")).unwrap();
        store
            .insert(&record_for(AuditEvent::DepositStateChanged {
                deposit_id: "d-1".to_string(),
                from_state: DepositState::Unregistered,
                to_state: DepositState::Queued,
                action: None,
            }))
            .unwrap();

        let results = store
            .query(&AuditFilter::new().with_deposit_id("d-1"))
            .unwrap();
        assert_eq!(results.len(), 2);
        // Newest first
        assert_eq!(results[0].event_type, "deposit_state_changed");

        let count = store
            .count(&AuditFilter::new().with_event_type("deposit_registered"))
            .unwrap();
        assert_eq!(count, 2);

        let by_user = store.query(&AuditFilter::new().with_user_id("bob")).unwrap();
        assert_eq!(by_user.len(), 1);
    }

    #[test]
    fn test_query_with_time_range() {
        let store = create_test_store();
        let now = Utc::now();

        let mut old_record = service_started();
        old_record.timestamp = now - Duration::hours(2);
        store.insert(&old_record).unwrap();
        store.insert(&service_started()).unwrap();

        let filter = AuditFilter::new().since(now - Duration::hours(1));
        assert_eq!(store.query(&filter).unwrap().len(), 1);

        let filter = AuditFilter::new().until(now - Duration::hours(1));
        assert_eq!(store.count(&filter).unwrap(), 1);
    }

    #[test]
    fn test_query_any_of_event_types() {
        let store = create_test_store();
        store.insert(&service_started()).unwrap();
        store.insert(&registered("d-1", "alice")).unwrap();
        store
            .insert(&record_for(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            }))
            .unwrap();

        let filter = AuditFilter::new()
            .with_event_type("service_started")
            .with_event_type("service_stopped");
        assert_eq!(store.count(&filter).unwrap(), 2);
    }

    #[test]
    fn test_deposit_history_is_unbounded() {
        let store = create_test_store();
        for _ in 0..120 {
            store.insert(&registered("d-1", "alice")).unwrap();
        }
        store.insert(&registered("d-2", "alice")).unwrap();

        assert_eq!(store.query(&AuditFilter::new()).unwrap().len(), 100);
        assert_eq!(store.query(&AuditFilter::for_deposit("d-1")).unwrap().len(), 120);
    }

    #[test]
    fn test_undecodable_payload_reported_as_corrupt() {
        let store = create_test_store();
        let id = store.insert(&service_started()).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE audit_events SET data = '{}' WHERE id = ?", params![id])
            .unwrap();

        let result = store.query(&AuditFilter::new());
        assert!(matches!(result, Err(AuditError::Corrupt { id: bad, .. }) if bad == id));
    }

    #[test]
    fn test_pagination() {
        let store = create_test_store();
        for i in 0..5 {
            store.insert(&registered(&format!("d-{}", i), "alice")).unwrap();
        }

        let page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.count(&AuditFilter::new()).unwrap(), 5);
    }

    #[test]
    fn test_shares_database_with_status_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("deposits.db");

        let _status = crate::status::SqliteStatusStore::new(&db_path).unwrap();
        let store = SqliteAuditStore::new(&db_path).unwrap();
        store.insert(&service_started()).unwrap();

        assert_eq!(store.query(&AuditFilter::new()).unwrap().len(), 1);
    }
}
