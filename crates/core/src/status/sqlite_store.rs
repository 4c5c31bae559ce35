//! SQLite-backed status store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::info;

use super::{
    DepositAction, DepositField, DepositFilter, DepositMetadata, DepositState, DepositStatus,
    PipelineAction, PipelineState, PipelineStatus, StatusError, StatusStore,
};

const PIPELINE_KEY: &str = "pipeline";

const DEPOSIT_COLUMNS: &str = "id, state, pending_action, destination, job_type, current_job_id, metadata, error, created_at, updated_at";

/// SQLite-backed status store.
///
/// Holds the singleton pipeline record and one record per deposit. Opening the
/// store bootstraps the pipeline record in the `active` state.
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteStatusStore {
    /// Open (or create) a status store at the given database path.
    pub fn new(path: &Path) -> Result<Self, StatusError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory status store (useful for testing).
    pub fn in_memory() -> Result<Self, StatusError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StatusError> {
        Self::initialize_schema(&conn)?;
        Self::bootstrap_pipeline(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatusError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_status (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL,
                pending_action TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deposit_status (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                pending_action TEXT,
                destination TEXT NOT NULL,
                job_type TEXT NOT NULL,
                current_job_id TEXT,
                metadata TEXT NOT NULL,
                submitted_by TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deposit_status_state ON deposit_status(state);
            CREATE INDEX IF NOT EXISTS idx_deposit_status_priority ON deposit_status(priority DESC);
            CREATE INDEX IF NOT EXISTS idx_deposit_status_submitted_by ON deposit_status(submitted_by);
            "#,
        )
        .map_err(db_err)
    }

    /// Create the pipeline record if missing. A persisted `shutdown` belongs to
    /// a previous process lifetime and is reset to `active`.
    fn bootstrap_pipeline(conn: &Connection) -> Result<(), StatusError> {
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR IGNORE INTO pipeline_status (id, state, pending_action, updated_at) VALUES (1, ?, NULL, ?)",
            params![PipelineState::Active.as_str(), now],
        )
        .map_err(db_err)?;

        let reset = conn
            .execute(
                "UPDATE pipeline_status SET state = ?, updated_at = ? WHERE id = 1 AND state = ?",
                params![
                    PipelineState::Active.as_str(),
                    now,
                    PipelineState::Shutdown.as_str()
                ],
            )
            .map_err(db_err)?;

        if reset > 0 {
            info!("Pipeline was shut down by a previous process; state reset to active");
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StatusError> {
        self.conn
            .lock()
            .map_err(|_| StatusError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &DepositFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(ref submitted_by) = filter.submitted_by {
            conditions.push("submitted_by = ?");
            params.push(Box::new(submitted_by.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_deposit(row: &rusqlite::Row) -> rusqlite::Result<DepositStatus> {
        let id: String = row.get(0)?;
        let state: String = row.get(1)?;
        let pending_action: Option<String> = row.get(2)?;
        let destination: String = row.get(3)?;
        let job_type: String = row.get(4)?;
        let current_job_id: Option<String> = row.get(5)?;
        let metadata_json: String = row.get(6)?;
        let error: Option<String> = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        let metadata: DepositMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        Ok(DepositStatus {
            id,
            state: parse_column(1, &state)?,
            pending_action: pending_action
                .as_deref()
                .map(|action| parse_column(2, action))
                .transpose()?,
            destination,
            job_type,
            current_job_id,
            metadata,
            error,
            created_at: parse_timestamp(8, &created_at)?,
            updated_at: parse_timestamp(9, &updated_at)?,
        })
    }

    fn field_value(field: &DepositField) -> Box<dyn ToSql> {
        match field {
            DepositField::State(state) => Box::new(state.as_str()),
            DepositField::PendingAction(action) => Box::new(action.map(|a| a.as_str())),
            DepositField::CurrentJobId(job_id) => Box::new(job_id.clone()),
            DepositField::Error(error) => Box::new(error.clone()),
        }
    }

    /// Run `UPDATE deposit_status SET <fields> WHERE id = ? [AND state = ?]`.
    fn update_fields(
        &self,
        id: &str,
        expected: Option<DepositState>,
        fields: &[DepositField],
    ) -> Result<usize, StatusError> {
        let conn = self.conn()?;

        let mut assignments: Vec<String> = fields
            .iter()
            .map(|field| format!("{} = ?", field.column()))
            .collect();
        assignments.push("updated_at = ?".to_string());

        let mut values: Vec<Box<dyn ToSql>> = fields.iter().map(Self::field_value).collect();
        values.push(Box::new(Utc::now().to_rfc3339()));
        values.push(Box::new(id.to_string()));

        let mut sql = format!(
            "UPDATE deposit_status SET {} WHERE id = ?",
            assignments.join(", ")
        );
        if let Some(expected) = expected {
            sql.push_str(" AND state = ?");
            values.push(Box::new(expected.as_str()));
        }

        let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, param_refs.as_slice()).map_err(db_err)
    }
}

impl StatusStore for SqliteStatusStore {
    fn pipeline_status(&self) -> Result<PipelineStatus, StatusError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT state, pending_action, updated_at FROM pipeline_status WHERE id = 1",
            [],
            |row| {
                let state: String = row.get(0)?;
                let pending_action: Option<String> = row.get(1)?;
                let updated_at: String = row.get(2)?;

                Ok(PipelineStatus {
                    state: parse_column(0, &state)?,
                    pending_action: pending_action
                        .as_deref()
                        .map(|action| parse_column(1, action))
                        .transpose()?,
                    updated_at: parse_timestamp(2, &updated_at)?,
                })
            },
        )
        .map_err(|e| classify(PIPELINE_KEY, e))
    }

    fn set_pipeline_state(&self, state: PipelineState) -> Result<(), StatusError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE pipeline_status SET state = ?, updated_at = ? WHERE id = 1",
            params![state.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn request_pipeline_action(&self, action: PipelineAction) -> Result<(), StatusError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE pipeline_status SET pending_action = ?, updated_at = ? WHERE id = 1",
            params![action.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn clear_pipeline_action(&self, observed: PipelineAction) -> Result<bool, StatusError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE pipeline_status SET pending_action = NULL, updated_at = ? WHERE id = 1 AND pending_action = ?",
                params![Utc::now().to_rfc3339(), observed.as_str()],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn get_deposit(&self, id: &str) -> Result<Option<DepositStatus>, StatusError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM deposit_status WHERE id = ?", DEPOSIT_COLUMNS),
            params![id],
            Self::row_to_deposit,
        )
        .optional()
        .map_err(|e| classify(id, e))
    }

    fn insert_deposit(&self, status: &DepositStatus) -> Result<(), StatusError> {
        let conn = self.conn()?;

        let metadata_json = serde_json::to_string(&status.metadata)
            .map_err(|e| StatusError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO deposit_status (id, state, pending_action, destination, job_type, current_job_id, metadata, submitted_by, priority, error, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                status.id,
                status.state.as_str(),
                status.pending_action.map(|a| a.as_str()),
                status.destination,
                status.job_type,
                status.current_job_id,
                metadata_json,
                status.metadata.submitted_by,
                status.metadata.priority,
                status.error,
                status.created_at.to_rfc3339(),
                status.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StatusError::AlreadyExists(status.id.clone())
            }
            other => db_err(other),
        })?;

        Ok(())
    }

    fn put_deposit(&self, status: &DepositStatus) -> Result<(), StatusError> {
        let conn = self.conn()?;

        let metadata_json = serde_json::to_string(&status.metadata)
            .map_err(|e| StatusError::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE deposit_status SET state = ?, pending_action = ?, destination = ?, job_type = ?, current_job_id = ?, metadata = ?, submitted_by = ?, priority = ?, error = ?, updated_at = ? WHERE id = ?",
                params![
                    status.state.as_str(),
                    status.pending_action.map(|a| a.as_str()),
                    status.destination,
                    status.job_type,
                    status.current_job_id,
                    metadata_json,
                    status.metadata.submitted_by,
                    status.metadata.priority,
                    status.error,
                    Utc::now().to_rfc3339(),
                    status.id,
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(StatusError::NotFound(status.id.clone()));
        }
        Ok(())
    }

    fn set_deposit_fields(&self, id: &str, fields: &[DepositField]) -> Result<(), StatusError> {
        if self.update_fields(id, None, fields)? == 0 {
            return Err(StatusError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn update_deposit_if(
        &self,
        id: &str,
        expected: DepositState,
        fields: &[DepositField],
    ) -> Result<bool, StatusError> {
        Ok(self.update_fields(id, Some(expected), fields)? > 0)
    }

    fn offer_deposit_action(&self, id: &str, action: DepositAction) -> Result<bool, StatusError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE deposit_status SET pending_action = ?, updated_at = ? WHERE id = ? AND pending_action IS NULL",
                params![action.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn clear_deposit_action(
        &self,
        id: &str,
        observed: DepositAction,
    ) -> Result<bool, StatusError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE deposit_status SET pending_action = NULL, updated_at = ? WHERE id = ? AND pending_action = ?",
                params![Utc::now().to_rfc3339(), id, observed.as_str()],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn claim_deposit(&self, id: &str, job_id: &str) -> Result<bool, StatusError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE deposit_status SET state = ?, updated_at = ? WHERE id = ? AND state = ? AND current_job_id = ?",
                params![
                    DepositState::Running.as_str(),
                    Utc::now().to_rfc3339(),
                    id,
                    DepositState::Queued.as_str(),
                    job_id
                ],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn complete_deposit(
        &self,
        id: &str,
        job_id: &str,
        outcome: DepositState,
        error: Option<String>,
    ) -> Result<bool, StatusError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE deposit_status SET state = ?, error = ?, updated_at = ? WHERE id = ? AND current_job_id = ? AND state NOT IN (?, ?)",
                params![
                    outcome.as_str(),
                    error,
                    Utc::now().to_rfc3339(),
                    id,
                    job_id,
                    DepositState::Finished.as_str(),
                    DepositState::Failed.as_str()
                ],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn active_deposit_ids(&self) -> Result<Vec<String>, StatusError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id FROM deposit_status WHERE state NOT IN (?, ?) ORDER BY priority DESC, created_at ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![
                    DepositState::Finished.as_str(),
                    DepositState::Failed.as_str()
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn list_deposits(&self, filter: &DepositFilter) -> Result<Vec<DepositStatus>, StatusError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM deposit_status {} ORDER BY priority DESC, created_at ASC LIMIT ? OFFSET ?",
            DEPOSIT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        // A negative LIMIT means no limit in SQLite
        let mut all_params: Vec<Box<dyn ToSql>> = params;
        all_params.push(Box::new(filter.limit.unwrap_or(-1)));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_deposit)
            .map_err(db_err)?;

        let mut deposits = Vec::new();
        for row_result in rows {
            deposits.push(row_result.map_err(|e| classify("deposit_status", e))?);
        }

        Ok(deposits)
    }

    fn count_deposits(&self, filter: &DepositFilter) -> Result<i64, StatusError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM deposit_status {}", where_clause);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> StatusError {
    StatusError::Database(e.to_string())
}

/// Decoding failures become `Corrupt`, everything else is a database error.
fn classify(key: &str, e: rusqlite::Error) -> StatusError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(_, _, source) => StatusError::Corrupt {
            key: key.to_string(),
            reason: source.to_string(),
        },
        other => db_err(other),
    }
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStatusStore {
        SqliteStatusStore::in_memory().unwrap()
    }

    fn create_test_deposit(id: &str) -> DepositStatus {
        let now = Utc::now();
        DepositStatus {
            id: id.to_string(),
            state: DepositState::Unregistered,
            pending_action: Some(DepositAction::Register),
            destination: "collections/theses".to_string(),
            job_type: "finalize".to_string(),
            current_job_id: None,
            metadata: DepositMetadata::new("alice", "bagit").with_priority(10),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_pipeline_bootstraps_active() {
        let store = create_test_store();
        let status = store.pipeline_status().unwrap();
        assert_eq!(status.state, PipelineState::Active);
        assert_eq!(status.pending_action, None);
    }

    #[test]
    fn test_pipeline_action_request_and_clear() {
        let store = create_test_store();

        store.request_pipeline_action(PipelineAction::Quiet).unwrap();
        assert_eq!(
            store.pipeline_status().unwrap().pending_action,
            Some(PipelineAction::Quiet)
        );

        // A different observed value must not clear a newer request
        assert!(!store.clear_pipeline_action(PipelineAction::Stop).unwrap());
        assert!(store.clear_pipeline_action(PipelineAction::Quiet).unwrap());
        assert_eq!(store.pipeline_status().unwrap().pending_action, None);
    }

    #[test]
    fn test_set_pipeline_state() {
        let store = create_test_store();
        store.set_pipeline_state(PipelineState::Stopped).unwrap();
        assert_eq!(store.pipeline_status().unwrap().state, PipelineState::Stopped);
    }

    #[test]
    fn test_reopen_resets_shutdown_but_keeps_stopped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("status.db");

        {
            let store = SqliteStatusStore::new(&db_path).unwrap();
            store.set_pipeline_state(PipelineState::Shutdown).unwrap();
        }
        let store = SqliteStatusStore::new(&db_path).unwrap();
        assert_eq!(store.pipeline_status().unwrap().state, PipelineState::Active);

        store.set_pipeline_state(PipelineState::Stopped).unwrap();
        drop(store);
        let store = SqliteStatusStore::new(&db_path).unwrap();
        assert_eq!(store.pipeline_status().unwrap().state, PipelineState::Stopped);
    }

    #[test]
    fn test_insert_and_get_deposit() {
        let store = create_test_store();
        let deposit = create_test_deposit("d-1");
        store.insert_deposit(&deposit).unwrap();

        let fetched = store.get_deposit("d-1").unwrap().unwrap();
        assert_eq!(fetched.id, "d-1");
        assert_eq!(fetched.state, DepositState::Unregistered);
        assert_eq!(fetched.pending_action, Some(DepositAction::Register));
        assert_eq!(fetched.metadata, deposit.metadata);
        assert_eq!(fetched.job_type, "finalize");
    }

    #[test]
    fn test_get_nonexistent_deposit() {
        let store = create_test_store();
        assert!(store.get_deposit("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();
        let result = store.insert_deposit(&create_test_deposit("d-1"));
        assert!(matches!(result, Err(StatusError::AlreadyExists(_))));
    }

    #[test]
    fn test_put_deposit_overwrites_record() {
        let store = create_test_store();
        let mut deposit = create_test_deposit("d-1");
        store.insert_deposit(&deposit).unwrap();

        deposit.state = DepositState::Paused;
        deposit.pending_action = None;
        deposit.destination = "collections/other".to_string();
        store.put_deposit(&deposit).unwrap();

        let fetched = store.get_deposit("d-1").unwrap().unwrap();
        assert_eq!(fetched.state, DepositState::Paused);
        assert_eq!(fetched.pending_action, None);
        assert_eq!(fetched.destination, "collections/other");
    }

    #[test]
    fn test_put_missing_deposit_fails() {
        let store = create_test_store();
        let result = store.put_deposit(&create_test_deposit("ghost"));
        assert!(matches!(result, Err(StatusError::NotFound(_))));
    }

    #[test]
    fn test_set_deposit_fields() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();

        store
            .set_deposit_fields(
                "d-1",
                &[
                    DepositField::State(DepositState::Queued),
                    DepositField::CurrentJobId(Some("job-1".to_string())),
                ],
            )
            .unwrap();

        let fetched = store.get_deposit("d-1").unwrap().unwrap();
        assert_eq!(fetched.state, DepositState::Queued);
        assert_eq!(fetched.current_job_id.as_deref(), Some("job-1"));
        // Untouched field survives
        assert_eq!(fetched.pending_action, Some(DepositAction::Register));
    }

    #[test]
    fn test_set_field_on_missing_deposit() {
        let store = create_test_store();
        let result = store.set_deposit_field("ghost", DepositField::Error(None));
        assert!(matches!(result, Err(StatusError::NotFound(_))));
    }

    #[test]
    fn test_update_deposit_if_checks_state() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();

        let applied = store
            .update_deposit_if(
                "d-1",
                DepositState::Running,
                &[DepositField::State(DepositState::Paused)],
            )
            .unwrap();
        assert!(!applied);

        let applied = store
            .update_deposit_if(
                "d-1",
                DepositState::Unregistered,
                &[DepositField::State(DepositState::Queued)],
            )
            .unwrap();
        assert!(applied);
        assert_eq!(
            store.get_deposit("d-1").unwrap().unwrap().state,
            DepositState::Queued
        );
    }

    #[test]
    fn test_deposit_action_overwrite_offer_and_clear() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();

        // Second request overwrites the first
        store.request_deposit_action("d-1", DepositAction::Pause).unwrap();
        assert_eq!(
            store.get_deposit("d-1").unwrap().unwrap().pending_action,
            Some(DepositAction::Pause)
        );

        // Offer does not replace an outstanding action
        assert!(!store.offer_deposit_action("d-1", DepositAction::Resume).unwrap());

        assert!(!store.clear_deposit_action("d-1", DepositAction::Resume).unwrap());
        assert!(store.clear_deposit_action("d-1", DepositAction::Pause).unwrap());
        assert!(store.offer_deposit_action("d-1", DepositAction::Resume).unwrap());
        assert_eq!(
            store.get_deposit("d-1").unwrap().unwrap().pending_action,
            Some(DepositAction::Resume)
        );
    }

    #[test]
    fn test_claim_requires_queued_and_matching_job() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();
        store
            .set_deposit_fields(
                "d-1",
                &[
                    DepositField::State(DepositState::Queued),
                    DepositField::CurrentJobId(Some("job-2".to_string())),
                ],
            )
            .unwrap();

        assert!(!store.claim_deposit("d-1", "job-1").unwrap());
        assert!(store.claim_deposit("d-1", "job-2").unwrap());
        // Already running
        assert!(!store.claim_deposit("d-1", "job-2").unwrap());
        assert_eq!(
            store.get_deposit("d-1").unwrap().unwrap().state,
            DepositState::Running
        );
    }

    #[test]
    fn test_complete_deposit_only_for_current_job() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();
        store
            .set_deposit_fields(
                "d-1",
                &[
                    DepositField::State(DepositState::Running),
                    DepositField::CurrentJobId(Some("job-2".to_string())),
                ],
            )
            .unwrap();

        assert!(!store
            .complete_deposit("d-1", "job-1", DepositState::Finished, None)
            .unwrap());
        assert!(store
            .complete_deposit("d-1", "job-2", DepositState::Failed, Some("boom".into()))
            .unwrap());

        let fetched = store.get_deposit("d-1").unwrap().unwrap();
        assert_eq!(fetched.state, DepositState::Failed);
        assert_eq!(fetched.error.as_deref(), Some("boom"));

        // Terminal records are not rewritten
        assert!(!store
            .complete_deposit("d-1", "job-2", DepositState::Finished, None)
            .unwrap());
    }

    #[test]
    fn test_active_deposit_ids_excludes_terminal_and_orders_by_priority() {
        let store = create_test_store();

        let mut low = create_test_deposit("low");
        low.metadata.priority = 1;
        store.insert_deposit(&low).unwrap();

        let mut high = create_test_deposit("high");
        high.metadata.priority = 50;
        store.insert_deposit(&high).unwrap();

        let mut done = create_test_deposit("done");
        done.state = DepositState::Finished;
        store.insert_deposit(&done).unwrap();

        let ids = store.active_deposit_ids().unwrap();
        assert_eq!(ids, vec!["high".to_string(), "low".to_string()]);
    }

    #[test]
    fn test_list_and_count_with_filters() {
        let store = create_test_store();

        for i in 0..3 {
            store
                .insert_deposit(&create_test_deposit(&format!("d-{}", i)))
                .unwrap();
        }
        let mut bob = create_test_deposit("bob-1");
        bob.metadata.submitted_by = "bob".to_string();
        bob.state = DepositState::Paused;
        store.insert_deposit(&bob).unwrap();

        let all = store.list_deposits(&DepositFilter::new()).unwrap();
        assert_eq!(all.len(), 4);

        let paused = store
            .list_deposits(&DepositFilter::new().with_state(DepositState::Paused))
            .unwrap();
        assert_eq!(paused.len(), 1);
        assert_eq!(paused[0].id, "bob-1");

        let count = store
            .count_deposits(&DepositFilter::new().with_submitted_by("alice"))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_list_pagination_and_unbounded() {
        let store = create_test_store();
        for i in 0..5 {
            store
                .insert_deposit(&create_test_deposit(&format!("d-{}", i)))
                .unwrap();
        }

        let page = store
            .list_deposits(&DepositFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);

        let everything = store
            .list_deposits(&DepositFilter::new().with_limit(1).unbounded())
            .unwrap();
        assert_eq!(everything.len(), 5);
    }

    #[test]
    fn test_corrupt_state_reported() {
        let store = create_test_store();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE deposit_status SET state = 'exploded' WHERE id = 'd-1'",
                [],
            )
            .unwrap();

        let result = store.get_deposit("d-1");
        assert!(matches!(result, Err(StatusError::Corrupt { .. })));
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("status.db");

        let store = SqliteStatusStore::new(&db_path).unwrap();
        store.insert_deposit(&create_test_deposit("d-1")).unwrap();
        assert!(db_path.exists());

        drop(store);
        let reopened = SqliteStatusStore::new(&db_path).unwrap();
        assert!(reopened.get_deposit("d-1").unwrap().is_some());
    }
}
