use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{JobDescriptor, QueueError, WorkQueue};

/// SQLite-backed work queue. Survives process restarts, so descriptors
/// dispatched before a shutdown are picked up by the next process.
pub struct SqliteWorkQueue {
    conn: Mutex<Connection>,
}

impl SqliteWorkQueue {
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_type TEXT NOT NULL,
                job_id TEXT NOT NULL,
                deposit_id TEXT NOT NULL,
                enqueued_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_queue_type_seq ON job_queue(job_type, seq);
            "#,
        )
        .map_err(storage_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".to_string()))
    }
}

impl WorkQueue for SqliteWorkQueue {
    fn push(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_queue (job_type, job_id, deposit_id, enqueued_at) VALUES (?, ?, ?, ?)",
            params![
                descriptor.job_type,
                descriptor.job_id,
                descriptor.deposit_id,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn pop(&self, job_type: &str) -> Result<Option<JobDescriptor>, QueueError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_err)?;

        let head = tx
            .query_row(
                "SELECT seq, job_id, deposit_id FROM job_queue WHERE job_type = ? ORDER BY seq ASC LIMIT 1",
                params![job_type],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_err)?;

        let Some((seq, job_id, deposit_id)) = head else {
            return Ok(None);
        };

        tx.execute("DELETE FROM job_queue WHERE seq = ?", params![seq])
            .map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;

        Ok(Some(JobDescriptor {
            job_type: job_type.to_string(),
            job_id,
            deposit_id,
        }))
    }

    fn len(&self, job_type: &str) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM job_queue WHERE job_type = ?",
                params![job_type],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}

fn storage_err(e: rusqlite::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}
