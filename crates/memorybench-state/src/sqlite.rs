//! `SQLite`-backed implementation of [`CheckpointBackend`].
//!
//! Stores each run checkpoint as one JSON document row. Uses a single
//! `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use memorybench_types::checkpoint::RunCheckpoint;
use memorybench_types::state::RunId;
use rusqlite::Connection;

use crate::backend::CheckpointBackend;
use crate::error::{self, StateError};

/// Idempotent DDL for checkpoint tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS run_checkpoints (
    run_id TEXT PRIMARY KEY NOT NULL,
    provider TEXT NOT NULL,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// `SQLite`-backed checkpoint storage.
///
/// Create with [`SqliteCheckpointBackend::open`] for file-backed persistence
/// or [`SqliteCheckpointBackend::in_memory`] for tests.
pub struct SqliteCheckpointBackend {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointBackend {
    /// Open or create a `SQLite` checkpoint database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StateError::backend_context("open: connect", e))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("open: create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StateError::backend_context("in_memory: connect", e))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend_context("in_memory: create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    #[cfg(test)]
    fn row_count(&self) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM run_checkpoints", [], |row| row.get(0))
            .map_err(StateError::from)
    }
}

impl CheckpointBackend for SqliteCheckpointBackend {
    fn load(&self, run_id: &RunId) -> error::Result<Option<RunCheckpoint>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT document FROM run_checkpoints WHERE run_id = ?1",
            [run_id.as_str()],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(document) => Ok(Some(serde_json::from_str(&document)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::backend_context("load_checkpoint", e)),
        }
    }

    fn save(&self, checkpoint: &RunCheckpoint) -> error::Result<()> {
        let document = serde_json::to_string(checkpoint)?;
        let updated_at = Utc::now().to_rfc3339();
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO run_checkpoints (run_id, provider, document, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(run_id) \
             DO UPDATE SET provider = ?2, document = ?3, updated_at = ?4",
            rusqlite::params![
                checkpoint.run_id.as_str(),
                checkpoint.provider,
                document,
                updated_at,
            ],
        )
        .map_err(|e| StateError::backend_context("save_checkpoint: upsert", e))?;
        Ok(())
    }

    fn list_runs(&self) -> error::Result<Vec<RunId>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT run_id FROM run_checkpoints ORDER BY run_id")
            .map_err(|e| StateError::backend_context("list_runs: prepare", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StateError::backend_context("list_runs: query", e))?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(RunId::new(
                row.map_err(|e| StateError::backend_context("list_runs: row", e))?,
            ));
        }
        Ok(runs)
    }
}
