//! Rollcall storage layer.
//!
//! SQLite-backed persistence for identities, face samples (with cached
//! descriptors), model versions, and attendance records, plus the durable
//! JSON snapshot format for trained models.
//!
//! The schema is created idempotently at open. All mutations that must be
//! atomic (model activation, attendance insert) run inside a transaction on
//! the owned connection.

mod attendance;
mod identities;
mod models;
mod samples;
pub mod snapshot;

pub use attendance::AttendanceOutcome;
pub use identities::normalize_key;
pub use snapshot::ModelSnapshot;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity not found: {0}")]
    IdentityNotFound(String),
    #[error("face sample not found: {0}")]
    SampleNotFound(String),
    #[error("storage write failed: {0}")]
    WriteFailed(String),
    #[error("snapshot I/O failed: {0}")]
    SnapshotIo(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Owned handle to the rollcall database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.create_schema()?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                external_id   TEXT PRIMARY KEY,
                normalized_id TEXT NOT NULL,
                display_name  TEXT NOT NULL DEFAULT '',
                enrolled      INTEGER NOT NULL DEFAULT 0,
                enrolled_at   TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_identities_normalized
                ON identities (normalized_id);

            CREATE TABLE IF NOT EXISTS face_samples (
                id                TEXT PRIMARY KEY,
                identity          TEXT NOT NULL REFERENCES identities (external_id),
                image_path        TEXT NOT NULL,
                descriptor        TEXT,
                descriptor_cached INTEGER NOT NULL DEFAULT 0,
                is_active         INTEGER NOT NULL DEFAULT 1,
                created_at        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_face_samples_identity
                ON face_samples (identity);

            CREATE TABLE IF NOT EXISTS model_versions (
                version        TEXT PRIMARY KEY,
                snapshot_path  TEXT NOT NULL,
                sample_count   INTEGER NOT NULL,
                identity_count INTEGER NOT NULL,
                build_seconds  REAL NOT NULL,
                is_active      INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL,
                notes          TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS attendance_records (
                id           TEXT PRIMARY KEY,
                identity     TEXT NOT NULL REFERENCES identities (external_id),
                date         TEXT NOT NULL,
                recorded_at  TEXT NOT NULL,
                method       TEXT NOT NULL,
                confidence   REAL,
                capture_path TEXT,
                UNIQUE (identity, date)
            );
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
