//! Model version rows and the atomic activation swap.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use rollcall_core::ModelVersion;
use rusqlite::{params, OptionalExtension, Row};

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    Ok(ModelVersion {
        version: row.get(0)?,
        snapshot_path: row.get(1)?,
        sample_count: row.get::<_, i64>(2)? as usize,
        identity_count: row.get::<_, i64>(3)? as usize,
        build_seconds: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row
            .get::<_, String>(6)?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        notes: row.get(7)?,
    })
}

const VERSION_COLUMNS: &str = "version, snapshot_path, sample_count, identity_count, \
                               build_seconds, is_active, created_at, notes";

impl Store {
    /// Record a new model version and make it the single active one.
    ///
    /// Deactivating the previous version and inserting the new one happen in
    /// the same transaction: a reader sees either the old version active or
    /// the new one, never both and never neither.
    pub fn activate_model_version(&mut self, version: &ModelVersion) -> Result<(), StoreError> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("UPDATE model_versions SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            "INSERT INTO model_versions
                 (version, snapshot_path, sample_count, identity_count,
                  build_seconds, is_active, created_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                version.version,
                version.snapshot_path,
                version.sample_count as i64,
                version.identity_count as i64,
                version.build_seconds,
                version.created_at.to_rfc3339(),
                version.notes,
            ],
        )?;
        tx.commit()?;
        tracing::info!(version = %version.version, samples = version.sample_count, "model version activated");
        Ok(())
    }

    pub fn active_model_version(&self) -> Result<Option<ModelVersion>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {VERSION_COLUMNS} FROM model_versions WHERE is_active = 1"),
                [],
                version_from_row,
            )
            .optional()?)
    }

    /// All versions, newest first.
    pub fn list_model_versions(&self) -> Result<Vec<ModelVersion>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM model_versions ORDER BY created_at DESC, version DESC"
        ))?;
        let rows = stmt.query_map([], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
