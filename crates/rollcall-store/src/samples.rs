//! Face sample rows: one stored training image per row, with the cached
//! descriptor kept alongside (JSON array at rest).

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use rollcall_core::{Descriptor, FaceSample};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<FaceSample> {
    let descriptor_json: Option<String> = row.get(3)?;
    let descriptor = descriptor_json.and_then(|json| {
        serde_json::from_str::<Vec<f32>>(&json)
            .ok()
            .map(Descriptor::new)
    });
    Ok(FaceSample {
        id: row.get(0)?,
        identity: row.get(1)?,
        image_path: row.get(2)?,
        descriptor,
        descriptor_cached: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row
            .get::<_, String>(6)?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SAMPLE_COLUMNS: &str =
    "id, identity, image_path, descriptor, descriptor_cached, is_active, created_at";

impl Store {
    /// Create a face sample for an identity. The backing image must already
    /// be stored at `image_path`; a sample row without an image is invalid.
    pub fn insert_sample(&self, identity: &str, image_path: &str) -> Result<FaceSample, StoreError> {
        let sample = FaceSample {
            id: Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            image_path: image_path.to_string(),
            descriptor: None,
            descriptor_cached: false,
            is_active: true,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO face_samples (id, identity, image_path, descriptor_cached, is_active, created_at)
             VALUES (?1, ?2, ?3, 0, 1, ?4)",
            params![
                sample.id,
                sample.identity,
                sample.image_path,
                sample.created_at.to_rfc3339()
            ],
        )?;
        Ok(sample)
    }

    pub fn get_sample(&self, id: &str) -> Result<FaceSample, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {SAMPLE_COLUMNS} FROM face_samples WHERE id = ?1"),
                params![id],
                sample_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::SampleNotFound(id.to_string()))
    }

    /// All samples participating in training, oldest first.
    pub fn list_active_samples(&self) -> Result<Vec<FaceSample>, StoreError> {
        let mut stmt = self.conn().prepare(
            &format!("SELECT {SAMPLE_COLUMNS} FROM face_samples WHERE is_active = 1 ORDER BY created_at, id"),
        )?;
        let rows = stmt.query_map([], sample_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn active_sample_count(&self, identity: &str) -> Result<usize, StoreError> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM face_samples WHERE identity = ?1 AND is_active = 1",
            params![identity],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Persist a freshly computed descriptor and mark the cache valid.
    pub fn cache_descriptor(&self, id: &str, descriptor: &Descriptor) -> Result<(), StoreError> {
        let json = serde_json::to_string(&descriptor.values)?;
        let changed = self.conn().execute(
            "UPDATE face_samples SET descriptor = ?2, descriptor_cached = 1 WHERE id = ?1",
            params![id, json],
        )?;
        if changed == 0 {
            return Err(StoreError::SampleNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Soft-remove a sample from training.
    pub fn deactivate_sample(&self, id: &str) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE face_samples SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StoreError::SampleNotFound(id.to_string()));
        }
        Ok(())
    }
}
