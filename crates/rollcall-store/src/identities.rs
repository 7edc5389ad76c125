//! Identity lookup and enrollment-status bookkeeping.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use rollcall_core::Identity;
use rusqlite::{params, OptionalExtension, Row};

/// Strip `_`/`-` and uppercase — the fallback lookup form for keys that were
/// resolved with punctuation the roster does not carry.
pub fn normalize_key(external_id: &str) -> String {
    external_id
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect()
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        external_id: row.get(0)?,
        display_name: row.get(1)?,
        enrolled: row.get(2)?,
        enrolled_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    })
}

impl Store {
    /// Register a known identity (roster entry). Upserts on external id.
    pub fn upsert_identity(
        &self,
        external_id: &str,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let external_id = external_id.trim().to_uppercase();
        self.conn().execute(
            "INSERT INTO identities (external_id, normalized_id, display_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (external_id) DO UPDATE SET display_name = excluded.display_name",
            params![external_id, normalize_key(&external_id), display_name],
        )?;
        Ok(())
    }

    /// Look up an identity by external id: exact case-insensitive match
    /// first, then the punctuation-normalized fallback.
    pub fn find_identity(&self, external_id: &str) -> Result<Option<Identity>, StoreError> {
        let exact = self
            .conn()
            .query_row(
                "SELECT external_id, display_name, enrolled, enrolled_at
                 FROM identities WHERE external_id = ?1 COLLATE NOCASE",
                params![external_id.trim()],
                identity_from_row,
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        Ok(self
            .conn()
            .query_row(
                "SELECT external_id, display_name, enrolled, enrolled_at
                 FROM identities WHERE normalized_id = ?1 LIMIT 1",
                params![normalize_key(external_id)],
                identity_from_row,
            )
            .optional()?)
    }

    pub fn get_identity(&self, external_id: &str) -> Result<Identity, StoreError> {
        self.find_identity(external_id)?
            .ok_or_else(|| StoreError::IdentityNotFound(external_id.to_string()))
    }

    /// Mark an identity as face-enrolled. The first enrollment sets
    /// `enrolled_at`; later ones leave it untouched.
    pub fn mark_enrolled(&self, external_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE identities
             SET enrolled = 1,
                 enrolled_at = COALESCE(enrolled_at, ?2)
             WHERE external_id = ?1",
            params![external_id, at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::IdentityNotFound(external_id.to_string()));
        }
        Ok(())
    }

    /// Count identities with at least one active sample enrolled.
    pub fn enrolled_identity_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM identities WHERE enrolled = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
