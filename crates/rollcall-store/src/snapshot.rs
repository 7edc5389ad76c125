//! Durable model snapshots.
//!
//! The trained model's (descriptors, identities) pair is persisted as a JSON
//! document next to the database. The file is written to a temporary sibling
//! and renamed into place, so a crash mid-write never leaves a truncated
//! snapshot behind the active model version.

use crate::StoreError;
use chrono::{DateTime, Utc};
use rollcall_core::{Descriptor, IndexEntry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk form of a trained model: parallel descriptor/identity arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: String,
    pub descriptors: Vec<Vec<f32>>,
    pub identities: Vec<String>,
    pub built_at: DateTime<Utc>,
    pub sample_count: usize,
}

impl ModelSnapshot {
    pub fn new(version: String, entries: &[IndexEntry], built_at: DateTime<Utc>) -> Self {
        Self {
            version,
            descriptors: entries.iter().map(|e| e.descriptor.values.clone()).collect(),
            identities: entries.iter().map(|e| e.identity.clone()).collect(),
            built_at,
            sample_count: entries.len(),
        }
    }

    /// Rebuild index entries from the parallel arrays.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.descriptors
            .iter()
            .zip(self.identities.iter())
            .map(|(values, identity)| IndexEntry {
                descriptor: Descriptor::new(values.clone()),
                identity: identity.clone(),
            })
            .collect()
    }

    pub fn unique_identity_count(&self) -> usize {
        let mut seen: Vec<&str> = self.identities.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Write the snapshot durably (write-then-rename).
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        tracing::info!(
            path = %path.display(),
            version = %self.version,
            descriptors = self.sample_count,
            "model snapshot written"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
