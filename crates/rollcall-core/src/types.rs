use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Face descriptor vector produced by the external feature extractor
/// (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute Euclidean distance to another descriptor. Lower = more similar.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A durable face sample: one stored training image owned by an identity,
/// with an optional cached descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceSample {
    pub id: String,
    /// External identity key (e.g. "STU001").
    pub identity: String,
    /// Path to the stored image file.
    pub image_path: String,
    /// Cached descriptor, populated lazily by training.
    pub descriptor: Option<Descriptor>,
    /// Whether `descriptor` is valid. Never cleared automatically when the
    /// underlying image changes — retraining reuses the cached value.
    pub descriptor_cached: bool,
    /// Inactive samples are excluded from training (soft removal).
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A versioned snapshot of the trained model. Exactly one version is active
/// at any time; activation is an atomic swap at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Time-derived version identifier (e.g. "v20250114_093012").
    pub version: String,
    /// Path to the durable snapshot file.
    pub snapshot_path: String,
    /// Number of descriptors in the snapshot.
    pub sample_count: usize,
    /// Number of distinct identities in the snapshot.
    pub identity_count: usize,
    pub build_seconds: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub notes: String,
}

/// A known identity (student) that face samples can be enrolled against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// External id, stored uppercase (e.g. "STU001").
    pub external_id: String,
    pub display_name: String,
    pub enrolled: bool,
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// Result of matching a query descriptor against the active index.
///
/// `identity` is populated only when `matched` is true; a rejected match
/// still reports the best distance and confidence for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub identity: Option<String>,
    /// Raw distance of the best candidate (lower = more similar).
    pub distance: f32,
    /// Calibrated confidence in [0, 1], for display only — the accept
    /// decision is distance-based.
    pub confidence: f32,
}

impl MatchResult {
    /// A non-match with zero confidence, used when no query descriptor could
    /// be extracted from the capture.
    pub fn no_face() -> Self {
        Self {
            matched: false,
            identity: None,
            distance: f32::INFINITY,
            confidence: 0.0,
        }
    }
}

/// An attendance record derived from an accepted match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub identity: String,
    pub date: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    /// Recording method tag; this core only writes "face".
    pub method: String,
    pub confidence: Option<f32>,
    /// Stored capture image, kept for audit.
    pub capture_path: Option<String>,
}
