//! Nearest-neighbor matching of a query descriptor against the active index.

use crate::types::{Descriptor, MatchResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum acceptable distance for a positive match.
pub const DEFAULT_TOLERANCE: f32 = 0.45;

/// One (descriptor, identity) pair in the index. Multiple entries per
/// identity are expected and improve matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub descriptor: Descriptor,
    pub identity: String,
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no trained model available — index is empty")]
    EmptyModel,
}

/// Strategy for comparing a query descriptor against the index.
pub trait Matcher {
    fn nearest(
        &self,
        query: &Descriptor,
        index: &[IndexEntry],
        tolerance: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean nearest-neighbor matcher.
///
/// Scans every index entry and keeps the global minimum distance. Ties are
/// broken by first-encountered index order — deterministic but arbitrary.
/// Confidence is `clamp(1 - distance/tolerance, 0, 1)`; the accept decision
/// itself is `distance <= tolerance`.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn nearest(
        &self,
        query: &Descriptor,
        index: &[IndexEntry],
        tolerance: f32,
    ) -> Result<MatchResult, MatchError> {
        if index.is_empty() {
            return Err(MatchError::EmptyModel);
        }

        let mut best_distance = f32::INFINITY;
        let mut best_idx = 0usize;
        for (i, entry) in index.iter().enumerate() {
            let d = query.distance(&entry.descriptor);
            if d < best_distance {
                best_distance = d;
                best_idx = i;
            }
        }

        let confidence = (1.0 - best_distance / tolerance).clamp(0.0, 1.0);
        if best_distance <= tolerance {
            let identity = index[best_idx].identity.clone();
            tracing::info!(
                identity = %identity,
                distance = best_distance,
                confidence,
                "face matched"
            );
            Ok(MatchResult {
                matched: true,
                identity: Some(identity),
                distance: best_distance,
                confidence,
            })
        } else {
            tracing::info!(
                distance = best_distance,
                tolerance,
                "no match within tolerance"
            );
            Ok(MatchResult {
                matched: false,
                identity: None,
                distance: best_distance,
                confidence,
            })
        }
    }
}
