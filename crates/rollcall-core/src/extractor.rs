//! Boundary to the external face feature extractor.
//!
//! Rollcall does not run detection or descriptor math itself. An
//! implementation of [`FeatureExtractor`] wraps whatever engine the
//! deployment provides; the core only depends on this trait.

use crate::types::Descriptor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("multiple faces detected (expected single face)")]
    MultipleFacesDetected,
    #[error("cannot read image: {0}")]
    ImageUnreadable(String),
    #[error("face detected but encoding failed: {0}")]
    EncodingFailed(String),
}

/// External face detection + descriptor generation capability.
///
/// Both calls are blocking (I/O- and CPU-bound); callers must not hold locks
/// across them.
pub trait FeatureExtractor: Send + Sync {
    /// Check that the image contains exactly one encodable face.
    fn validate(&self, image: &Path) -> Result<(), ExtractionError>;

    /// Produce the descriptor for the single face in the image.
    fn extract(&self, image: &Path) -> Result<Descriptor, ExtractionError>;
}
