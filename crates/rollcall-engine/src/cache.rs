//! Descriptor cache: one extraction per stored image, ever.
//!
//! Repeated retraining is dominated by extractor cost, so descriptors are
//! persisted on the face sample after the first successful extraction and
//! reused verbatim afterwards. A failed extraction leaves the cache empty so
//! the sample can be retried once the underlying image is fixed. The cache is
//! never invalidated when an image is replaced at the same path.

use rollcall_core::{Descriptor, ExtractionError, FaceSample, FeatureExtractor};
use rollcall_store::{Store, StoreError};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Return the sample's descriptor, extracting and persisting it on a miss.
pub fn get_or_compute(
    store: &Store,
    extractor: &dyn FeatureExtractor,
    sample: &FaceSample,
) -> Result<Descriptor, CacheError> {
    if sample.descriptor_cached {
        if let Some(descriptor) = &sample.descriptor {
            tracing::trace!(sample = %sample.id, "descriptor cache hit");
            return Ok(descriptor.clone());
        }
    }

    let descriptor = extractor.extract(Path::new(&sample.image_path))?;
    store.cache_descriptor(&sample.id, &descriptor)?;
    tracing::debug!(sample = %sample.id, identity = %sample.identity, "descriptor cached");
    Ok(descriptor)
}
