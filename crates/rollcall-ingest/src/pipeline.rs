//! The ingestion pipeline: walk, validate, group.

use crate::{archive, IngestError};
use image::ImageFormat;
use rollcall_core::{resolve_identity, FeatureExtractor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file inside an extracted archive that passed validation.
#[derive(Debug, Clone)]
pub struct CandidateImage {
    pub path: PathBuf,
    /// Identity key resolved from the path, if any.
    pub identity: Option<String>,
}

/// A file that failed validation, with the reason kept for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidImage {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one ingestion run. Transient — callers persist what they need.
#[derive(Debug)]
pub struct DatasetReport {
    /// Scratch directory the archive was extracted to.
    pub extract_root: PathBuf,
    /// All recognized image files found, valid or not.
    pub total_images: usize,
    pub valid: Vec<CandidateImage>,
    pub invalid: Vec<InvalidImage>,
    /// Valid images grouped by resolved identity key.
    pub grouped: BTreeMap<String, Vec<PathBuf>>,
    /// Valid images whose identity could not be resolved.
    pub unmapped: Vec<PathBuf>,
}

/// Extract `archive_path`, validate every image through the extractor, and
/// group valid images by resolved identity.
///
/// A corrupt archive or an archive without a single recognized image aborts;
/// an individual bad image is recorded in `invalid` and never aborts the
/// batch.
pub fn ingest(
    archive_path: &Path,
    scratch_root: &Path,
    extractor: &dyn FeatureExtractor,
) -> Result<DatasetReport, IngestError> {
    let extract_root = archive::extract_archive(archive_path, scratch_root)?;
    let images = find_images(&extract_root);
    if images.is_empty() {
        return Err(IngestError::NoImagesFound);
    }

    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for path in &images {
        match extractor.validate(path) {
            Ok(()) => {
                let identity = resolve_identity(path, Some(&extract_root));
                valid.push(CandidateImage {
                    path: path.clone(),
                    identity,
                });
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "image failed validation");
                invalid.push(InvalidImage {
                    path: path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut unmapped = Vec::new();
    for candidate in &valid {
        match &candidate.identity {
            Some(identity) => grouped
                .entry(identity.clone())
                .or_default()
                .push(candidate.path.clone()),
            None => unmapped.push(candidate.path.clone()),
        }
    }

    tracing::info!(
        total = images.len(),
        valid = valid.len(),
        invalid = invalid.len(),
        identities = grouped.len(),
        unmapped = unmapped.len(),
        "dataset ingested"
    );

    Ok(DatasetReport {
        extract_root,
        total_images: images.len(),
        valid,
        invalid,
        grouped,
        unmapped,
    })
}

/// Recursively enumerate files with recognized image extensions.
fn find_images(root: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .collect();
    images.sort();
    images
}

fn is_image_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    matches!(
        ImageFormat::from_extension(ext),
        Some(
            ImageFormat::Jpeg
                | ImageFormat::Png
                | ImageFormat::Bmp
                | ImageFormat::Gif
                | ImageFormat::WebP
        )
    )
}
