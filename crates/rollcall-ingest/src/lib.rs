//! Rollcall dataset ingestion.
//!
//! Turns an uploaded archive of photographs into validated, identity-grouped
//! candidate images: extract to a scratch directory, walk recursively, run
//! every image through the external extractor's validation, and group the
//! survivors by resolved identity key.

mod archive;
mod pipeline;

pub use archive::extract_archive;
pub use pipeline::{ingest, CandidateImage, DatasetReport, InvalidImage};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid archive format: {0}")]
    ArchiveCorrupt(String),
    #[error("no images found in archive")]
    NoImagesFound,
    #[error("archive entry escapes extraction root: {0}")]
    UnsafeEntryPath(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
