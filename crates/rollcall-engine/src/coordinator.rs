//! End-to-end orchestration: bulk enrollment from a dataset archive, and
//! single-capture attendance marking.

use crate::config::Config;
use crate::index::{IndexStatus, RecognitionService};
use crate::progress::ProgressTracker;
use crate::trainer::{TrainError, TrainerHandle};
use chrono::Utc;
use parking_lot::Mutex;
use rollcall_core::{FeatureExtractor, MatchError, MatchResult, ModelVersion};
use rollcall_ingest::{self as ingest, IngestError, InvalidImage};
use rollcall_store::{AttendanceOutcome, Store, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Cap on per-item failure reasons included in user-visible reports.
const MAX_REPORTED_FAILURES: usize = 10;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("capture I/O failed: {0}")]
    CaptureIo(#[from] std::io::Error),
}

/// Summary of the training run folded into an enrollment response.
#[derive(Debug, Serialize)]
pub struct TrainingSummary {
    pub triggered: bool,
    pub success: bool,
    pub version: Option<String>,
    pub processed: usize,
    pub unique_identities: usize,
    /// Capped list of per-sample failure reasons.
    pub errors: Vec<String>,
}

/// A resolved identity key that had no matching roster entry.
#[derive(Debug, Serialize)]
pub struct UnmappedGroup {
    pub key: String,
    pub image_count: usize,
}

/// Response to a bulk enrollment request.
#[derive(Debug, Serialize)]
pub struct EnrollmentReport {
    pub total_images: usize,
    pub valid_images: usize,
    /// Capped list of images that failed validation.
    pub invalid_images: Vec<InvalidImage>,
    pub invalid_count: usize,
    pub mapped_identities: usize,
    pub samples_created: usize,
    pub unmapped: Vec<UnmappedGroup>,
    /// Valid images whose path yielded no identity key at all.
    pub unresolved_images: usize,
    pub training: TrainingSummary,
}

/// Outcome of a single-capture attendance submission.
#[derive(Debug)]
pub enum AttendanceResponse {
    /// Attendance written for the matched identity.
    Recorded {
        identity: String,
        display_name: String,
        result: MatchResult,
        capture_path: PathBuf,
    },
    /// A record for this identity already existed today; nothing written.
    AlreadyRecorded {
        identity: String,
        display_name: String,
    },
    /// The capture did not match; stored for manual review.
    NotRecognized {
        result: MatchResult,
        review_path: PathBuf,
    },
}

/// Engine-level model status for operator screens.
#[derive(Debug)]
pub struct ModelStatus {
    pub index: IndexStatus,
    pub active_version: Option<ModelVersion>,
    pub enrolled_identities: usize,
}

/// Orchestrates enrollment and attendance flows over the store, extractor,
/// recognition service, and trainer.
///
/// Injected into request handlers as a shared service object; the store
/// connection is the only interior-mutable piece and its lock is never held
/// across an extractor call.
pub struct Coordinator {
    store: Mutex<Store>,
    extractor: Arc<dyn FeatureExtractor>,
    service: Arc<RecognitionService>,
    trainer: TrainerHandle,
    progress: Arc<ProgressTracker>,
    config: Config,
}

impl Coordinator {
    pub fn new(
        store: Store,
        extractor: Arc<dyn FeatureExtractor>,
        service: Arc<RecognitionService>,
        trainer: TrainerHandle,
        progress: Arc<ProgressTracker>,
        config: Config,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            extractor,
            service,
            trainer,
            progress,
            config,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    fn report_progress(&self, task_id: Option<&str>, percent: u8, message: &str) {
        if let Some(task_id) = task_id {
            self.progress.update(task_id, percent, message);
        }
    }

    /// Bulk enrollment: ingest an archive, link images to known identities,
    /// persist face samples, then retrain.
    ///
    /// Training runs synchronously and its outcome is folded into the
    /// report, but a training failure never fails the enrollment itself.
    pub async fn enroll_archive(
        &self,
        archive: &Path,
        task_id: Option<&str>,
    ) -> Result<EnrollmentReport, CoordinatorError> {
        self.report_progress(task_id, 5, "Extracting and validating images...");
        let dataset = ingest::ingest(archive, &self.config.scratch_dir, self.extractor.as_ref())?;

        self.report_progress(task_id, 20, "Mapping identities to roster...");
        let mut mapped_identities = 0usize;
        let mut samples_created = 0usize;
        let mut unmapped = Vec::new();
        let group_total = dataset.grouped.len();

        for (idx, (key, paths)) in dataset.grouped.iter().enumerate() {
            if group_total > 0 {
                let percent = 20 + ((idx * 30) / group_total) as u8;
                self.report_progress(task_id, percent, &format!("Mapping {key}..."));
            }

            let store = self.store.lock();
            let Some(identity) = store.find_identity(key)? else {
                tracing::warn!(key = %key, images = paths.len(), "no roster entry for resolved identity");
                unmapped.push(UnmappedGroup {
                    key: key.clone(),
                    image_count: paths.len(),
                });
                continue;
            };
            drop(store);

            let mut created = 0usize;
            for path in paths {
                match self.adopt_image(&identity.external_id, path) {
                    Ok(()) => created += 1,
                    Err(err) => {
                        // One bad copy never aborts the batch.
                        tracing::error!(
                            image = %path.display(),
                            identity = %identity.external_id,
                            error = %err,
                            "failed to store face image"
                        );
                    }
                }
            }

            if created > 0 {
                let store = self.store.lock();
                store.mark_enrolled(&identity.external_id, Utc::now())?;
                mapped_identities += 1;
                samples_created += created;
                tracing::info!(
                    identity = %identity.external_id,
                    images = created,
                    "identity enrolled from dataset"
                );
            }
        }

        let training = if mapped_identities > 0 {
            self.report_progress(task_id, 55, "Training model...");
            let task = task_id.map(|id| (id.to_string(), 55, 95));
            match self.trainer.train(task).await {
                Ok(outcome) => TrainingSummary {
                    triggered: true,
                    success: true,
                    version: Some(outcome.version.version),
                    processed: outcome.processed,
                    unique_identities: outcome.unique_identities,
                    errors: cap(outcome.skipped),
                },
                Err(err) => {
                    tracing::error!(error = %err, "training after enrollment failed");
                    TrainingSummary {
                        triggered: true,
                        success: false,
                        version: None,
                        processed: 0,
                        unique_identities: 0,
                        errors: vec![err.to_string()],
                    }
                }
            }
        } else {
            TrainingSummary {
                triggered: false,
                success: false,
                version: None,
                processed: 0,
                unique_identities: 0,
                errors: Vec::new(),
            }
        };

        self.report_progress(task_id, 100, "Enrollment complete");
        let invalid_count = dataset.invalid.len();
        Ok(EnrollmentReport {
            total_images: dataset.total_images,
            valid_images: dataset.valid.len(),
            invalid_images: cap(dataset.invalid),
            invalid_count,
            mapped_identities,
            samples_created,
            unmapped,
            unresolved_images: dataset.unmapped.len(),
            training,
        })
    }

    /// Copy a validated dataset image into the media area and create its
    /// face sample row. The copy happens first so a sample row never exists
    /// without its backing image.
    fn adopt_image(&self, identity: &str, source: &Path) -> Result<(), CoordinatorError> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let dir = self.config.faces_dir.join(identity);
        std::fs::create_dir_all(&dir)?;
        let target = dir.join(format!("{}.{ext}", Uuid::new_v4()));
        std::fs::copy(source, &target)?;

        let store = self.store.lock();
        store.insert_sample(identity, &target.to_string_lossy())?;
        Ok(())
    }

    /// Retrain from all active samples (operator-triggered).
    pub async fn retrain(&self, task_id: Option<&str>) -> Result<TrainingSummary, TrainError> {
        let task = task_id.map(|id| (id.to_string(), 0, 100));
        let outcome = self.trainer.train(task).await?;
        Ok(TrainingSummary {
            triggered: true,
            success: true,
            version: Some(outcome.version.version),
            processed: outcome.processed,
            unique_identities: outcome.unique_identities,
            errors: cap(outcome.skipped),
        })
    }

    /// Mark attendance from a single live capture.
    pub fn mark_attendance(&self, capture: &Path) -> Result<AttendanceResponse, CoordinatorError> {
        let result = self
            .service
            .match_capture(self.extractor.as_ref(), capture)?;

        let Some(key) = result.identity.clone().filter(|_| result.matched) else {
            let review_path = self.stash_capture(&self.config.review_dir, "unrecognized", capture)?;
            tracing::info!(
                distance = result.distance,
                confidence = result.confidence,
                review = %review_path.display(),
                "capture not recognized; stored for review"
            );
            return Ok(AttendanceResponse::NotRecognized {
                result,
                review_path,
            });
        };

        let store = self.store.lock();
        let identity = store.get_identity(&key)?;
        let today = Utc::now().date_naive();

        if store.find_attendance(&identity.external_id, today)?.is_some() {
            return Ok(AttendanceResponse::AlreadyRecorded {
                identity: identity.external_id,
                display_name: identity.display_name,
            });
        }
        drop(store);

        let capture_path = self.stash_capture(&self.config.captures_dir, &identity.external_id, capture)?;

        let store = self.store.lock();
        let outcome = store.record_attendance(
            &identity.external_id,
            today,
            "face",
            Some(result.confidence),
            Some(&capture_path.to_string_lossy()),
        )?;

        match outcome {
            AttendanceOutcome::Recorded(record) => {
                tracing::info!(
                    identity = %record.identity,
                    confidence = result.confidence,
                    "attendance recorded"
                );
                Ok(AttendanceResponse::Recorded {
                    identity: identity.external_id,
                    display_name: identity.display_name,
                    result,
                    capture_path,
                })
            }
            // Lost a concurrent race; same no-op success as the pre-check.
            AttendanceOutcome::AlreadyRecorded(_) => Ok(AttendanceResponse::AlreadyRecorded {
                identity: identity.external_id,
                display_name: identity.display_name,
            }),
        }
    }

    /// Store a capture image for audit or review.
    fn stash_capture(
        &self,
        dir: &Path,
        prefix: &str,
        capture: &Path,
    ) -> Result<PathBuf, CoordinatorError> {
        std::fs::create_dir_all(dir)?;
        let ext = capture
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let target = dir.join(format!(
            "{prefix}_{}.{ext}",
            Utc::now().format("%Y%m%d_%H%M%S%3f")
        ));
        std::fs::copy(capture, &target)?;
        Ok(target)
    }

    pub fn model_status(&self) -> Result<ModelStatus, CoordinatorError> {
        let store = self.store.lock();
        Ok(ModelStatus {
            index: self.service.status(),
            active_version: store.active_model_version()?,
            enrolled_identities: store.enrolled_identity_count()?,
        })
    }

    /// Register a roster identity (used by admin tooling and tests).
    pub fn register_identity(&self, external_id: &str, display_name: &str) -> Result<(), CoordinatorError> {
        self.store.lock().upsert_identity(external_id, display_name)?;
        Ok(())
    }
}

fn cap<T>(mut items: Vec<T>) -> Vec<T> {
    items.truncate(MAX_REPORTED_FAILURES);
    items
}
