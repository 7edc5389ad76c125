//! Model training: descriptor aggregation, snapshot persistence, activation.
//!
//! All training runs go through one dedicated worker thread, so at most one
//! is ever in flight; a request arriving mid-run queues behind it. This also
//! keeps descriptor-cache writes race-free.

use crate::cache::{self, CacheError};
use crate::index::FaceIndex;
use crate::progress::ProgressTracker;
use crate::RecognitionService;
use chrono::Utc;
use rollcall_core::{FeatureExtractor, IndexEntry, ModelVersion};
use rollcall_store::{ModelSnapshot, Store, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("no valid face descriptors could be produced")]
    NoValidSamples,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("trainer thread exited")]
    ChannelClosed,
}

/// Result of a completed training run.
#[derive(Debug)]
pub struct TrainOutcome {
    pub version: ModelVersion,
    /// Number of descriptors that went into the index.
    pub processed: usize,
    pub unique_identities: usize,
    /// Per-sample failure reasons (skipped, not fatal).
    pub skipped: Vec<String>,
}

/// Build a new model version from all active face samples.
///
/// Descriptors come from the cache (filling it on miss). Samples that fail
/// extraction are skipped and recorded; the run succeeds if at least one
/// descriptor is produced. On success the snapshot is written durably, the
/// version activated atomically, and the fresh index swapped into `service`.
/// Any failure leaves the previously active version untouched.
pub fn train(
    store: &mut Store,
    extractor: &dyn FeatureExtractor,
    service: &RecognitionService,
    model_dir: &Path,
    progress: Option<&dyn Fn(u8, &str)>,
) -> Result<TrainOutcome, TrainError> {
    let report = |percent: u8, message: &str| {
        if let Some(cb) = progress {
            cb(percent, message);
        }
    };

    let started = Instant::now();
    let samples = store.list_active_samples()?;
    let total = samples.len();
    if total == 0 {
        tracing::warn!("training requested with no active face samples");
        return Err(TrainError::NoValidSamples);
    }

    tracing::info!(samples = total, "training started");
    report(0, &format!("Starting training with {total} images..."));

    let mut entries: Vec<IndexEntry> = Vec::with_capacity(total);
    let mut skipped = Vec::new();
    for (idx, sample) in samples.iter().enumerate() {
        // Monotone percent derived from processed/total, never wall clock.
        let percent = (((idx + 1) * 100) / total) as u8;
        report(
            percent,
            &format!("Processing {} ({}/{})", sample.identity, idx + 1, total),
        );

        match cache::get_or_compute(store, extractor, sample) {
            Ok(descriptor) => entries.push(IndexEntry {
                descriptor,
                identity: sample.identity.clone(),
            }),
            Err(CacheError::Extraction(err)) => {
                tracing::warn!(
                    sample = %sample.id,
                    image = %sample.image_path,
                    error = %err,
                    "sample skipped during training"
                );
                skipped.push(format!("{}: {err}", sample.image_path));
            }
            Err(CacheError::Store(err)) => return Err(err.into()),
        }
    }

    if entries.is_empty() {
        tracing::error!(skipped = skipped.len(), "no valid descriptors produced");
        return Err(TrainError::NoValidSamples);
    }

    let built_at = Utc::now();
    // Time-derived for readability; the uuid suffix keeps back-to-back runs
    // within the same second from colliding on the version primary key.
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let version_id = format!("v{}_{}", built_at.format("%Y%m%d_%H%M%S"), &suffix[..6]);
    let snapshot_path = model_dir.join(format!("{version_id}.json"));

    let snapshot = ModelSnapshot::new(version_id.clone(), &entries, built_at);
    snapshot.write(&snapshot_path)?;

    let index = FaceIndex {
        version: version_id.clone(),
        entries,
        built_at,
    };
    let unique_identities = index.unique_identity_count();
    let processed = index.len();

    let version = ModelVersion {
        version: version_id,
        snapshot_path: snapshot_path.to_string_lossy().into_owned(),
        sample_count: processed,
        identity_count: unique_identities,
        build_seconds: started.elapsed().as_secs_f64(),
        is_active: true,
        created_at: built_at,
        notes: format!("Trained from {processed} samples across {unique_identities} identities"),
    };
    store.activate_model_version(&version)?;
    service.activate(Arc::new(index));

    report(100, "Training complete");
    tracing::info!(
        version = %version.version,
        processed,
        unique_identities,
        skipped = skipped.len(),
        seconds = version.build_seconds,
        "training completed"
    );

    Ok(TrainOutcome {
        version,
        processed,
        unique_identities,
        skipped,
    })
}

/// Messages sent from request handlers to the trainer thread.
enum TrainRequest {
    Train {
        /// Progress task id plus the (base, top) percent window the run maps
        /// its own 0–100 onto (bulk enrollment reports training as 55–95 of
        /// the overall task).
        task: Option<(String, u8, u8)>,
        reply: oneshot::Sender<Result<TrainOutcome, TrainError>>,
    },
}

/// Clone-safe handle to the trainer thread.
#[derive(Clone)]
pub struct TrainerHandle {
    tx: mpsc::Sender<TrainRequest>,
}

impl TrainerHandle {
    /// Request a training run; queues behind any run already in flight.
    pub async fn train(
        &self,
        task: Option<(String, u8, u8)>,
    ) -> Result<TrainOutcome, TrainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(TrainRequest::Train {
                task,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TrainError::ChannelClosed)?;
        reply_rx.await.map_err(|_| TrainError::ChannelClosed)?
    }
}

/// Spawn the trainer on a dedicated OS thread.
///
/// Opens its own store connection (fail-fast), then enters a request loop.
/// Routing every run through this one thread serializes training.
pub fn spawn_trainer(
    db_path: PathBuf,
    model_dir: PathBuf,
    extractor: Arc<dyn FeatureExtractor>,
    service: Arc<RecognitionService>,
    progress: Arc<ProgressTracker>,
) -> Result<TrainerHandle, TrainError> {
    let mut store = Store::open(&db_path)?;
    let (tx, mut rx) = mpsc::channel::<TrainRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-trainer".into())
        .spawn(move || {
            tracing::info!("trainer thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    TrainRequest::Train { task, reply } => {
                        let callback = task.as_ref().map(|(task_id, base, top)| {
                            let span = top.saturating_sub(*base) as u32;
                            let progress = Arc::clone(&progress);
                            let task_id = task_id.clone();
                            let base = *base;
                            move |percent: u8, message: &str| {
                                let mapped = base + ((percent as u32 * span) / 100) as u8;
                                progress.update(&task_id, mapped, message);
                            }
                        });
                        let cb_ref: Option<&dyn Fn(u8, &str)> = callback
                            .as_ref()
                            .map(|cb| cb as &dyn Fn(u8, &str));
                        let result =
                            train(&mut store, extractor.as_ref(), &service, &model_dir, cb_ref);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("trainer thread exiting");
        })
        .expect("failed to spawn trainer thread");

    Ok(TrainerHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rollcall_core::{Descriptor, ExtractionError};
    use std::collections::HashMap;

    /// Extractor scripted per image path; paths not in the map fail with
    /// NoFaceDetected.
    struct MapExtractor {
        descriptors: HashMap<String, Vec<f32>>,
    }

    impl MapExtractor {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                descriptors: entries
                    .iter()
                    .map(|(p, v)| (p.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    impl FeatureExtractor for MapExtractor {
        fn validate(&self, image: &Path) -> Result<(), ExtractionError> {
            self.extract(image).map(|_| ())
        }
        fn extract(&self, image: &Path) -> Result<Descriptor, ExtractionError> {
            self.descriptors
                .get(&image.to_string_lossy().into_owned())
                .map(|v| Descriptor::new(v.clone()))
                .ok_or(ExtractionError::NoFaceDetected)
        }
    }

    fn seeded_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.upsert_identity("STU001", "Ada").unwrap();
        store.upsert_identity("STU002", "Grace").unwrap();
        store
    }

    #[test]
    fn test_successful_training_activates_one_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded_store();
        store.insert_sample("STU001", "a.jpg").unwrap();
        store.insert_sample("STU001", "b.jpg").unwrap();
        store.insert_sample("STU002", "c.jpg").unwrap();
        let extractor = MapExtractor::new(&[
            ("a.jpg", vec![0.1, 0.0]),
            ("b.jpg", vec![0.2, 0.0]),
            ("c.jpg", vec![0.9, 0.0]),
        ]);
        let service = RecognitionService::new(0.45);

        let outcome = train(&mut store, &extractor, &service, dir.path(), None).unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.unique_identities, 2);
        assert!(outcome.skipped.is_empty());

        let versions = store.list_model_versions().unwrap();
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        let active = store.active_model_version().unwrap().unwrap();
        assert_eq!(active.sample_count, 3);
        assert_eq!(active.identity_count, 2);

        // The fresh index is live and the snapshot is durable.
        assert_eq!(service.status().descriptor_count, 3);
        let snapshot = ModelSnapshot::load(Path::new(&active.snapshot_path)).unwrap();
        assert_eq!(snapshot.sample_count, 3);
    }

    #[test]
    fn test_partial_failures_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded_store();
        store.insert_sample("STU001", "good.jpg").unwrap();
        store.insert_sample("STU002", "bad.jpg").unwrap();
        let extractor = MapExtractor::new(&[("good.jpg", vec![0.5])]);
        let service = RecognitionService::new(0.45);

        let outcome = train(&mut store, &extractor, &service, dir.path(), None).unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].contains("bad.jpg"));
    }

    #[test]
    fn test_zero_descriptors_leaves_previous_version_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded_store();

        // A previously trained, active version.
        let previous = ModelVersion {
            version: "v-prev".into(),
            snapshot_path: "/models/v-prev.json".into(),
            sample_count: 5,
            identity_count: 2,
            build_seconds: 1.0,
            is_active: true,
            created_at: Utc::now(),
            notes: String::new(),
        };
        store.activate_model_version(&previous).unwrap();

        store.insert_sample("STU001", "unreadable.jpg").unwrap();
        let extractor = MapExtractor::new(&[]);
        let service = RecognitionService::new(0.45);

        let err = train(&mut store, &extractor, &service, dir.path(), None).unwrap_err();
        assert!(matches!(err, TrainError::NoValidSamples));

        let active = store.active_model_version().unwrap().unwrap();
        assert_eq!(active.version, "v-prev");
        // And no index was swapped in.
        assert!(!service.status().loaded);
    }

    #[test]
    fn test_no_samples_at_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded_store();
        let extractor = MapExtractor::new(&[]);
        let service = RecognitionService::new(0.45);
        let err = train(&mut store, &extractor, &service, dir.path(), None).unwrap_err();
        assert!(matches!(err, TrainError::NoValidSamples));
    }

    #[test]
    fn test_progress_is_monotone_and_reaches_100() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded_store();
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
            store.insert_sample("STU001", name).unwrap();
        }
        let extractor = MapExtractor::new(&[
            ("a.jpg", vec![0.1]),
            ("b.jpg", vec![0.2]),
            ("c.jpg", vec![0.3]),
            ("d.jpg", vec![0.4]),
        ]);
        let service = RecognitionService::new(0.45);

        let seen: Mutex<Vec<u8>> = Mutex::new(Vec::new());
        let callback = |percent: u8, _message: &str| {
            seen.lock().push(percent);
        };
        train(&mut store, &extractor, &service, dir.path(), Some(&callback)).unwrap();

        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_trainer_handle_serializes_requests() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rollcall.db");
        {
            let store = Store::open(&db_path).unwrap();
            store.upsert_identity("STU001", "Ada").unwrap();
            store.insert_sample("STU001", "a.jpg").unwrap();
        }
        let extractor: Arc<dyn FeatureExtractor> =
            Arc::new(MapExtractor::new(&[("a.jpg", vec![0.1, 0.2])]));
        let service = Arc::new(RecognitionService::new(0.45));
        let progress = Arc::new(ProgressTracker::new(std::time::Duration::from_secs(300)));

        let handle = spawn_trainer(
            db_path.clone(),
            dir.path().join("models"),
            extractor,
            Arc::clone(&service),
            progress,
        )
        .unwrap();

        let (first, second) = tokio::join!(handle.train(None), handle.train(None));
        assert!(first.is_ok());
        assert!(second.is_ok());

        // Both runs completed against the worker's own connection; exactly
        // one version is active afterwards.
        let store = Store::open(&db_path).unwrap();
        let versions = store.list_model_versions().unwrap();
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        assert!(service.status().loaded);
    }
}
