//! The in-memory face index and the service that owns the active one.
//!
//! An index is immutable once built. Retraining produces a brand-new
//! `Arc<FaceIndex>` and swaps the pointer; a concurrent matcher sees either
//! the fully-old or the fully-new index, never a half-built one.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rollcall_core::{
    FeatureExtractor, IndexEntry, MatchError, MatchResult, Matcher, NearestMatcher,
};
use rollcall_store::{ModelSnapshot, Store};
use std::path::Path;
use std::sync::Arc;

/// Immutable nearest-neighbor index for one model version.
#[derive(Debug)]
pub struct FaceIndex {
    pub version: String,
    pub entries: Vec<IndexEntry>,
    pub built_at: DateTime<Utc>,
}

impl FaceIndex {
    pub fn from_snapshot(snapshot: &ModelSnapshot) -> Self {
        Self {
            version: snapshot.version.clone(),
            entries: snapshot.entries(),
            built_at: snapshot.built_at,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unique_identity_count(&self) -> usize {
        let mut ids: Vec<&str> = self.entries.iter().map(|e| e.identity.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Point-in-time view of the loaded index, for status reporting.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub loaded: bool,
    pub version: Option<String>,
    pub descriptor_count: usize,
    pub identity_count: usize,
}

/// Owns the atomically-swappable reference to the active index and answers
/// match queries against it.
pub struct RecognitionService {
    active: RwLock<Option<Arc<FaceIndex>>>,
    matcher: NearestMatcher,
    tolerance: f32,
}

impl RecognitionService {
    pub fn new(tolerance: f32) -> Self {
        Self {
            active: RwLock::new(None),
            matcher: NearestMatcher,
            tolerance,
        }
    }

    /// Build a service and load the active model's snapshot from the store,
    /// if one exists. A missing or unreadable snapshot logs a warning and
    /// leaves the service empty rather than failing startup.
    pub fn load_active(store: &Store, tolerance: f32) -> Self {
        let service = Self::new(tolerance);
        match store.active_model_version() {
            Ok(Some(version)) => {
                match ModelSnapshot::load(Path::new(&version.snapshot_path)) {
                    Ok(snapshot) => {
                        let index = FaceIndex::from_snapshot(&snapshot);
                        tracing::info!(
                            version = %index.version,
                            descriptors = index.len(),
                            identities = index.unique_identity_count(),
                            "loaded active model snapshot"
                        );
                        service.activate(Arc::new(index));
                    }
                    Err(err) => {
                        tracing::warn!(
                            version = %version.version,
                            path = %version.snapshot_path,
                            error = %err,
                            "active model snapshot unreadable; starting with empty index"
                        );
                    }
                }
            }
            Ok(None) => {
                tracing::info!("no active model version; starting with empty index");
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read active model version");
            }
        }
        service
    }

    /// Atomically swap in a newly built index.
    pub fn activate(&self, index: Arc<FaceIndex>) {
        *self.active.write() = Some(index);
    }

    /// Current index, if any. The returned `Arc` stays valid across a
    /// concurrent swap.
    pub fn active(&self) -> Option<Arc<FaceIndex>> {
        self.active.read().clone()
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Match a live capture against the active index.
    ///
    /// The query descriptor comes from a full extraction — live captures are
    /// never cached. Extraction failures return a zero-confidence non-match;
    /// an empty or missing index is a hard error. The extractor runs before
    /// the index is read, so no lock is held across the blocking call.
    pub fn match_capture(
        &self,
        extractor: &dyn FeatureExtractor,
        capture: &Path,
    ) -> Result<MatchResult, MatchError> {
        let query = match extractor.extract(capture) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::info!(capture = %capture.display(), error = %err, "capture yielded no descriptor");
                return Ok(MatchResult::no_face());
            }
        };

        let index = self.active().ok_or(MatchError::EmptyModel)?;
        if index.is_empty() {
            return Err(MatchError::EmptyModel);
        }
        self.matcher.nearest(&query, &index.entries, self.tolerance)
    }

    pub fn status(&self) -> IndexStatus {
        match self.active() {
            Some(index) => IndexStatus {
                loaded: true,
                version: Some(index.version.clone()),
                descriptor_count: index.len(),
                identity_count: index.unique_identity_count(),
            },
            None => IndexStatus {
                loaded: false,
                version: None,
                descriptor_count: 0,
                identity_count: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rollcall_core::{Descriptor, ExtractionError, ModelVersion};

    struct FixedExtractor {
        descriptor: Option<Descriptor>,
    }

    impl FeatureExtractor for FixedExtractor {
        fn validate(&self, _image: &Path) -> Result<(), ExtractionError> {
            Ok(())
        }
        fn extract(&self, _image: &Path) -> Result<Descriptor, ExtractionError> {
            self.descriptor
                .clone()
                .ok_or(ExtractionError::NoFaceDetected)
        }
    }

    fn index_with(entries: Vec<(&str, Vec<f32>)>) -> Arc<FaceIndex> {
        Arc::new(FaceIndex {
            version: "v-test".into(),
            entries: entries
                .into_iter()
                .map(|(id, values)| IndexEntry {
                    descriptor: Descriptor::new(values),
                    identity: id.into(),
                })
                .collect(),
            built_at: Utc::now(),
        })
    }

    #[test]
    fn test_match_against_active_index() {
        let service = RecognitionService::new(0.45);
        service.activate(index_with(vec![("STU001", vec![0.1, 0.0])]));
        let extractor = FixedExtractor {
            descriptor: Some(Descriptor::new(vec![0.0, 0.0])),
        };
        let result = service
            .match_capture(&extractor, Path::new("cap.jpg"))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.identity.as_deref(), Some("STU001"));
    }

    #[test]
    fn test_extraction_failure_is_soft_nonmatch() {
        let service = RecognitionService::new(0.45);
        service.activate(index_with(vec![("STU001", vec![0.1, 0.0])]));
        let extractor = FixedExtractor { descriptor: None };
        let result = service
            .match_capture(&extractor, Path::new("cap.jpg"))
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_no_index_is_hard_error() {
        let service = RecognitionService::new(0.45);
        let extractor = FixedExtractor {
            descriptor: Some(Descriptor::new(vec![0.0])),
        };
        let err = service
            .match_capture(&extractor, Path::new("cap.jpg"))
            .unwrap_err();
        assert!(matches!(err, MatchError::EmptyModel));
    }

    #[test]
    fn test_swap_replaces_index_for_new_queries() {
        let service = RecognitionService::new(0.45);
        service.activate(index_with(vec![("OLD001", vec![0.0, 0.0])]));

        // A reader holding the old Arc keeps a consistent view.
        let held = service.active().unwrap();
        service.activate(index_with(vec![("NEW001", vec![0.0, 0.0])]));
        assert_eq!(held.entries[0].identity, "OLD001");

        let extractor = FixedExtractor {
            descriptor: Some(Descriptor::new(vec![0.0, 0.0])),
        };
        let result = service
            .match_capture(&extractor, Path::new("cap.jpg"))
            .unwrap();
        assert_eq!(result.identity.as_deref(), Some("NEW001"));
    }

    fn activate_version(store: &mut Store, version: &str, snapshot_path: &Path) {
        store
            .activate_model_version(&ModelVersion {
                version: version.to_string(),
                snapshot_path: snapshot_path.to_string_lossy().into_owned(),
                sample_count: 1,
                identity_count: 1,
                build_seconds: 0.1,
                is_active: true,
                created_at: Utc::now(),
                notes: String::new(),
            })
            .unwrap();
    }

    #[test]
    fn test_load_active_rebuilds_index_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("rollcall.db")).unwrap();

        let entries = vec![IndexEntry {
            descriptor: Descriptor::new(vec![0.1, 0.0]),
            identity: "STU001".into(),
        }];
        let snapshot_path = dir.path().join("models/v1.json");
        ModelSnapshot::new("v1".into(), &entries, Utc::now())
            .write(&snapshot_path)
            .unwrap();
        activate_version(&mut store, "v1", &snapshot_path);

        // A fresh service (as after a restart) picks the snapshot back up.
        let service = RecognitionService::load_active(&store, 0.45);
        let status = service.status();
        assert!(status.loaded);
        assert_eq!(status.version.as_deref(), Some("v1"));
        assert_eq!(status.descriptor_count, 1);

        let extractor = FixedExtractor {
            descriptor: Some(Descriptor::new(vec![0.0, 0.0])),
        };
        let result = service
            .match_capture(&extractor, Path::new("cap.jpg"))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.identity.as_deref(), Some("STU001"));
    }

    #[test]
    fn test_load_active_without_version_starts_empty() {
        let store = Store::open_in_memory().unwrap();
        let service = RecognitionService::load_active(&store, 0.45);
        assert!(!service.status().loaded);
    }

    #[test]
    fn test_load_active_with_unreadable_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("rollcall.db")).unwrap();

        // Active version whose snapshot file was never written.
        activate_version(&mut store, "v1", &dir.path().join("models/missing.json"));
        assert!(!RecognitionService::load_active(&store, 0.45).status().loaded);

        // Truncated snapshot file.
        let broken = dir.path().join("models/broken.json");
        std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
        std::fs::write(&broken, b"{\"version\": \"v2\"").unwrap();
        activate_version(&mut store, "v2", &broken);
        assert!(!RecognitionService::load_active(&store, 0.45).status().loaded);
    }

    #[test]
    fn test_status_reports_counts() {
        let service = RecognitionService::new(0.45);
        assert!(!service.status().loaded);
        service.activate(index_with(vec![
            ("STU001", vec![0.0]),
            ("STU001", vec![0.1]),
            ("STU002", vec![0.2]),
        ]));
        let status = service.status();
        assert!(status.loaded);
        assert_eq!(status.descriptor_count, 3);
        assert_eq!(status.identity_count, 2);
        assert_eq!(status.version.as_deref(), Some("v-test"));
    }
}
