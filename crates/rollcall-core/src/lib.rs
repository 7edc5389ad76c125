//! Rollcall core — leaf types and pure logic for the biometric attendance
//! pipeline: face descriptors, the external extractor boundary, the
//! folder/filename identity resolver, and nearest-neighbor matching.

pub mod extractor;
pub mod matcher;
pub mod resolver;
pub mod types;

pub use extractor::{ExtractionError, FeatureExtractor};
pub use matcher::{IndexEntry, MatchError, Matcher, NearestMatcher, DEFAULT_TOLERANCE};
pub use resolver::resolve_identity;
pub use types::{AttendanceRecord, Descriptor, FaceSample, Identity, MatchResult, ModelVersion};
