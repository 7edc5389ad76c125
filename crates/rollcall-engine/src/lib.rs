//! Rollcall engine.
//!
//! Owns everything between raw uploads and attendance writes: the descriptor
//! cache, the serialized training worker, the atomically-swappable in-memory
//! index, progress reporting, and the enrollment/attendance coordinator.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod index;
pub mod progress;
pub mod trainer;

pub use cache::get_or_compute;
pub use config::Config;
pub use coordinator::{
    AttendanceResponse, Coordinator, CoordinatorError, EnrollmentReport, ModelStatus,
    TrainingSummary, UnmappedGroup,
};
pub use index::{FaceIndex, IndexStatus, RecognitionService};
pub use progress::{ProgressTracker, ProgressUpdate};
pub use trainer::{spawn_trainer, TrainError, TrainOutcome, TrainerHandle};
