//! Task progress reporting with a bounded TTL.
//!
//! Callers hand long-running operations a task id and poll it for
//! `(percent, message)` updates. Entries expire after the configured TTL and
//! are pruned lazily on access.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub message: String,
}

struct Entry {
    update: ProgressUpdate,
    updated_at: Instant,
}

pub struct ProgressTracker {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ProgressTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn update(&self, task_id: &str, percent: u8, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(task = task_id, percent, message = %message, "progress");
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.updated_at) < self.ttl);
        entries.insert(
            task_id.to_string(),
            Entry {
                update: ProgressUpdate {
                    percent: percent.min(100),
                    message,
                },
                updated_at: now,
            },
        );
    }

    pub fn get(&self, task_id: &str) -> Option<ProgressUpdate> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.updated_at) < self.ttl);
        entries.get(task_id).map(|e| e.update.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_read() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));
        tracker.update("task-1", 40, "Validating images...");
        let update = tracker.get("task-1").unwrap();
        assert_eq!(update.percent, 40);
        assert_eq!(update.message, "Validating images...");
        assert!(tracker.get("task-2").is_none());
    }

    #[test]
    fn test_percent_capped_at_100() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));
        tracker.update("task-1", 150, "done");
        assert_eq!(tracker.get("task-1").unwrap().percent, 100);
    }

    #[test]
    fn test_expired_entries_pruned() {
        let tracker = ProgressTracker::new(Duration::from_millis(10));
        tracker.update("task-1", 10, "started");
        std::thread::sleep(Duration::from_millis(25));
        assert!(tracker.get("task-1").is_none());
    }
}
