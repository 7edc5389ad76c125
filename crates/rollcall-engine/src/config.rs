use rollcall_core::DEFAULT_TOLERANCE;
use std::path::PathBuf;

/// Engine configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory; all other paths default to subdirectories of it.
    pub data_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory for stored training face images.
    pub faces_dir: PathBuf,
    /// Directory for attendance capture images (audit trail).
    pub captures_dir: PathBuf,
    /// Directory for unrecognized captures awaiting manual review.
    pub review_dir: PathBuf,
    /// Directory for model snapshot files.
    pub model_dir: PathBuf,
    /// Scratch directory for archive extraction.
    pub scratch_dir: PathBuf,
    /// Maximum acceptable descriptor distance for a positive match.
    pub tolerance: f32,
    /// Seconds a progress entry stays readable after its last update.
    pub progress_ttl_secs: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share/rollcall")
            });
        Self::with_data_dir(data_dir)
    }

    /// Build a config rooted at `data_dir`, honoring per-path overrides.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let sub = |var: &str, default: &str| {
            std::env::var(var)
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join(default))
        };
        Self {
            db_path: sub("ROLLCALL_DB_PATH", "rollcall.db"),
            faces_dir: sub("ROLLCALL_FACES_DIR", "media/faces"),
            captures_dir: sub("ROLLCALL_CAPTURES_DIR", "media/captures"),
            review_dir: sub("ROLLCALL_REVIEW_DIR", "media/review"),
            model_dir: sub("ROLLCALL_MODEL_DIR", "models"),
            scratch_dir: sub("ROLLCALL_SCRATCH_DIR", "scratch"),
            tolerance: env_f32("ROLLCALL_TOLERANCE", DEFAULT_TOLERANCE),
            progress_ttl_secs: env_u64("ROLLCALL_PROGRESS_TTL_SECS", 300),
            data_dir,
        }
    }

    /// Create every directory the engine writes to.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.faces_dir,
            &self.captures_dir,
            &self.review_dir,
            &self.model_dir,
            &self.scratch_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_data_dir() {
        let config = Config::with_data_dir(PathBuf::from("/srv/rollcall"));
        assert_eq!(config.db_path, PathBuf::from("/srv/rollcall/rollcall.db"));
        assert_eq!(config.model_dir, PathBuf::from("/srv/rollcall/models"));
        assert_eq!(config.faces_dir, PathBuf::from("/srv/rollcall/media/faces"));
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().join("data"));
        config.ensure_dirs().unwrap();
        assert!(config.scratch_dir.is_dir());
        assert!(config.review_dir.is_dir());
    }
}
