//! Identity resolution from dataset folder/file paths.
//!
//! Uploaded archives arrive with identity keys encoded in the folder
//! structure (`STU001/photo1.jpg`) or the filename (`stu_002_1.jpg`). This
//! heuristic recovers the key in a fixed priority order: directory components
//! outer-to-inner, then the immediate parent directory, then the filename
//! stem. Short or ambiguous names can resolve to the wrong identity — that is
//! a known accuracy limitation surfaced through the unmapped reporting path,
//! not validated away here.

use std::path::Path;

const MIN_KEY_LEN: usize = 3;
const MAX_KEY_LEN: usize = 20;

/// Resolve the candidate identity key for an image path inside an extracted
/// archive. Returns `None` when no component qualifies (unmapped).
pub fn resolve_identity(path: &Path, archive_root: Option<&Path>) -> Option<String> {
    let parent = path.parent();

    // 1. Directory components relative to the archive root, outer-to-inner.
    if let (Some(parent), Some(root)) = (parent, archive_root) {
        if let Ok(relative) = parent.strip_prefix(root) {
            for component in relative.components() {
                let name = component.as_os_str().to_string_lossy();
                if let Some(key) = normalize_component(&name) {
                    tracing::debug!(key = %key, path = %path.display(), "identity from folder");
                    return Some(key);
                }
            }
        }
    }

    // 2. Immediate parent directory name under the same rule.
    if let Some(name) = parent.and_then(|p| p.file_name()) {
        if let Some(key) = normalize_component(&name.to_string_lossy()) {
            tracing::debug!(key = %key, path = %path.display(), "identity from parent dir");
            return Some(key);
        }
    }

    // 3. Filename stem.
    let stem = path.file_stem()?.to_string_lossy();
    if let Some(key) = resolve_from_stem(&stem) {
        tracing::debug!(key = %key, path = %path.display(), "identity from filename");
        return Some(key);
    }

    tracing::warn!(path = %path.display(), "could not resolve identity from path");
    None
}

/// Normalize a directory component and accept it as an identity key if it is
/// 3–20 characters and alphanumeric after stripping `_`/`-`.
fn normalize_component(raw: &str) -> Option<String> {
    let clean: String = raw.trim().to_uppercase().replace(' ', "_");
    if clean.len() < MIN_KEY_LEN || clean.len() > MAX_KEY_LEN {
        return None;
    }
    let stripped: String = clean.chars().filter(|c| *c != '_' && *c != '-').collect();
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_alphanumeric()) {
        return None;
    }
    Some(clean)
}

/// Derive an identity key from a filename stem. Trailing `_N` suffixes are
/// the common "photo index" convention (`STU001_1.jpg`), so the stem is split
/// on `_` and the leading segment(s) taken.
fn resolve_from_stem(stem: &str) -> Option<String> {
    if stem.contains('_') {
        let parts: Vec<&str> = stem.split('_').collect();
        if parts[0].len() > MIN_KEY_LEN {
            return Some(parts[0].to_uppercase());
        }
        if parts.len() >= 2 {
            let joined = format!("{}_{}", parts[0], parts[1]);
            if joined.len() >= MIN_KEY_LEN {
                return Some(joined.to_uppercase());
            }
        }
        None
    } else if stem.len() >= MIN_KEY_LEN {
        Some(stem.to_uppercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn resolve(path: &str, root: Option<&str>) -> Option<String> {
        resolve_identity(&PathBuf::from(path), root.map(Path::new))
    }

    #[test]
    fn test_identity_from_folder() {
        assert_eq!(
            resolve("/tmp/ds/STU001/photo1.jpg", Some("/tmp/ds")),
            Some("STU001".to_string())
        );
    }

    #[test]
    fn test_identity_from_nested_folder_outermost_wins() {
        assert_eq!(
            resolve("/tmp/ds/GRADE5/STU009/a.jpg", Some("/tmp/ds")),
            Some("GRADE5".to_string())
        );
    }

    #[test]
    fn test_folder_with_spaces_normalized() {
        assert_eq!(
            resolve("/tmp/ds/stu 001/a.jpg", Some("/tmp/ds")),
            Some("STU_001".to_string())
        );
    }

    #[test]
    fn test_root_level_file_takes_extraction_dir_name() {
        // A file directly under the archive root has the extraction
        // directory as its parent, so the archive stem becomes the key.
        assert_eq!(
            resolve("/tmp/scratch/batch/xy.jpg", Some("/tmp/scratch/batch")),
            Some("BATCH".to_string())
        );
    }

    #[test]
    fn test_parent_dir_fallback_without_root() {
        assert_eq!(
            resolve("/anywhere/STU003/pic.jpg", None),
            Some("STU003".to_string())
        );
    }

    #[test]
    fn test_filename_prefix_with_index_suffix() {
        // Parent dirs here are too long to qualify as keys.
        assert_eq!(
            resolve("stu_002_1.jpg", None),
            Some("STU_002".to_string())
        );
    }

    #[test]
    fn test_long_filename_prefix() {
        assert_eq!(resolve("STU0004_2.jpg", None), Some("STU0004".to_string()));
    }

    #[test]
    fn test_plain_filename_stem() {
        assert_eq!(resolve("stu005.png", None), Some("STU005".to_string()));
    }

    #[test]
    fn test_short_stem_unresolved() {
        assert_eq!(resolve("ab.jpg", None), None);
    }

    #[test]
    fn test_punctuation_only_folder_rejected() {
        assert_eq!(resolve("/tmp/ds/___/ab.jpg", Some("/tmp/ds")), None);
    }

    #[test]
    fn test_too_long_folder_rejected_falls_to_filename() {
        assert_eq!(
            resolve(
                "/tmp/ds/a_very_long_folder_name_over_twenty/STU7.jpg",
                Some("/tmp/ds")
            ),
            Some("STU7".to_string())
        );
    }
}
