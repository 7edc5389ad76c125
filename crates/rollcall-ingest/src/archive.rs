//! Archive extraction into an isolated scratch directory.

use crate::IngestError;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// Extract `archive` into `scratch_root/<archive stem>`, replacing any
/// previous extraction of the same archive name. Returns the extraction root.
///
/// A corrupt archive fails before anything is written; entry names are
/// checked against path traversal so no file can land outside the root.
pub fn extract_archive(archive: &Path, scratch_root: &Path) -> Result<PathBuf, IngestError> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let extract_root = scratch_root.join(stem);

    let file = fs::File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| IngestError::ArchiveCorrupt(e.to_string()))?;

    if extract_root.exists() {
        fs::remove_dir_all(&extract_root)?;
    }
    fs::create_dir_all(&extract_root)?;

    tracing::info!(
        archive = %archive.display(),
        root = %extract_root.display(),
        entries = zip.len(),
        "extracting dataset archive"
    );

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| IngestError::ArchiveCorrupt(e.to_string()))?;
        let name = entry.name().to_string();
        let relative = sanitize_entry_path(&name)
            .ok_or_else(|| IngestError::UnsafeEntryPath(name.clone()))?;
        let target = extract_root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(extract_root)
}

/// Reject absolute paths and `..` components in archive entry names.
fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("dataset.zip");
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_extract_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = make_zip(
            dir.path(),
            &[
                ("STU001/photo1.jpg", b"img1" as &[u8]),
                ("STU001/photo2.jpg", b"img2"),
                ("notes.txt", b"hello"),
            ],
        );
        let scratch = dir.path().join("scratch");
        let root = extract_archive(&zip_path, &scratch).unwrap();
        assert_eq!(root, scratch.join("dataset"));
        assert!(root.join("STU001/photo1.jpg").exists());
        assert!(root.join("notes.txt").exists());
    }

    #[test]
    fn test_reextraction_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");

        let zip_path = make_zip(dir.path(), &[("old/a.jpg", b"a" as &[u8])]);
        let root = extract_archive(&zip_path, &scratch).unwrap();
        assert!(root.join("old/a.jpg").exists());

        fs::remove_file(&zip_path).unwrap();
        let zip_path = make_zip(dir.path(), &[("new/b.jpg", b"b" as &[u8])]);
        let root = extract_archive(&zip_path, &scratch).unwrap();
        assert!(root.join("new/b.jpg").exists());
        assert!(!root.join("old").exists());
    }

    #[test]
    fn test_corrupt_archive_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.zip");
        fs::write(&bogus, b"this is not a zip file").unwrap();
        let err = extract_archive(&bogus, &dir.path().join("scratch")).unwrap_err();
        assert!(matches!(err, IngestError::ArchiveCorrupt(_)));
        // Nothing was extracted.
        assert!(!dir.path().join("scratch").join("broken").exists());
    }

    #[test]
    fn test_traversal_entry_rejected() {
        assert!(sanitize_entry_path("../evil.jpg").is_none());
        assert!(sanitize_entry_path("/abs/evil.jpg").is_none());
        assert_eq!(
            sanitize_entry_path("./a/b.jpg"),
            Some(PathBuf::from("a/b.jpg"))
        );
    }
}
