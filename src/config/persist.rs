//! Durable JSON persistence helpers.
//!
//! Writes go through a temporary file in the target directory followed by a
//! rename, so a crash mid-write leaves the previous file intact. Files that
//! fail to parse are moved aside under a numbered `.bak` name instead of
//! being dropped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())?;
    Ok(())
}

/// Write `contents` to `path` via write-to-temporary-then-rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Load a JSON document.
///
/// - `Ok(None)` when the file does not exist.
/// - `Err(CorruptPersistedState)` when it exists but cannot be read or
///   parsed; the file has already been renamed aside at that point.
pub fn load_json_or_backup<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    if !path.exists() {
        return Ok(None);
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| serde_json::from_str::<T>(&contents).map_err(|e| e.to_string()));

    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(reason) => {
            match backup_corrupt_file(path) {
                Ok(backup) => log::info!("Corrupt file {} moved to {}", path.display(), backup.display()),
                Err(e) => log::warn!("Backup failed for {}: {}", path.display(), e),
            }
            Err(PipelineError::CorruptPersistedState {
                path: path.to_path_buf(),
                reason,
            })
        }
    }
}

/// First free backup name: `<file>.bak`, `<file>.bak1`, `<file>.bak2`, ...
pub fn backup_path_for(path: &Path) -> PathBuf {
    let with_suffix = |suffix: String| {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        path.with_file_name(name)
    };

    let mut candidate = with_suffix(".bak".to_string());
    let mut counter = 1u32;
    while candidate.exists() {
        candidate = with_suffix(format!(".bak{}", counter));
        counter += 1;
    }
    candidate
}

/// Rename `path` to its first free backup name and return that name.
pub fn backup_corrupt_file(path: &Path) -> std::io::Result<PathBuf> {
    let backup = backup_path_for(path);
    fs::rename(path, &backup)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        save_json_atomic(&path, &Doc { value: 1 }).unwrap();
        save_json_atomic(&path, &Doc { value: 2 }).unwrap();

        let loaded: Option<Doc> = load_json_or_backup(&path).unwrap();
        assert_eq!(loaded, Some(Doc { value: 2 }));

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Doc> = load_json_or_backup(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_backup_suffix_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        for expected in ["settings.json.bak", "settings.json.bak1", "settings.json.bak2"] {
            fs::write(&path, "{ not json").unwrap();
            let err = load_json_or_backup::<Doc>(&path).unwrap_err();
            assert!(matches!(err, PipelineError::CorruptPersistedState { .. }));
            assert!(!path.exists());
            assert_eq!(fs::read_to_string(dir.path().join(expected)).unwrap(), "{ not json");
        }
    }
}
