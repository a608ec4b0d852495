//! Wholesale binary snapshots for the in-memory backend.
//!
//! The entire `uid -> record` map is rewritten as one bincode blob on
//! shutdown and loaded back in one piece on startup. There is no
//! incremental log: a crash between snapshots loses every write since the
//! last one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use portal_core::{Result, StorageError};

use crate::memory::UrlEntry;

/// Resolves the configured path to a concrete file name: a directory (or
/// a path ending in `/`) gets `storage` appended.
fn snapshot_file(path: &str) -> PathBuf {
    if path.ends_with('/') {
        return Path::new(path).join("storage");
    }

    let path = Path::new(path);
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => path.join("storage"),
        _ => path.to_path_buf(),
    }
}

pub(crate) fn load(path: &str) -> Result<HashMap<String, UrlEntry>> {
    let bytes = fs::read(snapshot_file(path))
        .map_err(|err| StorageError::Snapshot(format!("failed to open snapshot: {err}")))?;

    bincode::deserialize(&bytes)
        .map_err(|err| StorageError::Snapshot(format!("failed to decode snapshot: {err}")))
}

pub(crate) fn save(path: &str, urls: &HashMap<String, UrlEntry>) -> Result<()> {
    let bytes = bincode::serialize(urls)
        .map_err(|err| StorageError::Snapshot(format!("failed to encode snapshot: {err}")))?;

    fs::write(snapshot_file(path), bytes)
        .map_err(|err| StorageError::Snapshot(format!("failed to write snapshot: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;

    fn entry(long_url: &str) -> UrlEntry {
        UrlEntry {
            long_url: long_url.to_string(),
            created_at: Timestamp::now(),
            correlation_id: String::new(),
            statistics: 7,
            removed: false,
        }
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap").to_string_lossy().into_owned();

        let mut urls = HashMap::new();
        urls.insert("Ab3Xy".to_string(), entry("http://example.com"));

        save(&path, &urls).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["Ab3Xy"].long_url, "http://example.com");
        assert_eq!(loaded["Ab3Xy"].statistics, 7);
    }

    #[test]
    fn directory_path_gets_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();

        save(&path, &HashMap::new()).unwrap();
        assert!(dir.path().join("storage").exists());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load("/nonexistent/snapshot").unwrap_err();
        assert!(matches!(err, StorageError::Snapshot(_)));
    }
}
