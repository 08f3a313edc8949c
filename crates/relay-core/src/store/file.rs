//! TOML-file marker store.
//!
//! The whole marker set is kept in memory and rewritten to disk after every
//! change.  The file looks like this:
//!
//! ```toml
//! [markers]
//! "session:0b6f4c8e-9a51-4c2e-8d7e-3f0f1c5e2a11" = "1"
//! ```
//!
//! Writes go to a sibling `*.tmp` file first and are then renamed over the
//! real file, so a crash mid-write leaves either the old or the new marker set
//! on disk, never a truncated one.
//!
//! An async mutex serialises writers; it is held across the file write so
//! two concurrent `put` calls cannot race their renames and drop a marker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{DurableStore, StoreError};

/// On-disk schema.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct MarkerFile {
    #[serde(default)]
    markers: BTreeMap<String, String>,
}

/// Marker store persisted to a TOML file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    markers: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading any markers a previous process left.
    ///
    /// A missing file is treated as an empty store (first run).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for file-system errors other than "not found",
    /// and [`StoreError::Parse`] if the TOML is malformed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let markers = match tokio::fs::read_to_string(&path).await {
            Ok(content) => toml::from_str::<MarkerFile>(&content)?.markers,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        debug!(
            "marker store opened at {} with {} existing marker(s)",
            path.display(),
            markers.len()
        );

        Ok(Self {
            path,
            markers: Mutex::new(markers),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of markers currently held.
    pub async fn len(&self) -> usize {
        self.markers.lock().await.len()
    }

    /// Writes `markers` to disk via a temporary file and an atomic rename.
    async fn persist(&self, markers: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let content = toml::to_string_pretty(&MarkerFile {
            markers: markers.clone(),
        })?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut markers = self.markers.lock().await;
        let previous = markers.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&markers).await {
            // Keep memory and disk in agreement: undo the in-memory change.
            match previous {
                Some(old) => markers.insert(key.to_string(), old),
                None => markers.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.markers.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut markers = self.markers.lock().await;
        let Some(previous) = markers.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&markers).await {
            markers.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_file_yields_empty_store() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");

        // Act
        let store = FileStore::open(&path).await.unwrap();

        // Assert
        assert_eq!(store.len().await, 0);
        assert!(!path.exists(), "opening must not create the file");
    }

    #[tokio::test]
    async fn test_markers_survive_reopen() {
        // Arrange: write a marker through one store instance
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");
        {
            let store = FileStore::open(&path).await.unwrap();
            store.put("session:abc", "1").await.unwrap();
        }

        // Act: a second instance (simulated restart) reads the same file
        let reopened = FileStore::open(&path).await.unwrap();

        // Assert
        assert_eq!(
            reopened.get("session:abc").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_delete_removes_marker_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");
        let store = FileStore::open(&path).await.unwrap();
        store.put("session:a", "1").await.unwrap();
        store.put("session:b", "1").await.unwrap();

        store.delete("session:a").await.unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        assert!(reopened.get("session:a").await.unwrap().is_none());
        assert!(reopened.get("session:b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_absent_key_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");
        let store = FileStore::open(&path).await.unwrap();

        store.delete("session:nope").await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("markers.toml");
        let store = FileStore::open(&path).await.unwrap();

        store.put("session:x", "1").await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let result = FileStore::open(&path).await;

        assert!(matches!(result, Err(StoreError::Parse(_))));
    }

    #[tokio::test]
    async fn test_file_content_uses_markers_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.toml");
        let store = FileStore::open(&path).await.unwrap();

        store.put("session:abc", "1").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[markers]"));
        assert!(content.contains("\"session:abc\" = \"1\""));
    }
}
