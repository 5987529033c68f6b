use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::TokenStorage;
use crate::error::StorageError;

/// Storage kept in a single JSON object on disk.
///
/// Every entry is held in memory and the whole document is rewritten after
/// each change, so a `set` or `remove` only returns once the file is updated.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStorage {
    /// Open the store at `path`; a missing file is an empty store
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                error!(path = %path.display(), error = %e, "Token storage file is not a JSON object of strings");
                StorageError::corrupt(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No token storage file yet");
                BTreeMap::new()
            }
            Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened token storage file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document through a temporary file so a crash never leaves half a file
    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let display = self.path.display().to_string();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
        }

        let contents =
            serde_json::to_string_pretty(entries).map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents)
            .await
            .map_err(|e| StorageError::io(tmp.display().to_string(), e))?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            match fs::remove_file(&tmp).await {
                Ok(()) => debug!(path = %tmp.display(), "Removed temporary storage file"),
                Err(cleanup) => warn!(
                    path = %tmp.display(),
                    error = %cleanup,
                    "Could not remove temporary storage file"
                ),
            }
            return Err(StorageError::io(display, e));
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStorage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.flush(&entries).await {
            // Keep memory in line with what is on disk
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.flush(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::open(dir.path().join("auth.json")).await.unwrap();
        assert_eq!(storage.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.json");

        {
            let storage = JsonFileStorage::open(&path).await.unwrap();
            storage.set("a", "1".to_string()).await.unwrap();
            storage.set("b", r#"{"name":"a"}"#.to_string()).await.unwrap();
            storage.remove("a").await.unwrap();
        }

        let reopened = JsonFileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(
            reopened.get("b").await.unwrap().as_deref(),
            Some(r#"{"name":"a"}"#)
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = JsonFileStorage::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let storage = JsonFileStorage::open(&path).await.unwrap();

        // A directory now sits where the document should go
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        let err = storage.set("a", "1".to_string()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(!dir.path().join("auth.json.tmp").exists());
        assert_eq!(storage.get("a").await.unwrap(), None);
    }
}
