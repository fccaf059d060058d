//! Key-value storage backends for the cache
//!
//! The cache only needs a durable string-keyed map. [`KeyValueStore`] is the
//! seam; [`MemoryStore`] keeps everything in process and [`FileStore`]
//! persists a single JSON document in the XDG cache directory
//! (`~/.cache/cardex/store.json` on Linux).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// File name of the persisted store inside the cache directory
const STORE_FILE_NAME: &str = "store.json";

/// Errors raised by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted document could not be (de)serialized
    #[error("Store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Durable string-keyed storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value; `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes (or overwrites) a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes a key; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Removes several keys in one operation
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Removes every key
    async fn clear(&self) -> Result<(), StoreError>;

    /// Lists every stored key
    async fn all_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-process store backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Store persisted as one JSON object on disk
///
/// The document is loaded on first use and rewritten after every mutation.
/// A corrupt document is logged and replaced by an empty one, since
/// everything kept here can be fetched again.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Creates a FileStore in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "cardex")?;
        Some(Self::in_dir(project_dirs.cache_dir()))
    }

    /// Creates a FileStore keeping its document in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::at_path(dir.join(STORE_FILE_NAME))
    }

    /// Creates a FileStore backed by the given file
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding corrupt store file");
                Ok(BTreeMap::new())
            }
        }
    }

    /// Writes the document to a sibling temp file and renames it over the
    /// store file, so a crash mid-write never leaves a truncated document
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(entries)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, json).await?;

        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| STORE_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Runs `f` against the loaded document without changing it
    async fn read_entries<R>(
        &self,
        f: impl FnOnce(&BTreeMap<String, String>) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard
            .as_ref()
            .ok_or_else(|| StoreError::Backend("store document not loaded".to_string()))?;
        Ok(f(entries))
    }

    /// Applies `f` to a copy of the document and persists it when `f`
    /// reports a change
    ///
    /// The in-memory document is replaced only after the copy reached disk,
    /// so a failed write leaves no trace for later reads.
    async fn update_entries<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (R, bool),
    ) -> Result<R, StoreError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard
            .as_mut()
            .ok_or_else(|| StoreError::Backend("store document not loaded".to_string()))?;

        let mut draft = entries.clone();
        let (result, changed) = f(&mut draft);
        if changed {
            self.persist(&draft).await?;
            *entries = draft;
        }
        Ok(result)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read_entries(|entries| entries.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update_entries(|entries| ((), entries.remove(key).is_some()))
            .await
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError> {
        self.update_entries(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(key);
            }
            ((), entries.len() != before)
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update_entries(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            ((), changed)
        })
        .await
    }

    async fn all_keys(&self) -> Result<Vec<String>, StoreError> {
        self.read_entries(|entries| entries.keys().cloned().collect())
            .await
    }
}
