//! Flat key-value storage
//!
//! The whole store is one JSON object persisted at
//! `<data-dir>/storage.json`. Writes go through a temp file in the same
//! directory and are renamed into place, so a crash mid-write leaves the
//! previous blob intact. Subscribers get a [`ChangeNotice`] for every
//! committed write.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage blob at {path} is not a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("failed to replace storage blob: {0}")]
    Persist(std::io::Error),
}

/// A committed change to one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Key-value store backed by a single JSON file.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<KvInner>,
}

struct KvInner {
    path: PathBuf,
    blob: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl KvStore {
    /// Open or create a store at the specified path.
    ///
    /// A missing file starts empty. An unreadable or non-object file is an
    /// error; the caller decides whether to surface or recover, the store
    /// never silently discards user data.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let blob = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&contents)? {
                Value::Object(map) => map,
                _ => return Err(StoreError::NotAnObject { path }),
            }
        } else {
            Map::new()
        };

        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            inner: Arc::new(KvInner {
                path,
                blob: RwLock::new(blob),
                changes,
            }),
        })
    }

    /// Open the store in the default location (`<data-dir>/storage.json`).
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(crate::util::storage_path())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Current value for a key, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.blob.read().get(key).cloned()
    }

    /// Current value for a key, deserialized.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Set a key, persist the blob, then notify subscribers.
    ///
    /// The disk write happens before the in-memory commit: if it fails the
    /// store still holds the old value and no notice is sent.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut blob = self.inner.blob.write();
        let old_value = blob.get(key).cloned();

        let mut candidate = blob.clone();
        candidate.insert(key.to_string(), value.clone());
        self.write_blob(&candidate)?;

        *blob = candidate;
        drop(blob);

        let _ = self.inner.changes.send(ChangeNotice {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    /// Remove a key, persist the blob, then notify subscribers.
    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut blob = self.inner.blob.write();
        let Some(old_value) = blob.get(key).cloned() else {
            return Ok(());
        };

        let mut candidate = blob.clone();
        candidate.remove(key);
        self.write_blob(&candidate)?;

        *blob = candidate;
        drop(blob);

        let _ = self.inner.changes.send(ChangeNotice {
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
        });
        Ok(())
    }

    /// Subscribe to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.inner.changes.subscribe()
    }

    fn write_blob(&self, blob: &Map<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(blob)?;
        let parent = self
            .inner
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.inner.path)
            .map_err(|e| StoreError::Persist(e.error))?;
        Ok(())
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("path", &self.inner.path)
            .finish()
    }
}
