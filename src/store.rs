use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes, max {max}")]
    ValueTooLarge { size: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StoreError::InvalidKey {
            key: key.chars().take(50).collect::<String>() + "...",
            reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
        });
    }
    if key.contains('\0') {
        return Err(StoreError::InvalidKey {
            key: key.replace('\0', "\\0"),
            reason: "key cannot contain null bytes".to_string(),
        });
    }
    if key.contains("..") || key.contains('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot contain path separators or traversal sequences".to_string(),
        });
    }
    Ok(())
}

/// Durable key/value contract used to snapshot the queue and its runtime
/// configuration. Values are string-serialized JSON; the platform shell
/// decides where they actually live.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. The default for tests and for hosts that persist through
/// their own mechanism.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.items.lock().await.remove(key);
        Ok(())
    }
}

/// File-backed store, one file per key under a directory. Writes go through a
/// temp file and rename so a crash never leaves a half-written snapshot.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn write_atomic(path: &Path, value: &str) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Self::write_atomic(&self.path_for(key), value)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();

        assert!(store.get_item("queue").await.unwrap().is_none());

        store.set_item("queue", r#"{"actions":[]}"#).await.unwrap();
        assert_eq!(
            store.get_item("queue").await.unwrap().as_deref(),
            Some(r#"{"actions":[]}"#)
        );

        store.remove_item("queue").await.unwrap();
        assert!(store.get_item("queue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn key_validation_rejects_bad_keys() {
        let store = MemoryStore::new();

        assert!(store.get_item("").await.is_err());
        assert!(store.get_item("   ").await.is_err());
        assert!(store.set_item("a/b", "v").await.is_err());
        assert!(store.set_item("..", "v").await.is_err());
        assert!(store.set_item(&"k".repeat(513), "v").await.is_err());
    }

    #[tokio::test]
    async fn oversized_value_rejected() {
        let store = MemoryStore::new();
        let huge = "x".repeat(MAX_VALUE_SIZE + 1);
        let result = store.set_item("queue", &huge).await;
        assert!(matches!(result, Err(StoreError::ValueTooLarge { .. })));
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set_item("queue", r#"{"n":1}"#).await.unwrap();
        assert_eq!(
            store.get_item("queue").await.unwrap().as_deref(),
            Some(r#"{"n":1}"#)
        );

        store.remove_item("queue").await.unwrap();
        assert!(store.get_item("queue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_overwrite_leaves_no_tmp() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.set_item("queue", "first").await.unwrap();
        store.set_item("queue", "second").await.unwrap();

        assert_eq!(
            store.get_item("queue").await.unwrap().as_deref(),
            Some("second")
        );
        assert!(!dir.path().join("queue.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.get_item("nonexistent").await.unwrap().is_none());
    }
}
