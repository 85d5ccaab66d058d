//! In-memory storage backend for tests.
//!
//! Blobs live in a `BTreeMap` behind a `RwLock` and vanish when the process
//! exits. Clones share the same map, so a test can hand one clone to the
//! engine and inspect the other.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory named-blob store.
///
/// # Examples
///
/// ```
/// # use keynest_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("saved_passwords", b"blob").await.unwrap();
/// let val = backend.get("saved_passwords").await.unwrap();
/// assert_eq!(val, Some(b"blob".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the backend holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut blobs = self.blobs.write().await;
        blobs.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let blobs = self.blobs.read().await;
        let keys = blobs
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_blob_is_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("saved_passwords").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_replaces_previous_value() {
        let backend = MemoryBackend::new();
        backend.put("saved_passwords", b"v1").await.unwrap();
        backend.put("saved_passwords", b"v2").await.unwrap();
        assert_eq!(
            backend.get("saved_passwords").await.unwrap(),
            Some(b"v2".to_vec())
        );
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let backend = MemoryBackend::new();
        backend.delete("nope").await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let backend = MemoryBackend::new();
        backend.put("users/a", b"1").await.unwrap();
        backend.put("users/b", b"2").await.unwrap();
        backend.put("settings", b"3").await.unwrap();

        let keys = backend.list("users/").await.unwrap();
        assert_eq!(keys, vec!["users/a", "users/b"]);
    }

    #[tokio::test]
    async fn clones_share_blobs() {
        let backend = MemoryBackend::new();
        let observer = backend.clone();
        backend.put("saved_passwords", b"blob").await.unwrap();
        assert!(observer.exists("saved_passwords").await.unwrap());
    }
}
