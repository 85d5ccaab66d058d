//! Fault-injecting collaborators shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use keynest_storage::{MemoryBackend, StorageBackend, StorageError};

use crate::error::RemoteError;
use crate::remote::RemoteStore;

/// A [`MemoryBackend`] whose writes can be switched to fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StorageBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                key: key.to_owned(),
                reason: "disk full".to_owned(),
            });
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
}

/// An in-memory remote that counts calls and can be told to fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRemote {
    pub(crate) docs: MemoryBackend,
    pub(crate) writes: Arc<AtomicUsize>,
    pub(crate) fail_reads: Arc<AtomicBool>,
    pub(crate) fail_writes: Arc<AtomicBool>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteStore for FakeRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Read {
                key: key.to_owned(),
                reason: "connection reset".to_owned(),
            });
        }
        Ok(self.docs.get(key).await.unwrap_or(None))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Write {
                key: key.to_owned(),
                reason: "permission denied".to_owned(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.docs
            .put(key, value)
            .await
            .map_err(|e| RemoteError::Write {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.docs
            .delete(key)
            .await
            .map_err(|e| RemoteError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }
}
