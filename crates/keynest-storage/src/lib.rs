//! Local blob storage for `KeyNest`.
//!
//! This crate defines the [`StorageBackend`] trait — a named-blob store that
//! knows nothing about credentials, encryption, or backups. The vault store in
//! `keynest-core` encrypts every blob before it reaches this layer, and the
//! file-backed remote adapter reuses the same trait for document storage.
//!
//! Three implementations are provided:
//!
//! - [`FileBackend`] — default, one file per blob with atomic replace
//! - [`RedbBackend`] — transactional single-file database (feature `redb-backend`)
//! - [`MemoryBackend`] — in-memory, for testing only

mod error;
mod file_backend;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use file_backend::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable named-blob storage backend.
///
/// Names are UTF-8 strings using `/` as a separator (e.g. `saved_passwords`,
/// `users/uid-42`). Values are opaque byte arrays.
///
/// `put` must be atomic: a concurrent or later `get` observes either the
/// previous value or the new one, never a partial write.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a blob by name.
    ///
    /// Returns `Ok(None)` if the blob does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a blob, atomically replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails. The
    /// previous value is left untouched in that case.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a blob. Deleting a missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all blob names that start with the given prefix, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a blob exists.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`. Backends may override this with a cheaper check.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
