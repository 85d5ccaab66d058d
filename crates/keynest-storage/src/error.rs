//! Storage error types.
//!
//! Every variant names the blob or path involved so a failure can be traced
//! without a debugger.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or create the storage location.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read a blob.
    #[error("failed to read blob '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Failed to write a blob.
    #[error("failed to write blob '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Failed to delete a blob.
    #[error("failed to delete blob '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// Failed to list blobs with the given prefix.
    #[error("failed to list blobs with prefix '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A blob name was rejected (empty, absolute, or escaping the root).
    #[error("invalid blob name '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}
