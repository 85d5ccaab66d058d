//! Remote document store capability and the backup document layout.
//!
//! A backup is one JSON document per principal, stored at
//! `<collection>/<principal id>`, holding the base64 blob text as a single
//! string field:
//!
//! ```json
//! {"passwords":"<base64 nonce || ciphertext || tag>"}
//! ```

use std::sync::Arc;

use keynest_storage::{StorageBackend, StorageError};
use serde_json::{Map, Value};

use crate::error::{Corruption, RemoteError};

/// Point-lookup document storage keyed by string.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch a document. `Ok(None)` means no such document.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Read`] on transport or permission failure.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Create or replace a document.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Write`] on transport or permission failure.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RemoteError>;

    /// Delete a document. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Delete`] on transport or permission failure.
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;
}

/// Where backups live in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    /// Collection (key prefix) holding one document per principal.
    pub collection: String,
    /// Document field holding the blob text.
    pub field: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            collection: "users".to_owned(),
            field: "passwords".to_owned(),
        }
    }
}

impl RemoteLayout {
    /// Document key for a principal.
    #[must_use]
    pub fn document_key(&self, principal_id: &str) -> String {
        format!("{}/{principal_id}", self.collection)
    }

    /// Wrap blob text in a backup document.
    #[must_use]
    pub fn encode_document(&self, blob_text: &str) -> Vec<u8> {
        let mut doc = Map::new();
        doc.insert(self.field.clone(), Value::String(blob_text.to_owned()));
        Value::Object(doc).to_string().into_bytes()
    }

    /// Extract blob text from a backup document.
    ///
    /// A document without the field (or with `null`) holds no backup and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Corruption::Document`] if the bytes are not a JSON object or
    /// the field is not a string.
    pub fn decode_document(&self, bytes: &[u8]) -> Result<Option<String>, Corruption> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| Corruption::Document {
            reason: e.to_string(),
        })?;
        let Value::Object(mut doc) = value else {
            return Err(Corruption::Document {
                reason: "document is not a JSON object".to_owned(),
            });
        };

        match doc.remove(&self.field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text)),
            Some(other) => Err(Corruption::Document {
                reason: format!("field '{}' is not a string: {other}", self.field),
            }),
        }
    }
}

/// A [`RemoteStore`] over any [`StorageBackend`], e.g. a directory standing
/// in for a document service, or memory in tests.
#[derive(Clone)]
pub struct StorageRemote {
    backend: Arc<dyn StorageBackend>,
}

impl StorageRemote {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }
}

impl std::fmt::Debug for StorageRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRemote").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RemoteStore for StorageRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.backend
            .get(key)
            .await
            .map_err(|e: StorageError| RemoteError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RemoteError> {
        self.backend
            .put(key, value)
            .await
            .map_err(|e| RemoteError::Write {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.backend
            .delete(key)
            .await
            .map_err(|e| RemoteError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keynest_storage::MemoryBackend;

    use super::*;

    #[test]
    fn document_key_uses_collection() {
        assert_eq!(RemoteLayout::default().document_key("uid-42"), "users/uid-42");
    }

    #[test]
    fn document_roundtrip() {
        let layout = RemoteLayout::default();
        let doc = layout.encode_document("QUJD");
        assert_eq!(doc, br#"{"passwords":"QUJD"}"#);
        assert_eq!(layout.decode_document(&doc).unwrap(), Some("QUJD".to_owned()));
    }

    #[test]
    fn document_without_field_holds_no_backup() {
        let layout = RemoteLayout::default();
        assert_eq!(layout.decode_document(br#"{"other":"x"}"#).unwrap(), None);
        assert_eq!(layout.decode_document(br#"{"passwords":null}"#).unwrap(), None);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let layout = RemoteLayout::default();
        for bytes in [&b"not json"[..], br#"["passwords"]"#, br#"{"passwords":42}"#] {
            assert!(matches!(
                layout.decode_document(bytes),
                Err(Corruption::Document { .. })
            ));
        }
    }

    #[tokio::test]
    async fn storage_remote_delegates_to_backend() {
        let backend = MemoryBackend::new();
        let remote = StorageRemote::new(Arc::new(backend.clone()));

        remote.put("users/uid-42", b"doc").await.unwrap();
        assert_eq!(backend.get("users/uid-42").await.unwrap(), Some(b"doc".to_vec()));
        assert_eq!(remote.get("users/uid-42").await.unwrap(), Some(b"doc".to_vec()));

        remote.delete("users/uid-42").await.unwrap();
        assert_eq!(remote.get("users/uid-42").await.unwrap(), None);
    }
}
