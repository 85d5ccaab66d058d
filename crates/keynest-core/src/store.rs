//! Encrypted local vault store.
//!
//! The whole vault is kept as one blob: codec-encoded, sealed with the
//! principal's key, and written as base64 text under a fixed name. Atomic
//! replacement is delegated to the [`StorageBackend`], so a failed or
//! cancelled save leaves the previous blob readable.

use std::sync::Arc;

use keynest_storage::StorageBackend;
use tracing::{debug, warn};

use crate::codec;
use crate::crypto::{self, EncryptionKey};
use crate::error::{CryptoError, Corruption, StoreError};
use crate::model::Vault;

/// Blob name used when the host does not pick one.
pub const DEFAULT_BLOB_NAME: &str = "saved_passwords";

/// Prefix of per-principal blob names, `vaults/<principal id>`.
pub const PRINCIPAL_BLOB_PREFIX: &str = "vaults";

/// Result of a lenient load: the vault to use plus the error that forced a
/// fallback, if any.
#[derive(Debug)]
pub struct LoadOutcome {
    pub vault: Vault,
    pub error: Option<StoreError>,
}

/// Reads and writes one principal's encrypted vault blob.
#[derive(Clone)]
pub struct VaultStore {
    backend: Arc<dyn StorageBackend>,
    name: String,
}

impl VaultStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_name(backend, DEFAULT_BLOB_NAME)
    }

    #[must_use]
    pub fn with_name(backend: Arc<dyn StorageBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    /// A store whose blob belongs to one principal, so several accounts can
    /// share a backend.
    #[must_use]
    pub fn for_principal(backend: Arc<dyn StorageBackend>, principal_id: &str) -> Self {
        Self::with_name(backend, format!("{PRINCIPAL_BLOB_PREFIX}/{principal_id}"))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load and decrypt the vault. A missing blob is an empty vault.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CorruptStore`] if a blob exists but does not decrypt
    ///   or decode under `key`.
    /// - [`StoreError::Storage`] if the backend read fails.
    pub async fn load(&self, key: &EncryptionKey) -> Result<Vault, StoreError> {
        let Some(raw) = self.backend.get(&self.name).await? else {
            debug!(blob = %self.name, "no local vault yet");
            return Ok(Vault::new());
        };

        let vault = open_blob(key, &raw).map_err(|cause| StoreError::CorruptStore {
            name: self.name.clone(),
            cause,
        })?;
        debug!(blob = %self.name, entries = vault.len(), "local vault loaded");
        Ok(vault)
    }

    /// Load the vault, falling back to an empty one on any failure.
    ///
    /// The failure is logged and returned in [`LoadOutcome::error`] so the
    /// host can tell the user; the vault can be repopulated by a restore.
    pub async fn load_or_empty(&self, key: &EncryptionKey) -> LoadOutcome {
        match self.load(key).await {
            Ok(vault) => LoadOutcome { vault, error: None },
            Err(error) => {
                warn!(blob = %self.name, error = %error, "local vault unusable, starting empty");
                LoadOutcome {
                    vault: Vault::new(),
                    error: Some(error),
                }
            }
        }
    }

    /// Encrypt and persist the vault, replacing the previous blob.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Seal`] if encoding or encryption fails.
    /// - [`StoreError::Storage`] if the write fails; the old blob is kept.
    pub async fn save(&self, vault: &Vault, key: &EncryptionKey) -> Result<(), StoreError> {
        let text = seal_vault(key, vault).map_err(StoreError::Seal)?;
        self.backend.put(&self.name, text.as_bytes()).await?;
        debug!(blob = %self.name, entries = vault.len(), "local vault saved");
        Ok(())
    }

    /// Remove the local blob. Removing a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend delete fails.
    pub async fn delete(&self) -> Result<(), StoreError> {
        self.backend.delete(&self.name).await?;
        debug!(blob = %self.name, "local vault deleted");
        Ok(())
    }
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Encode and encrypt a vault into base64 blob text.
pub(crate) fn seal_vault(key: &EncryptionKey, vault: &Vault) -> Result<String, Corruption> {
    let plaintext = codec::encode(vault)?;
    Ok(crypto::seal_to_text(key, &plaintext)?)
}

/// Decrypt and decode blob text (as raw bytes) into a vault.
pub(crate) fn open_blob(key: &EncryptionKey, raw: &[u8]) -> Result<Vault, Corruption> {
    let text = std::str::from_utf8(raw).map_err(|e| CryptoError::MalformedInput {
        reason: format!("blob is not text: {e}"),
    })?;
    let plaintext = crypto::open_from_text(key, text)?;
    Ok(codec::decode(&plaintext)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keynest_storage::MemoryBackend;

    use super::*;
    use crate::crypto::derive_key;
    use crate::model::CredentialEntry;
    use crate::test_support::FlakyBackend;

    fn sample() -> Vault {
        Vault::from(vec![
            CredentialEntry::new("Mail", "bob", "X"),
            CredentialEntry::new("Bank", "bob", "Z"),
        ])
    }

    #[tokio::test]
    async fn missing_blob_loads_empty() {
        let store = VaultStore::new(Arc::new(MemoryBackend::new()));
        let vault = store.load(&derive_key(b"uid-1").unwrap()).await.unwrap();
        assert!(vault.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let store = VaultStore::new(Arc::new(MemoryBackend::new()));
        let key = derive_key(b"uid-1").unwrap();

        store.save(&sample(), &key).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn persisted_blob_is_base64_ciphertext() {
        let backend = MemoryBackend::new();
        let store = VaultStore::new(Arc::new(backend.clone()));
        store.save(&sample(), &derive_key(b"uid-1").unwrap()).await.unwrap();

        let raw = backend.get(DEFAULT_BLOB_NAME).await.unwrap().unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(crypto::EncryptedBlob::from_base64(&text).is_ok());
        assert!(!text.contains("Mail"));
    }

    #[tokio::test]
    async fn garbage_blob_is_corrupt_store() {
        let backend = MemoryBackend::new();
        backend.put(DEFAULT_BLOB_NAME, b"\xff\xfe not a blob").await.unwrap();
        let store = VaultStore::new(Arc::new(backend));

        let result = store.load(&derive_key(b"uid-1").unwrap()).await;
        assert!(matches!(result, Err(StoreError::CorruptStore { .. })));
    }

    #[tokio::test]
    async fn wrong_key_is_corrupt_store_with_auth_cause() {
        let store = VaultStore::new(Arc::new(MemoryBackend::new()));
        store.save(&sample(), &derive_key(b"uid-1").unwrap()).await.unwrap();

        let result = store.load(&derive_key(b"uid-2").unwrap()).await;
        assert!(matches!(
            result,
            Err(StoreError::CorruptStore { ref cause, .. }) if cause.is_authentication_failure()
        ));
    }

    #[tokio::test]
    async fn authentic_non_vault_payload_is_codec_corruption() {
        let backend = MemoryBackend::new();
        let key = derive_key(b"uid-1").unwrap();
        let text = crypto::seal_to_text(&key, b"not a vault").unwrap();
        backend.put(DEFAULT_BLOB_NAME, text.as_bytes()).await.unwrap();
        let store = VaultStore::new(Arc::new(backend));

        assert!(matches!(
            store.load(&key).await,
            Err(StoreError::CorruptStore {
                cause: Corruption::Codec(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn principal_stores_do_not_share_a_blob() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let alice = VaultStore::for_principal(Arc::clone(&backend), "uid-alice");
        let bob = VaultStore::for_principal(Arc::clone(&backend), "uid-bob");
        let alice_key = derive_key(b"alice pass").unwrap();
        let bob_key = derive_key(b"bob pass").unwrap();

        alice.save(&sample(), &alice_key).await.unwrap();
        bob.save(&Vault::from(vec![CredentialEntry::new("Git", "bob", "W")]), &bob_key)
            .await
            .unwrap();

        assert_eq!(alice.name(), "vaults/uid-alice");
        assert_eq!(alice.load(&alice_key).await.unwrap(), sample());
        assert_eq!(bob.load(&bob_key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_or_empty_degrades_on_corruption() {
        let backend = MemoryBackend::new();
        backend.put(DEFAULT_BLOB_NAME, b"AAAA").await.unwrap();
        let store = VaultStore::new(Arc::new(backend));

        let outcome = store.load_or_empty(&derive_key(b"uid-1").unwrap()).await;
        assert!(outcome.vault.is_empty());
        assert!(matches!(outcome.error, Some(StoreError::CorruptStore { .. })));
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_blob() {
        let backend = FlakyBackend::new();
        let store = VaultStore::new(Arc::new(backend.clone()));
        let key = derive_key(b"uid-1").unwrap();
        store.save(&sample(), &key).await.unwrap();

        backend.fail_writes(true);
        let mut bigger = sample();
        bigger.push(CredentialEntry::new("Git", "bob", "W"));
        assert!(matches!(
            store.save(&bigger, &key).await,
            Err(StoreError::Storage(_))
        ));

        assert_eq!(store.load(&key).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn delete_removes_blob() {
        let store = VaultStore::with_name(Arc::new(MemoryBackend::new()), "vaults/uid-1");
        let key = derive_key(b"uid-1").unwrap();
        store.save(&sample(), &key).await.unwrap();
        store.delete().await.unwrap();
        assert!(store.load(&key).await.unwrap().is_empty());
    }
}
