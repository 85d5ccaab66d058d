//! Backup and restore against the remote document store.
//!
//! # Backup
//!
//! 1. Resolve the signed-in principal ([`BackupError::Unauthenticated`]) and
//!    refuse an empty vault ([`BackupError::EmptyVault`], nothing written).
//! 2. Encode, then encrypt under the principal's derived key.
//! 3. Write `{"<field>": "<base64 blob>"}` to `<collection>/<principal id>`.
//!    Failures surface as [`BackupError::RemoteWrite`] and are not retried.
//!
//! # Restore
//!
//! 1. Resolve the principal.
//! 2. Read the document. No document (or no field) is
//!    [`RestoreStatus::NotFound`], not an error.
//! 3. Decrypt and decode; any failure is [`BackupError::CorruptBackup`] and
//!    the local vault is left as it was.
//! 4. Merge by `(title, username)`: remote-only entries are appended, local
//!    entries always win.
//! 5. Save the merged vault locally. A save failure is reported in
//!    [`RestoreOutcome::persist_error`]; the merged vault is still returned.
//!
//! The coordinator holds no mutable state. Callers must not run a backup and
//! a restore for the same principal and the same local vault at once;
//! [`VaultSession`](crate::session::VaultSession) enforces that with `&mut self`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::crypto::{self, EncryptionKey};
use crate::error::{BackupError, StoreError};
use crate::identity::{IdentityProvider, Principal};
use crate::model::Vault;
use crate::remote::{RemoteLayout, RemoteStore};
use crate::store::{self, VaultStore};

/// How a restore ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    /// No backup exists for the principal; the local vault is unchanged.
    NotFound,
    /// The backup was merged in, appending `added` entries.
    Merged { added: usize },
}

/// The result of a successful restore.
#[derive(Debug)]
pub struct RestoreOutcome {
    /// The vault the caller should use from now on.
    pub vault: Vault,
    pub status: RestoreStatus,
    /// Set when the merged vault could not be saved locally.
    pub persist_error: Option<StoreError>,
}

/// Orchestrates backup, restore, and destroy for the signed-in principal.
pub struct BackupCoordinator {
    identity: Arc<dyn IdentityProvider>,
    remote: Arc<dyn RemoteStore>,
    store: VaultStore,
    layout: RemoteLayout,
}

impl BackupCoordinator {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        remote: Arc<dyn RemoteStore>,
        store: VaultStore,
    ) -> Self {
        Self {
            identity,
            remote,
            store,
            layout: RemoteLayout::default(),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: RemoteLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    #[must_use]
    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// The signed-in principal.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Unauthenticated`] if nobody is signed in.
    pub async fn principal(&self) -> Result<Principal, BackupError> {
        self.identity
            .current_principal()
            .await
            .ok_or(BackupError::Unauthenticated)
    }

    /// Derive the vault key for a principal.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Crypto`] if the principal's secret is empty or
    /// derivation fails.
    pub fn derive_key(principal: &Principal) -> Result<EncryptionKey, BackupError> {
        Ok(crypto::derive_key(principal.key_secret())?)
    }

    /// Back up `vault` for the signed-in principal.
    ///
    /// # Errors
    ///
    /// [`BackupError::Unauthenticated`], [`BackupError::EmptyVault`],
    /// [`BackupError::Crypto`], or [`BackupError::RemoteWrite`].
    pub async fn backup(&self, vault: &Vault) -> Result<(), BackupError> {
        let principal = self.principal().await?;
        if vault.is_empty() {
            return Err(BackupError::EmptyVault);
        }
        let key = Self::derive_key(&principal)?;
        self.push(vault, &principal, &key).await
    }

    /// Restore the signed-in principal's backup into a copy of `local`.
    ///
    /// # Errors
    ///
    /// [`BackupError::Unauthenticated`], [`BackupError::Crypto`],
    /// [`BackupError::RemoteRead`], or [`BackupError::CorruptBackup`]. In
    /// every error case `local` is untouched and nothing was saved.
    pub async fn restore(&self, local: &Vault) -> Result<RestoreOutcome, BackupError> {
        let principal = self.principal().await?;
        let key = Self::derive_key(&principal)?;
        self.pull(local, &principal, &key).await
    }

    /// Delete the principal's remote backup and local vault after validating
    /// a freshly supplied credential.
    ///
    /// # Errors
    ///
    /// [`BackupError::Reauthentication`] if the credential is rejected (nothing
    /// is deleted), [`BackupError::RemoteDelete`] if the remote delete fails
    /// (the local vault is kept), or [`BackupError::Store`].
    pub async fn destroy_all(&self, credential: &str) -> Result<(), BackupError> {
        let principal = self.principal().await?;
        self.destroy_for(&principal, credential).await
    }

    pub(crate) async fn destroy_for(
        &self,
        principal: &Principal,
        credential: &str,
    ) -> Result<(), BackupError> {
        self.reauthenticate(principal, credential).await?;

        let doc_key = self.layout.document_key(principal.id());
        self.remote
            .delete(&doc_key)
            .await
            .map_err(BackupError::RemoteDelete)?;
        self.store.delete().await?;

        info!(principal = %principal.id(), "remote backup and local vault destroyed");
        Ok(())
    }

    /// Ask the identity provider to validate `credential` for `principal`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Reauthentication`] if it does not validate.
    pub async fn reauthenticate(
        &self,
        principal: &Principal,
        credential: &str,
    ) -> Result<(), BackupError> {
        self.identity
            .reauthenticate(principal, credential)
            .await
            .map_err(|e| {
                warn!(principal = %principal.id(), "re-authentication rejected");
                BackupError::Reauthentication(e)
            })
    }

    /// Replace `principal`'s credential with the identity provider and
    /// return the principal to derive keys from afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::CredentialUpdate`] if the provider refuses.
    pub async fn update_credential(
        &self,
        principal: &Principal,
        new_credential: &str,
    ) -> Result<Principal, BackupError> {
        self.identity
            .update_credential(principal, new_credential)
            .await
            .map_err(|e| {
                warn!(principal = %principal.id(), error = %e, "credential update refused");
                BackupError::CredentialUpdate(e)
            })
    }

    pub(crate) async fn push(
        &self,
        vault: &Vault,
        principal: &Principal,
        key: &EncryptionKey,
    ) -> Result<(), BackupError> {
        if vault.is_empty() {
            return Err(BackupError::EmptyVault);
        }

        let text = store::seal_vault(key, vault).map_err(BackupError::Seal)?;
        let doc_key = self.layout.document_key(principal.id());
        let document = self.layout.encode_document(&text);

        self.remote
            .put(&doc_key, &document)
            .await
            .map_err(|e| {
                warn!(principal = %principal.id(), error = %e, "backup write failed");
                BackupError::RemoteWrite(e)
            })?;

        info!(
            principal = %principal.id(),
            entries = vault.len(),
            bytes = document.len(),
            "backup written"
        );
        Ok(())
    }

    async fn pull(
        &self,
        local: &Vault,
        principal: &Principal,
        key: &EncryptionKey,
    ) -> Result<RestoreOutcome, BackupError> {
        let (merged, status) = self.fetch_merged(local, principal, key).await?;
        if status == RestoreStatus::NotFound {
            return Ok(RestoreOutcome {
                vault: merged,
                status,
                persist_error: None,
            });
        }

        let persist_error = match self.store.save(&merged, key).await {
            Ok(()) => None,
            Err(e) => {
                warn!(principal = %principal.id(), error = %e, "merged vault not saved locally");
                Some(e)
            }
        };
        Ok(RestoreOutcome {
            vault: merged,
            status,
            persist_error,
        })
    }

    /// Read, open, and merge the principal's backup into a copy of `local`
    /// without saving anything.
    pub(crate) async fn fetch_merged(
        &self,
        local: &Vault,
        principal: &Principal,
        key: &EncryptionKey,
    ) -> Result<(Vault, RestoreStatus), BackupError> {
        let doc_key = self.layout.document_key(principal.id());
        let document = self
            .remote
            .get(&doc_key)
            .await
            .map_err(BackupError::RemoteRead)?;

        let blob_text = match document {
            Some(bytes) => self
                .layout
                .decode_document(&bytes)
                .map_err(BackupError::CorruptBackup)?,
            None => None,
        };
        let Some(blob_text) = blob_text else {
            debug!(principal = %principal.id(), "no backup to restore");
            return Ok((local.clone(), RestoreStatus::NotFound));
        };

        let remote_vault = store::open_blob(key, blob_text.as_bytes()).map_err(|cause| {
            warn!(principal = %principal.id(), error = %cause, "backup unusable");
            BackupError::CorruptBackup(cause)
        })?;

        let mut merged = local.clone();
        let added = merged.merge_missing(&remote_vault);

        info!(
            principal = %principal.id(),
            remote_entries = remote_vault.len(),
            added,
            "backup merged"
        );
        Ok((merged, RestoreStatus::Merged { added }))
    }
}

impl std::fmt::Debug for BackupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupCoordinator")
            .field("store", &self.store)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
