//! An open vault for the signed-in principal.
//!
//! The session derives the principal's key once, keeps the decrypted vault
//! in memory, and writes through to the local store on every change. Sync
//! operations take `&mut self`, so one session can never run a backup and a
//! restore at the same time.
//!
//! If the local vault exists but cannot be opened (wrong key, damaged blob,
//! unreadable backend) the session starts empty and refuses every local
//! write with [`StoreError::Unreadable`] until the host either fixes the
//! cause and reopens, or calls [`VaultSession::discard_unreadable`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backup::{BackupCoordinator, RestoreStatus};
use crate::crypto::EncryptionKey;
use crate::error::{BackupError, StoreError};
use crate::identity::Principal;
use crate::model::{CredentialEntry, Vault};

/// What a session-level restore did.
#[derive(Debug)]
pub struct SyncReport {
    pub status: RestoreStatus,
    /// Set when the merged vault is in memory but could not be saved.
    pub persist_error: Option<StoreError>,
}

pub struct VaultSession {
    coordinator: Arc<BackupCoordinator>,
    principal: Principal,
    key: EncryptionKey,
    vault: Vault,
    load_error: Option<StoreError>,
}

impl VaultSession {
    /// Open the signed-in principal's local vault.
    ///
    /// An unreadable local vault does not fail the open: the session starts
    /// empty, the cause is kept in [`load_error`](Self::load_error), and
    /// local writes are refused.
    ///
    /// # Errors
    ///
    /// [`BackupError::Unauthenticated`] if nobody is signed in, or
    /// [`BackupError::Crypto`] if the key cannot be derived.
    pub async fn open(coordinator: Arc<BackupCoordinator>) -> Result<Self, BackupError> {
        let principal = coordinator.principal().await?;
        let key = BackupCoordinator::derive_key(&principal)?;
        let loaded = coordinator.store().load_or_empty(&key).await;

        debug!(
            principal = %principal.id(),
            entries = loaded.vault.len(),
            degraded = loaded.error.is_some(),
            "vault session opened"
        );
        Ok(Self {
            coordinator,
            principal,
            key,
            vault: loaded.vault,
            load_error: loaded.error,
        })
    }

    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    #[must_use]
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Why the local vault could not be loaded at open time, if it could not.
    /// While this is set, local writes are refused.
    #[must_use]
    pub fn load_error(&self) -> Option<&StoreError> {
        self.load_error.as_ref()
    }

    /// Give up on the unreadable local vault so the next save replaces it.
    /// Returns the load error being discarded.
    pub fn discard_unreadable(&mut self) -> Option<StoreError> {
        let discarded = self.load_error.take();
        if let Some(e) = &discarded {
            warn!(
                principal = %self.principal.id(),
                error = %e,
                "unreadable local vault will be overwritten"
            );
        }
        discarded
    }

    /// Append an entry and save.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unreadable`] leaves the session unchanged; any other
    /// [`StoreError`] means the entry is in memory but the save failed.
    pub async fn add(&mut self, entry: CredentialEntry) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.vault.push(entry);
        self.persist().await
    }

    /// Replace the entry at `index` and save. Returns the old entry, or
    /// `None` without saving if `index` is out of range.
    ///
    /// # Errors
    ///
    /// As for [`add`](Self::add).
    pub async fn update(
        &mut self,
        index: usize,
        entry: CredentialEntry,
    ) -> Result<Option<CredentialEntry>, StoreError> {
        self.ensure_writable()?;
        let Some(previous) = self.vault.update(index, entry) else {
            return Ok(None);
        };
        self.persist().await?;
        Ok(Some(previous))
    }

    /// Remove the entry at `index` after re-authenticating, then save.
    ///
    /// # Errors
    ///
    /// [`BackupError::Reauthentication`] and `Store(Unreadable)` leave the
    /// vault untouched; any other [`BackupError::Store`] means the entry is
    /// gone from memory but the save failed.
    pub async fn remove(
        &mut self,
        index: usize,
        credential: &str,
    ) -> Result<Option<CredentialEntry>, BackupError> {
        self.ensure_writable()?;
        self.coordinator
            .reauthenticate(&self.principal, credential)
            .await?;
        let Some(removed) = self.vault.remove(index) else {
            return Ok(None);
        };
        self.persist().await?;
        Ok(Some(removed))
    }

    /// Back up the in-memory vault.
    ///
    /// # Errors
    ///
    /// See [`BackupCoordinator::backup`].
    pub async fn backup(&mut self) -> Result<(), BackupError> {
        self.coordinator
            .push(&self.vault, &self.principal, &self.key)
            .await
    }

    /// Merge the remote backup into the in-memory vault and save it.
    ///
    /// The merge is kept in memory even when it cannot be saved, including
    /// when local writes are refused; the reason is in
    /// [`SyncReport::persist_error`].
    ///
    /// # Errors
    ///
    /// See [`BackupCoordinator::restore`]; on error the vault is unchanged.
    pub async fn restore(&mut self) -> Result<SyncReport, BackupError> {
        let (merged, status) = self
            .coordinator
            .fetch_merged(&self.vault, &self.principal, &self.key)
            .await?;
        self.vault = merged;

        let persist_error = match status {
            RestoreStatus::NotFound => None,
            RestoreStatus::Merged { .. } => self.persist().await.err(),
        };
        if let Some(e) = &persist_error {
            warn!(principal = %self.principal.id(), error = %e, "merged vault not saved locally");
        }
        Ok(SyncReport {
            status,
            persist_error,
        })
    }

    /// Re-authenticate with `old`, switch the credential to `new`, and
    /// re-seal the vault under the key derived from the updated principal.
    ///
    /// Any existing backup is merged in first and then pushed again under
    /// the new key, so it stays readable.
    ///
    /// # Errors
    ///
    /// Nothing changes on [`BackupError::Reauthentication`],
    /// `Store(Unreadable)`, a remote read failure, or a corrupt backup.
    /// [`BackupError::CredentialUpdate`] also leaves everything as it was.
    /// A later [`BackupError::Store`] or [`BackupError::RemoteWrite`] means
    /// the credential and the in-memory key already changed; retrying the
    /// save or the backup completes the switch.
    pub async fn change_passphrase(&mut self, old: &str, new: &str) -> Result<(), BackupError> {
        self.ensure_writable()?;
        self.coordinator
            .reauthenticate(&self.principal, old)
            .await?;

        let (merged, status) = self
            .coordinator
            .fetch_merged(&self.vault, &self.principal, &self.key)
            .await?;

        let principal = self
            .coordinator
            .update_credential(&self.principal, new)
            .await?;
        self.key = BackupCoordinator::derive_key(&principal)?;
        self.principal = principal;
        self.vault = merged;

        self.persist().await?;
        let has_backup = matches!(status, RestoreStatus::Merged { .. });
        if has_backup && !self.vault.is_empty() {
            self.coordinator
                .push(&self.vault, &self.principal, &self.key)
                .await?;
        }

        info!(
            principal = %self.principal.id(),
            entries = self.vault.len(),
            backup_resealed = has_backup,
            "passphrase changed"
        );
        Ok(())
    }

    /// Re-authenticate, delete this session principal's remote backup and
    /// local vault, and empty the session.
    ///
    /// # Errors
    ///
    /// See [`BackupCoordinator::destroy_all`]; on error the in-memory vault is
    /// unchanged.
    pub async fn destroy_all(&mut self, credential: &str) -> Result<(), BackupError> {
        self.coordinator
            .destroy_for(&self.principal, credential)
            .await?;
        self.vault.clear();
        self.load_error = None;
        Ok(())
    }

    /// Close the session, dropping the decrypted vault and the key.
    pub fn sign_out(mut self) {
        self.vault.clear();
        info!(principal = %self.principal.id(), "vault session closed");
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.load_error.is_some() {
            return Err(StoreError::Unreadable {
                name: self.coordinator.store().name().to_owned(),
            });
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.coordinator.store().save(&self.vault, &self.key).await
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("principal", &self.principal)
            .field("entries", &self.vault.len())
            .field("writable", &self.load_error.is_none())
            .finish_non_exhaustive()
    }
}
