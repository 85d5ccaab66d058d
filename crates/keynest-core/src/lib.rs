//! Core engine for `KeyNest`.
//!
//! Holds the credential record model, per-principal key derivation, the
//! AES-256-GCM cipher, the versioned vault codec, the encrypted local vault
//! store, and the backup coordinator that pushes vaults to a remote document
//! store and merges them back on restore. Identity and remote transport are
//! consumed through the traits in [`identity`] and [`remote`]; local blobs go
//! through `keynest-storage`.

pub mod backup;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod model;
pub mod remote;
pub mod session;
pub mod store;
#[cfg(test)]
mod test_support;

pub use backup::{BackupCoordinator, RestoreOutcome, RestoreStatus};
pub use identity::{IdentityProvider, Principal};
pub use model::{CredentialEntry, Vault};
pub use remote::{RemoteLayout, RemoteStore, StorageRemote};
pub use session::{SyncReport, VaultSession};
pub use store::VaultStore;
