//! Error types for `keynest-core`.
//!
//! Each variant carries enough context to diagnose the problem without a
//! debugger. Crypto errors never include key material, secrets, or decrypted
//! bytes — only lengths and operation descriptions.

use keynest_storage::StorageError;

/// Errors from key derivation and the AEAD cipher.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The caller supplied unusable input (e.g. an empty principal secret).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// HKDF key derivation failed.
    #[error("key derivation failed for context '{context}': {reason}")]
    KeyDerivation { context: String, reason: String },

    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// The authentication tag did not verify: wrong key or tampered data.
    #[error("authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailure,

    /// The blob is structurally invalid (too short or not valid base64).
    #[error("malformed encrypted blob: {reason}")]
    MalformedInput { reason: String },
}

/// Errors from encoding or decoding a vault.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes are not a well-formed vault encoding.
    #[error("malformed vault encoding: {reason}")]
    Malformed { reason: String },

    /// The encoding declares a format version this build cannot read.
    #[error("unsupported vault format version {version}")]
    UnsupportedVersion { version: u32 },

    /// Serialization failed.
    #[error("vault encoding failed: {reason}")]
    Encode { reason: String },
}

/// Why persisted or remote data could not be turned back into a vault.
#[derive(Debug, thiserror::Error)]
pub enum Corruption {
    /// Decryption or blob parsing failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The decrypted payload is not a valid vault encoding.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The remote document envelope is unreadable.
    #[error("malformed backup document: {reason}")]
    Document { reason: String },
}

impl Corruption {
    /// Whether the data failed authentication, i.e. it was tampered with or
    /// sealed under a different key.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::AuthenticationFailure))
    }
}

/// Errors from the local vault store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A blob exists but cannot be decrypted or decoded.
    #[error("local vault '{name}' is corrupt: {cause}")]
    CorruptStore {
        name: String,
        #[source]
        cause: Corruption,
    },

    /// Sealing the vault for a write failed.
    #[error("failed to seal local vault: {0}")]
    Seal(#[source] Corruption),

    /// Writes are refused because the existing local vault could not be
    /// opened and has not been explicitly discarded.
    #[error("local vault '{name}' could not be opened; refusing to overwrite it")]
    Unreadable { name: String },

    /// The storage backend failed.
    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No principal is signed in.
    #[error("no authenticated principal")]
    Unauthenticated,

    /// The supplied credential did not validate.
    #[error("re-authentication rejected for principal '{principal_id}'")]
    Rejected { principal_id: String },

    /// A new credential was refused.
    #[error("invalid credential: {reason}")]
    InvalidCredential { reason: String },

    /// The identity provider could not be reached.
    #[error("identity provider unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors from the remote document store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Reading a document failed.
    #[error("failed to read remote document '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Writing a document failed.
    #[error("failed to write remote document '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Deleting a document failed.
    #[error("failed to delete remote document '{key}': {reason}")]
    Delete { key: String, reason: String },
}

/// Errors from backup, restore, and destroy operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// No principal is signed in.
    #[error("no authenticated principal")]
    Unauthenticated,

    /// The vault has no entries; nothing was written.
    #[error("vault is empty, nothing to back up")]
    EmptyVault,

    /// Key derivation failed before anything was written.
    #[error("backup crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Encoding or encrypting the vault for upload failed.
    #[error("failed to seal vault for backup: {0}")]
    Seal(#[source] Corruption),

    /// The remote document could not be written.
    #[error("remote write failed: {0}")]
    RemoteWrite(#[source] RemoteError),

    /// The remote document could not be read.
    #[error("remote read failed: {0}")]
    RemoteRead(#[source] RemoteError),

    /// The remote document could not be deleted.
    #[error("remote delete failed: {0}")]
    RemoteDelete(#[source] RemoteError),

    /// The remote backup exists but is unusable. Local data is untouched.
    #[error("backup is corrupt: {0}")]
    CorruptBackup(#[source] Corruption),

    /// Re-authentication did not succeed; the operation was aborted.
    #[error("re-authentication failed: {0}")]
    Reauthentication(#[source] IdentityError),

    /// The identity provider refused the new credential.
    #[error("credential update failed: {0}")]
    CredentialUpdate(#[source] IdentityError),

    /// The local vault store failed.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),
}
