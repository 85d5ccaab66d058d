//! Key derivation and authenticated encryption for `KeyNest`.
//!
//! # Security model
//!
//! - One 256-bit key per principal, derived with HKDF-SHA256 from the
//!   principal's durable secret under a fixed application salt and a
//!   versioned info label. The same secret yields the same key on any device.
//! - Every encryption is AES-256-GCM with a fresh 96-bit nonce from `OsRng`.
//! - Blob layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`, carried
//!   as standard base64 text.
//! - Keys derive `Zeroize` + `ZeroizeOnDrop` and are redacted in `Debug`.

use std::fmt;

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES-256-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length (128 bits).
pub const TAG_LEN: usize = 16;

/// Derived key length (256 bits).
pub const KEY_LEN: usize = 32;

/// Shortest possible blob: nonce + tag around an empty plaintext.
pub const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

const KDF_SALT: &[u8] = b"keynest/vault-key/salt/v1";
const KDF_INFO: &[u8] = b"keynest-vault-aes256gcm-v1";

/// A 256-bit vault key that is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes. Never log or persist them.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the vault key for a principal from its durable secret.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] if `secret` is empty, and
/// [`CryptoError::KeyDerivation`] if HKDF expansion fails.
pub fn derive_key(secret: &[u8]) -> Result<EncryptionKey, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidInput {
            reason: "principal secret must not be empty".to_owned(),
        });
    }

    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), secret);
    let mut derived = [0u8; KEY_LEN];
    hk.expand(KDF_INFO, &mut derived)
        .map_err(|e| CryptoError::KeyDerivation {
            context: String::from_utf8_lossy(KDF_INFO).into_owned(),
            reason: e.to_string(),
        })?;
    Ok(EncryptionKey::from_bytes(derived))
}

/// An AES-256-GCM output split into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl EncryptedBlob {
    #[must_use]
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    #[must_use]
    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Concatenate as `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_BLOB_LEN.saturating_add(self.ciphertext.len()));
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Split `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedInput`] if `bytes` is shorter than
    /// [`MIN_BLOB_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_BLOB_LEN {
            return Err(CryptoError::MalformedInput {
                reason: format!(
                    "expected at least {MIN_BLOB_LEN} bytes, got {}",
                    bytes.len()
                ),
            });
        }

        let (nonce_bytes, rest) = bytes.split_at(NONCE_LEN);
        let (ciphertext, tag_bytes) = rest.split_at(rest.len() - TAG_LEN);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
            tag,
        })
    }

    /// Standard base64 of [`to_bytes`](Self::to_bytes).
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse base64 text. ASCII whitespace (line wrapping) is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedInput`] if the text is not valid
    /// base64 or decodes to fewer than [`MIN_BLOB_LEN`] bytes.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| CryptoError::MalformedInput {
                reason: format!("invalid base64: {e}"),
            })?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(EncryptedBlob {
        nonce: nonce_bytes,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a blob produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::AuthenticationFailure`] if the tag does not verify
/// (wrong key or any modified byte). No plaintext is returned in that case.
pub fn decrypt(key: &EncryptionKey, blob: &EncryptedBlob) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut buffer = blob.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&blob.nonce),
            b"",
            &mut buffer,
            Tag::from_slice(&blob.tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailure)?;
    Ok(buffer)
}

/// Encrypt and encode as base64 text in one step.
///
/// # Errors
///
/// Same as [`encrypt`].
pub fn seal_to_text(key: &EncryptionKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    Ok(encrypt(key, plaintext)?.to_base64())
}

/// Parse base64 text and decrypt it in one step.
///
/// # Errors
///
/// [`CryptoError::MalformedInput`] for unparseable text,
/// [`CryptoError::AuthenticationFailure`] for a tag mismatch.
pub fn open_from_text(key: &EncryptionKey, text: &str) -> Result<Vec<u8>, CryptoError> {
    decrypt(key, &EncryptedBlob::from_base64(text)?)
}
