//! Vault serialization.
//!
//! The current format is a versioned JSON envelope:
//!
//! ```json
//! {"version":1,"entries":[{"title":"Mail","username":"bob","password":"X"}]}
//! ```
//!
//! Entries appear in vault order. Older local stores held a bare JSON array of
//! entries with no envelope; [`decode`] still reads that as version 0, while
//! [`encode`] always writes [`FORMAT_VERSION`].

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::model::{CredentialEntry, Vault};

/// Version written by [`encode`].
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    entries: &'a [CredentialEntry],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    version: u32,
    entries: Vec<CredentialEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyFormat {
    Envelope(Envelope),
    Legacy(Vec<CredentialEntry>),
}

/// Serialize a vault into the current format.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(vault: &Vault) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&EnvelopeRef {
        version: FORMAT_VERSION,
        entries: vault.entries(),
    })
    .map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Parse a vault from either the current envelope or the legacy bare array.
///
/// Nothing is returned unless the whole input parses.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] for truncated or ill-formed input and
/// [`CodecError::UnsupportedVersion`] for an envelope from a newer format.
pub fn decode(bytes: &[u8]) -> Result<Vault, CodecError> {
    let parsed: AnyFormat = serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
    })?;

    match parsed {
        AnyFormat::Envelope(envelope) if envelope.version == FORMAT_VERSION => {
            Ok(Vault::from(envelope.entries))
        }
        AnyFormat::Envelope(envelope) => Err(CodecError::UnsupportedVersion {
            version: envelope.version,
        }),
        AnyFormat::Legacy(entries) => Ok(Vault::from(entries)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Vault {
        Vault::from(vec![
            CredentialEntry::new("Mail", "bob", "X"),
            CredentialEntry::new("Bank", "bob", "Z"),
            CredentialEntry::new("", "", ""),
            CredentialEntry::new("Ünïcode 🔑", "a\"b", "line\nbreak"),
        ])
    }

    #[test]
    fn roundtrip_preserves_entries_and_order() {
        let vault = sample();
        assert_eq!(decode(&encode(&vault).unwrap()).unwrap(), vault);
    }

    #[test]
    fn empty_vault_roundtrips() {
        let bytes = encode(&Vault::new()).unwrap();
        assert_eq!(bytes, br#"{"version":1,"entries":[]}"#);
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn encoding_uses_password_field_name() {
        let bytes = encode(&Vault::from(vec![CredentialEntry::new("Mail", "bob", "X")])).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"version":1,"entries":[{"title":"Mail","username":"bob","password":"X"}]}"#
        );
    }

    #[test]
    fn legacy_bare_array_decodes() {
        let legacy = br#"[{"title":"Mail","username":"bob","password":"X"}]"#;
        let vault = decode(legacy).unwrap();
        assert_eq!(vault.entries(), &[CredentialEntry::new("Mail", "bob", "X")]);
    }

    #[test]
    fn truncated_input_is_malformed() {
        let bytes = encode(&sample()).unwrap();
        for cut in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(decode(&bytes[..cut]), Err(CodecError::Malformed { .. })),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn entry_missing_field_is_malformed() {
        let bytes = br#"{"version":1,"entries":[{"title":"Mail","username":"bob"}]}"#;
        assert!(matches!(decode(bytes), Err(CodecError::Malformed { .. })));
    }

    #[test]
    fn newer_version_is_rejected() {
        let bytes = br#"{"version":2,"entries":[]}"#;
        assert!(matches!(
            decode(bytes),
            Err(CodecError::UnsupportedVersion { version: 2 })
        ));
    }
}
