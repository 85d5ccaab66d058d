//! CLI configuration.
//!
//! Loaded from `KEYNEST_*` environment variables with defaults suited to a
//! single user running from one working directory.

use std::path::PathBuf;

use anyhow::{Result, bail};

/// Where the local vault blob lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalBackendKind {
    /// One file per blob under the data directory.
    File,
    /// A single redb database file inside the data directory.
    Redb { path: PathBuf },
}

/// The signed-in account, as far as the CLI knows it.
#[derive(Clone)]
pub struct AccountConfig {
    pub principal: String,
    pub email: Option<String>,
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("principal", &self.principal)
            .field("email", &self.email)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Directory holding the local encrypted vault.
    pub data_dir: PathBuf,
    pub local_backend: LocalBackendKind,
    /// Directory standing in for the remote document store.
    pub remote_dir: PathBuf,
    /// `None` when nobody is signed in.
    pub account: Option<AccountConfig>,
    pub log_level: String,
    pub log_json: bool,
}

impl CliConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `KEYNEST_DATA_DIR` — local vault directory (default: `./.keynest/local`)
    /// - `KEYNEST_STORAGE` — `file` or `redb` (default: `file`)
    /// - `KEYNEST_REMOTE_DIR` — remote document directory (default: `./.keynest/remote`)
    /// - `KEYNEST_PRINCIPAL` — account id; unset means signed out
    /// - `KEYNEST_EMAIL` — account email (optional)
    /// - `KEYNEST_PASSPHRASE` — key derivation and re-authentication secret
    /// - `KEYNEST_LOG_LEVEL` — log filter when `RUST_LOG` is unset (default: `warn`)
    /// - `KEYNEST_LOG_FORMAT` — `json` for JSON log lines (default: text)
    ///
    /// # Errors
    ///
    /// Fails when `KEYNEST_STORAGE` names an unknown backend.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Fails when `KEYNEST_STORAGE` names an unknown backend.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = non_empty("KEYNEST_DATA_DIR")
            .map_or_else(|| PathBuf::from("./.keynest/local"), PathBuf::from);

        let local_backend = match non_empty("KEYNEST_STORAGE")
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("file") => LocalBackendKind::File,
            Some("redb") => LocalBackendKind::Redb {
                path: data_dir.join("vault.redb"),
            },
            Some(other) => bail!("unknown KEYNEST_STORAGE '{other}' (expected file or redb)"),
        };

        let remote_dir = non_empty("KEYNEST_REMOTE_DIR")
            .map_or_else(|| PathBuf::from("./.keynest/remote"), PathBuf::from);

        let account = non_empty("KEYNEST_PRINCIPAL").map(|principal| AccountConfig {
            principal,
            email: non_empty("KEYNEST_EMAIL"),
            passphrase: non_empty("KEYNEST_PASSPHRASE"),
        });

        let log_level = non_empty("KEYNEST_LOG_LEVEL").unwrap_or_else(|| "warn".to_owned());
        let log_json = non_empty("KEYNEST_LOG_FORMAT")
            .is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            data_dir,
            local_backend,
            remote_dir,
            account,
            log_level,
            log_json,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn try_config(vars: &[(&str, &str)]) -> Result<CliConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        CliConfig::from_lookup(|name| vars.get(name).cloned())
    }

    fn config(vars: &[(&str, &str)]) -> CliConfig {
        try_config(vars).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.data_dir, PathBuf::from("./.keynest/local"));
        assert_eq!(cfg.remote_dir, PathBuf::from("./.keynest/remote"));
        assert_eq!(cfg.local_backend, LocalBackendKind::File);
        assert!(cfg.account.is_none());
        assert_eq!(cfg.log_level, "warn");
        assert!(!cfg.log_json);
    }

    #[test]
    fn account_requires_principal() {
        let cfg = config(&[("KEYNEST_PASSPHRASE", "hunter2")]);
        assert!(cfg.account.is_none());

        let cfg = config(&[
            ("KEYNEST_PRINCIPAL", "uid-bob"),
            ("KEYNEST_EMAIL", "bob@example.com"),
            ("KEYNEST_PASSPHRASE", "hunter2"),
        ]);
        let account = cfg.account.as_ref().map(|a| {
            (
                a.principal.as_str(),
                a.email.as_deref(),
                a.passphrase.as_deref(),
            )
        });
        assert_eq!(
            account,
            Some(("uid-bob", Some("bob@example.com"), Some("hunter2")))
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[("KEYNEST_PRINCIPAL", "  "), ("KEYNEST_LOG_LEVEL", "")]);
        assert!(cfg.account.is_none());
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn redb_storage_lives_in_data_dir() {
        let cfg = config(&[("KEYNEST_DATA_DIR", "/tmp/kn"), ("KEYNEST_STORAGE", "REDB")]);
        assert_eq!(
            cfg.local_backend,
            LocalBackendKind::Redb {
                path: PathBuf::from("/tmp/kn/vault.redb")
            }
        );
    }

    #[test]
    fn explicit_file_storage() {
        let cfg = config(&[("KEYNEST_STORAGE", "File")]);
        assert_eq!(cfg.local_backend, LocalBackendKind::File);
    }

    #[test]
    fn unknown_storage_kind_is_rejected() {
        let err = try_config(&[("KEYNEST_STORAGE", "rocksdb")]).unwrap_err();
        assert!(err.to_string().contains("rocksdb"), "{err}");
    }

    #[test]
    fn debug_redacts_passphrase() {
        let cfg = config(&[
            ("KEYNEST_PRINCIPAL", "uid-bob"),
            ("KEYNEST_PASSPHRASE", "hunter2"),
        ]);
        let debug = format!("{cfg:?}");
        assert!(debug.contains("uid-bob"));
        assert!(!debug.contains("hunter2"));
    }
}
