//! Credential records and the vault that orders them.
//!
//! Two entries are the same logical credential when their `(title, username)`
//! pair matches exactly. The secret never takes part in identity, so a changed
//! password is an edit of the same entry, not a new one.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One saved credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub title: String,
    pub username: String,
    #[serde(rename = "password")]
    pub secret: String,
}

impl CredentialEntry {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// The merge identity: title and username exactly as stored.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        (&self.title, &self.username)
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("title", &self.title)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An ordered collection of credentials.
///
/// Order is insertion order and is what a user sees; it has no bearing on
/// merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vault {
    entries: Vec<CredentialEntry>,
}

impl Vault {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CredentialEntry> {
        self.entries.get(index)
    }

    /// Append an entry at the end of the list.
    pub fn push(&mut self, entry: CredentialEntry) {
        self.entries.push(entry);
    }

    /// Replace the entry at `index`, returning the previous one.
    ///
    /// Returns `None` and leaves the vault unchanged if `index` is out of range.
    pub fn update(&mut self, index: usize, entry: CredentialEntry) -> Option<CredentialEntry> {
        let slot = self.entries.get_mut(index)?;
        Some(std::mem::replace(slot, entry))
    }

    /// Remove the entry at `index`, shifting later entries up.
    pub fn remove(&mut self, index: usize) -> Option<CredentialEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether an entry with this `(title, username)` exists.
    #[must_use]
    pub fn contains_identity(&self, title: &str, username: &str) -> bool {
        self.find(title, username).is_some()
    }

    /// Position of the first entry with this `(title, username)`.
    #[must_use]
    pub fn find(&self, title: &str, username: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.identity() == (title, username))
    }

    /// Entries whose title or username contains `query`, ignoring case.
    ///
    /// An empty query matches everything. Order is preserved.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = (usize, &'a CredentialEntry)> {
        let needle = query.to_lowercase();
        self.entries.iter().enumerate().filter(move |(_, e)| {
            e.title.to_lowercase().contains(&needle) || e.username.to_lowercase().contains(&needle)
        })
    }

    /// Append every entry of `incoming` whose identity is not already present.
    ///
    /// Existing entries are never modified (local wins). Duplicates inside
    /// `incoming` are appended once. Returns the number of appended entries.
    pub fn merge_missing(&mut self, incoming: &Vault) -> usize {
        let mut seen: HashSet<(String, String)> = self
            .entries
            .iter()
            .map(|e| (e.title.clone(), e.username.clone()))
            .collect();

        let before = self.entries.len();
        for entry in &incoming.entries {
            if seen.insert((entry.title.clone(), entry.username.clone())) {
                self.entries.push(entry.clone());
            }
        }
        self.entries.len() - before
    }
}

impl From<Vec<CredentialEntry>> for Vault {
    fn from(entries: Vec<CredentialEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<CredentialEntry> for Vault {
    fn from_iter<I: IntoIterator<Item = CredentialEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Vault {
    type Item = CredentialEntry;
    type IntoIter = std::vec::IntoIter<CredentialEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Vault {
    type Item = &'a CredentialEntry;
    type IntoIter = std::slice::Iter<'a, CredentialEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, username: &str, secret: &str) -> CredentialEntry {
        CredentialEntry::new(title, username, secret)
    }

    #[test]
    fn identity_ignores_secret() {
        let a = entry("Mail", "bob", "X");
        let b = entry("Mail", "bob", "Y");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, b);
    }

    #[test]
    fn identity_is_case_and_whitespace_sensitive() {
        let vault = Vault::from(vec![entry("Mail", "bob", "X")]);
        assert!(vault.contains_identity("Mail", "bob"));
        assert!(!vault.contains_identity("mail", "bob"));
        assert!(!vault.contains_identity("Mail ", "bob"));
    }

    #[test]
    fn merge_keeps_local_and_appends_missing() {
        let mut local = Vault::from(vec![entry("Mail", "bob", "X")]);
        let remote = Vault::from(vec![entry("Mail", "bob", "Y"), entry("Bank", "bob", "Z")]);

        let added = local.merge_missing(&remote);

        assert_eq!(added, 1);
        assert_eq!(
            local.entries(),
            &[entry("Mail", "bob", "X"), entry("Bank", "bob", "Z")]
        );
    }

    #[test]
    fn merge_twice_adds_nothing_new() {
        let mut local = Vault::from(vec![entry("Mail", "bob", "X")]);
        let remote = Vault::from(vec![entry("Bank", "bob", "Z"), entry("Git", "bob", "W")]);

        local.merge_missing(&remote);
        let once = local.clone();
        let added = local.merge_missing(&remote);

        assert_eq!(added, 0);
        assert_eq!(local, once);
    }

    #[test]
    fn merge_collapses_duplicates_in_incoming() {
        let mut local = Vault::new();
        let remote = Vault::from(vec![entry("Bank", "bob", "1"), entry("Bank", "bob", "2")]);

        assert_eq!(local.merge_missing(&remote), 1);
        assert_eq!(local.entries(), &[entry("Bank", "bob", "1")]);
    }

    #[test]
    fn update_and_remove_respect_bounds() {
        let mut vault = Vault::from(vec![entry("A", "u", "1"), entry("B", "u", "2")]);

        let old = vault.update(1, entry("B", "u", "3"));
        assert_eq!(old, Some(entry("B", "u", "2")));
        assert_eq!(vault.update(5, entry("C", "u", "4")), None);

        assert_eq!(vault.remove(0), Some(entry("A", "u", "1")));
        assert_eq!(vault.remove(3), None);
        assert_eq!(vault.entries(), &[entry("B", "u", "3")]);
    }

    #[test]
    fn search_matches_title_or_username_case_insensitively() {
        let vault = Vault::from(vec![
            entry("Instagram", "bob", "1"),
            entry("Bank", "alice@insta.example", "2"),
            entry("Mail", "carol", "3"),
        ]);

        let hits: Vec<usize> = vault.search("INSTA").map(|(i, _)| i).collect();
        assert_eq!(hits, vec![0, 1]);
        assert_eq!(vault.search("").count(), 3);
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", entry("Mail", "bob", "hunter2"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }
}
