//! Static identity → key-fingerprint mapping.
//!
//! Loaded once at startup and shared read-only with the gate. Entries may be
//! full OpenSSH public keys or precomputed `SHA256:` fingerprints; both are
//! normalised to [`Fingerprint`]s at load time so admission is a set lookup.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use super::{Fingerprint, PublicKey, validate_identity};
use crate::error::AllowSetError;

/// On-disk shape of the allow-set file.
///
/// ```toml
/// [users]
/// broemp = ["ssh-ed25519 AAAAC3Nza... broemp@laptop"]
/// guest-admin = ["SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AllowSetFile {
    /// Identity → list of keys or fingerprints.
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
}

/// Identities with their authorized key fingerprints.
#[derive(Debug, Clone, Default)]
pub struct AllowSet {
    users: HashMap<String, HashSet<Fingerprint>>,
}

impl AllowSet {
    /// Empty allow-set. Every identity is unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parsed file contents.
    pub fn from_file(file: AllowSetFile) -> Result<Self, AllowSetError> {
        let mut set = Self::new();
        for (identity, entries) in file.users {
            if !validate_identity(&identity) {
                return Err(AllowSetError::InvalidIdentity(identity));
            }
            if entries.is_empty() {
                return Err(AllowSetError::NoKeys(identity));
            }

            for entry in entries {
                let fingerprint = parse_entry(&entry).map_err(|source| {
                    AllowSetError::InvalidEntry { identity: identity.clone(), source }
                })?;
                set.insert(identity.clone(), fingerprint);
            }
        }
        Ok(set)
    }

    /// Authorize `fingerprint` for `identity`.
    pub fn insert(&mut self, identity: impl Into<String>, fingerprint: Fingerprint) {
        self.users.entry(identity.into()).or_default().insert(fingerprint);
    }

    /// Whether `identity` has any registered keys.
    pub fn contains(&self, identity: &str) -> bool {
        self.users.contains_key(identity)
    }

    /// Authorized fingerprints for `identity`. `None` if unknown.
    pub fn fingerprints(&self, identity: &str) -> Option<&HashSet<Fingerprint>> {
        self.users.get(identity)
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no identity is registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<Fingerprint, crate::error::KeyError> {
    let entry = entry.trim();
    if entry.starts_with("SHA256:") {
        entry.parse()
    } else {
        PublicKey::parse_openssh(entry).map(|key| key.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;
    use crate::error::KeyError;

    fn key(seed: u8) -> PublicKey {
        PublicKey::from_verifying_key(SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn file(entries: Vec<(&str, Vec<String>)>) -> AllowSetFile {
        AllowSetFile { users: entries.into_iter().map(|(name, keys)| (name.to_string(), keys)).collect() }
    }

    #[test]
    fn accepts_keys_and_fingerprints() {
        let a = key(1);
        let b = key(2);
        let set = AllowSet::from_file(file(vec![(
            "broemp",
            vec![format!("{} laptop", a.to_openssh()), b.fingerprint().to_string()],
        )]))
        .unwrap();

        let fps = set.fingerprints("broemp").unwrap();
        assert!(fps.contains(&a.fingerprint()));
        assert!(fps.contains(&b.fingerprint()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reports_which_identity_is_broken() {
        let err = AllowSet::from_file(file(vec![("alice", vec!["ssh-rsa AAAA".to_string()])]))
            .unwrap_err();
        assert_eq!(err, AllowSetError::InvalidEntry {
            identity: "alice".into(),
            source: KeyError::UnsupportedType("ssh-rsa".into()),
        });
    }

    #[test]
    fn rejects_identity_without_keys() {
        let err = AllowSet::from_file(file(vec![("alice", vec![])])).unwrap_err();
        assert_eq!(err, AllowSetError::NoKeys("alice".into()));
    }

    #[test]
    fn rejects_bad_identity_names() {
        let err = AllowSet::from_file(file(vec![("has space", vec![key(1).to_openssh()])])).unwrap_err();
        assert_eq!(err, AllowSetError::InvalidIdentity("has space".into()));
    }

    #[test]
    fn unknown_identity_is_absent() {
        let set = AllowSet::new();
        assert!(set.is_empty());
        assert!(!set.contains("guest"));
        assert!(set.fingerprints("guest").is_none());
    }
}
