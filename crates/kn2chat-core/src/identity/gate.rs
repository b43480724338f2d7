//! Admission decisions for new connections.
//!
//! The gate runs after the transport handshake and before any session
//! exists. It never touches the session registry.

use std::{fmt, str::FromStr, sync::Arc};

use super::{AllowSet, PublicKey};

/// Line shown to a client whose key does not match its claimed identity.
pub const REJECTION_MESSAGE: &str = "Hey, I don't know who you are!";

/// What to do with identities that are not in the allow-set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownIdentityPolicy {
    /// Let them in as unauthenticated sessions.
    #[default]
    Admit,
    /// Reject them like a key mismatch.
    Deny,
}

impl FromStr for UnknownIdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admit" | "allow" => Ok(Self::Admit),
            "deny" | "reject" => Ok(Self::Deny),
            other => Err(format!("unknown identity policy '{other}' (expected admit or deny)")),
        }
    }
}

impl fmt::Display for UnknownIdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admit => "admit",
            Self::Deny => "deny",
        })
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Connection may proceed.
    Allow {
        /// Key matched an allow-set entry for the claimed identity.
        authenticated: bool,
    },
    /// Connection must be closed after sending `reason` to the client.
    Deny {
        /// Human-readable line for the client.
        reason: String,
    },
}

impl Admission {
    /// Whether the connection may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Checks presented keys against the allow-set.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    allow_set: Arc<AllowSet>,
    policy: UnknownIdentityPolicy,
}

impl IdentityGate {
    /// Create a gate over a shared allow-set.
    pub fn new(allow_set: Arc<AllowSet>, policy: UnknownIdentityPolicy) -> Self {
        Self { allow_set, policy }
    }

    /// Decide whether `identity` presenting `key` may connect.
    ///
    /// `key` is `None` when the client sent no key, a malformed key, or a key
    /// whose possession proof failed.
    pub fn admit(&self, identity: &str, key: Option<&PublicKey>) -> Admission {
        let Some(allowed) = self.allow_set.fingerprints(identity) else {
            return match self.policy {
                UnknownIdentityPolicy::Admit => Admission::Allow { authenticated: false },
                UnknownIdentityPolicy::Deny => deny(),
            };
        };

        match key {
            Some(key) if allowed.contains(&key.fingerprint()) => {
                Admission::Allow { authenticated: true }
            },
            _ => deny(),
        }
    }

    /// Policy applied to unknown identities.
    pub fn policy(&self) -> UnknownIdentityPolicy {
        self.policy
    }

    /// Shared allow-set.
    pub fn allow_set(&self) -> &AllowSet {
        &self.allow_set
    }
}

fn deny() -> Admission {
    Admission::Deny { reason: REJECTION_MESSAGE.to_string() }
}
