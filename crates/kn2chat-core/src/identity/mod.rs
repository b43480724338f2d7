//! Client identities and the admission gate.
//!
//! A connecting client claims a display identity and may present an Ed25519
//! public key. The [`IdentityGate`] compares that key against the static
//! [`AllowSet`] and decides whether a session may be created.

mod allow_set;
mod gate;
mod key;

pub use allow_set::{AllowSet, AllowSetFile};
pub use gate::{Admission, IdentityGate, REJECTION_MESSAGE, UnknownIdentityPolicy};
pub use key::{ED25519_KEY_TYPE, Fingerprint, PublicKey};

/// Longest accepted display identity, in characters.
pub const MAX_IDENTITY_CHARS: usize = 32;

/// Whether `identity` is usable as a display name.
///
/// Must be 1 to [`MAX_IDENTITY_CHARS`] characters with no whitespace or
/// control characters. The system sender `*` is reserved.
pub fn validate_identity(identity: &str) -> bool {
    let len = identity.chars().count();
    (1..=MAX_IDENTITY_CHARS).contains(&len)
        && identity != crate::message::SYSTEM_SENDER
        && !identity.chars().any(|c| c.is_whitespace() || c.is_control())
}
