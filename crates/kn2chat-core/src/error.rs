//! Error types for the chat core.
//!
//! Strongly-typed errors for each layer: message construction, public-key
//! parsing, allow-set loading and the connection handshake. None of them are
//! fatal to the server; callers decide whether to reject a connection or
//! drop an input.

use thiserror::Error;

use crate::message::MAX_MESSAGE_CHARS;

/// Errors from building a [`crate::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Text was empty after trimming.
    #[error("message text is empty")]
    Empty,

    /// Text exceeds the character limit.
    #[error("message text has {len} characters, limit is {MAX_MESSAGE_CHARS}")]
    TooLong {
        /// Character count of the rejected text
        len: usize,
    },
}

/// Errors from parsing public keys and fingerprints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Key algorithm is not `ssh-ed25519`.
    #[error("unsupported key type: {0}")]
    UnsupportedType(String),

    /// Base64 payload did not decode.
    #[error("invalid base64 in key material")]
    Base64,

    /// SSH wire-format blob is truncated or inconsistent.
    #[error("malformed key blob: {0}")]
    MalformedBlob(&'static str),

    /// Blob decoded but is not a valid Ed25519 point.
    #[error("invalid ed25519 public key")]
    InvalidPoint,

    /// Fingerprint string is not `SHA256:<base64>` of a 32-byte digest.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Nothing to parse.
    #[error("empty key line")]
    Empty,
}

/// Errors from loading an allow-set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllowSetError {
    /// An entry for `identity` is neither a public key nor a fingerprint.
    #[error("invalid key for {identity}: {source}")]
    InvalidEntry {
        /// Identity the entry belongs to
        identity: String,
        /// Underlying parse failure
        #[source]
        source: KeyError,
    },

    /// An identity is listed with no keys at all.
    #[error("identity {0} has no keys")]
    NoKeys(String),

    /// Identity name fails [`crate::identity::validate_identity`].
    #[error("invalid identity name: {0:?}")]
    InvalidIdentity(String),
}

/// Errors from parsing the client's half of the handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Line did not start with `AUTH`.
    #[error("expected AUTH line")]
    NotAuth,

    /// Identity missing or invalid.
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    /// Line was not valid UTF-8.
    #[error("handshake line is not UTF-8")]
    Utf8,

    /// Server greeting could not be parsed (client side).
    #[error("malformed server greeting")]
    Greeting,
}
