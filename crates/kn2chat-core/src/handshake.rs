//! Connection handshake: claimed identity plus proof of key possession.
//!
//! The server opens with a greeting carrying a random nonce. The client
//! answers with one `AUTH` line naming its identity and, optionally, an
//! Ed25519 public key together with a signature over the nonce and identity:
//!
//! ```text
//! S: KN2CHAT 1 <64 hex chars>
//! C: AUTH <identity>
//! C: AUTH <identity> ssh-ed25519 <key blob base64> <signature base64>
//! ```
//!
//! Both halves are pure; the server runtime does the socket I/O.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signer, SigningKey};

use crate::{
    env::Environment,
    error::HandshakeError,
    identity::{ED25519_KEY_TYPE, PublicKey, validate_identity},
};

/// Handshake protocol version sent in the greeting.
pub const PROTOCOL_VERSION: u32 = 1;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 32;

/// First word of the server greeting.
pub const GREETING_TAG: &str = "KN2CHAT";

/// First word of the client reply.
pub const AUTH_TAG: &str = "AUTH";

/// Domain separator prepended to every signed payload.
const SIGNATURE_DOMAIN: &[u8] = b"kn2chat-auth\0";

/// Server-issued challenge for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    nonce: [u8; NONCE_LEN],
}

impl Challenge {
    /// Draw a fresh nonce from the environment.
    pub fn new<E: Environment>(env: &E) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        env.random_bytes(&mut nonce);
        Self { nonce }
    }

    /// Challenge with a known nonce.
    pub fn from_nonce(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce }
    }

    /// Greeting line, without line terminator.
    pub fn greeting(&self) -> String {
        format!("{GREETING_TAG} {PROTOCOL_VERSION} {}", hex::encode(self.nonce))
    }

    /// Parse a greeting line (client side).
    pub fn parse_greeting(line: &str) -> Result<Self, HandshakeError> {
        let mut fields = line.split_whitespace();
        if fields.next() != Some(GREETING_TAG) {
            return Err(HandshakeError::Greeting);
        }
        if fields.next().and_then(|v| v.parse::<u32>().ok()) != Some(PROTOCOL_VERSION) {
            return Err(HandshakeError::Greeting);
        }

        let mut nonce = [0u8; NONCE_LEN];
        let encoded = fields.next().ok_or(HandshakeError::Greeting)?;
        hex::decode_to_slice(encoded, &mut nonce).map_err(|_| HandshakeError::Greeting)?;

        if fields.next().is_some() {
            return Err(HandshakeError::Greeting);
        }

        Ok(Self { nonce })
    }

    /// Bytes a client signs to prove it holds the key for `identity`.
    pub fn signed_payload(&self, identity: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(SIGNATURE_DOMAIN.len() + NONCE_LEN + identity.len());
        payload.extend_from_slice(SIGNATURE_DOMAIN);
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(identity.as_bytes());
        payload
    }

    /// The presented key, if the request carries a valid signature over this
    /// challenge. `None` for anonymous requests and failed proofs alike.
    pub fn verified_key<'a>(&self, request: &'a AuthRequest) -> Option<&'a PublicKey> {
        let presented = request.key.as_ref()?;
        let payload = self.signed_payload(&request.identity);
        presented.key.verify(&payload, &presented.signature).then_some(&presented.key)
    }
}

/// Key and signature carried by an `AUTH` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedKey {
    /// Public key the client claims.
    pub key: PublicKey,
    /// Signature over [`Challenge::signed_payload`].
    pub signature: Vec<u8>,
}

/// Parsed client `AUTH` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    identity: String,
    key: Option<PresentedKey>,
}

impl AuthRequest {
    /// Parse an `AUTH` line.
    ///
    /// Key material that fails to decode (missing signature, extra fields,
    /// unknown algorithm, bad base64, invalid point) is dropped rather than
    /// rejected: the gate treats the request as keyless and applies its
    /// policy. Only a wrong tag or an invalid identity is an error.
    pub fn parse(line: &[u8]) -> Result<Self, HandshakeError> {
        let line = std::str::from_utf8(line).map_err(|_| HandshakeError::Utf8)?;
        let fields: Vec<&str> = line.split_whitespace().collect();

        let (identity, rest) = match fields.as_slice() {
            [tag, identity, rest @ ..] if *tag == AUTH_TAG => (*identity, rest),
            [tag] if *tag == AUTH_TAG => return Err(HandshakeError::InvalidIdentity(String::new())),
            _ => return Err(HandshakeError::NotAuth),
        };

        if !validate_identity(identity) {
            return Err(HandshakeError::InvalidIdentity(identity.to_string()));
        }

        let key = match rest {
            [] => None,
            [key_type, blob, signature] => presented_key(key_type, blob, signature),
            _ => None,
        };

        Ok(Self { identity: identity.to_string(), key })
    }

    /// Keyless request (client side).
    pub fn anonymous(identity: impl Into<String>) -> Self {
        Self { identity: identity.into(), key: None }
    }

    /// Request signed with `signing_key` for `challenge` (client side).
    pub fn signed(
        identity: impl Into<String>,
        signing_key: &SigningKey,
        challenge: &Challenge,
    ) -> Self {
        let identity = identity.into();
        let signature = signing_key.sign(&challenge.signed_payload(&identity)).to_bytes().to_vec();
        let key = PublicKey::from_verifying_key(signing_key.verifying_key());
        Self { identity, key: Some(PresentedKey { key, signature }) }
    }

    /// Wire form, without line terminator.
    pub fn to_line(&self) -> String {
        match &self.key {
            None => format!("{AUTH_TAG} {}", self.identity),
            Some(presented) => format!(
                "{AUTH_TAG} {} {ED25519_KEY_TYPE} {} {}",
                self.identity,
                presented.key.to_base64(),
                STANDARD.encode(&presented.signature),
            ),
        }
    }

    /// Claimed display identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Presented key material, if any survived parsing.
    pub fn presented_key(&self) -> Option<&PresentedKey> {
        self.key.as_ref()
    }
}

fn presented_key(key_type: &str, blob: &str, signature: &str) -> Option<PresentedKey> {
    let key = PublicKey::from_parts(key_type, blob).ok()?;
    let signature = STANDARD.decode(signature).ok()?;
    Some(PresentedKey { key, signature })
}
