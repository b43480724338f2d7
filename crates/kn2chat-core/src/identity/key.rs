//! Ed25519 public keys in OpenSSH format and their fingerprints.
//!
//! Keys travel as OpenSSH wire blobs (`string "ssh-ed25519"`, `string key`,
//! each string prefixed by a big-endian u32 length). A [`Fingerprint`] is the
//! SHA-256 of that blob, printed the way `ssh-keygen -l` prints it:
//! `SHA256:` followed by unpadded base64.

use std::{fmt, str::FromStr};

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::KeyError;

/// The only key algorithm accepted.
pub const ED25519_KEY_TYPE: &str = "ssh-ed25519";

const FINGERPRINT_PREFIX: &str = "SHA256:";

/// An Ed25519 public key presented by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Wrap an already-decoded verifying key.
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse an `authorized_keys` style line: `ssh-ed25519 <base64> [comment]`.
    pub fn parse_openssh(line: &str) -> Result<Self, KeyError> {
        let mut fields = line.split_whitespace();
        let key_type = fields.next().ok_or(KeyError::Empty)?;
        let encoded = fields.next().ok_or(KeyError::MalformedBlob("missing key data"))?;
        Self::from_parts(key_type, encoded)
    }

    /// Parse a key from its type name and base64 blob.
    pub fn from_parts(key_type: &str, encoded: &str) -> Result<Self, KeyError> {
        if key_type != ED25519_KEY_TYPE {
            return Err(KeyError::UnsupportedType(key_type.to_string()));
        }

        let blob = STANDARD.decode(encoded).map_err(|_| KeyError::Base64)?;
        Self::from_blob(&blob)
    }

    /// Parse an OpenSSH wire-format blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self, KeyError> {
        let (key_type, rest) = read_string(blob)?;
        if key_type != ED25519_KEY_TYPE.as_bytes() {
            return Err(KeyError::UnsupportedType(String::from_utf8_lossy(key_type).into_owned()));
        }

        let (raw, rest) = read_string(rest)?;
        if !rest.is_empty() {
            return Err(KeyError::MalformedBlob("trailing bytes"));
        }

        let raw: &[u8; 32] =
            raw.try_into().map_err(|_| KeyError::MalformedBlob("key is not 32 bytes"))?;
        let key = VerifyingKey::from_bytes(raw).map_err(|_| KeyError::InvalidPoint)?;

        Ok(Self { key })
    }

    /// OpenSSH wire-format blob.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(4 + ED25519_KEY_TYPE.len() + 4 + 32);
        write_string(&mut blob, ED25519_KEY_TYPE.as_bytes());
        write_string(&mut blob, self.key.as_bytes());
        blob
    }

    /// Base64 of the wire blob, as it appears in `authorized_keys`.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_blob())
    }

    /// `ssh-ed25519 <base64>` without a comment.
    pub fn to_openssh(&self) -> String {
        format!("{ED25519_KEY_TYPE} {}", self.to_base64())
    }

    /// SHA-256 fingerprint of the wire blob.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(Sha256::digest(self.to_blob()).into())
    }

    /// Check an Ed25519 signature over `message`.
    ///
    /// Returns `false` for malformed signatures as well as wrong ones.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        Signature::from_slice(signature).is_ok_and(|sig| self.key.verify(message, &sig).is_ok())
    }

    /// Underlying verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}

/// SHA-256 fingerprint of a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FINGERPRINT_PREFIX}{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .trim()
            .strip_prefix(FINGERPRINT_PREFIX)
            .ok_or_else(|| KeyError::InvalidFingerprint(s.to_string()))?;

        let digest = STANDARD_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|_| KeyError::InvalidFingerprint(s.to_string()))?;

        let digest: [u8; 32] =
            digest.try_into().map_err(|_| KeyError::InvalidFingerprint(s.to_string()))?;

        Ok(Self(digest))
    }
}

fn read_string(buf: &[u8]) -> Result<(&[u8], &[u8]), KeyError> {
    let (len, rest) = buf.split_first_chunk::<4>().ok_or(KeyError::MalformedBlob("truncated"))?;
    let len = u32::from_be_bytes(*len) as usize;
    if rest.len() < len {
        return Err(KeyError::MalformedBlob("truncated"));
    }
    Ok(rest.split_at(len))
}

fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    /// Key shipped in the example allow-set.
    const BROEMP_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIPneKBhbjx1rVlhaNehDGsOBAh5r0vupuyTyQ+luSOVw ";

    fn test_key(seed: u8) -> (SigningKey, PublicKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public = PublicKey::from_verifying_key(signing.verifying_key());
        (signing, public)
    }

    #[test]
    fn parses_real_openssh_key() {
        let key = PublicKey::parse_openssh(BROEMP_KEY).unwrap();
        assert_eq!(key.to_openssh(), BROEMP_KEY.trim());
    }

    #[test]
    fn openssh_line_roundtrips_with_comment() {
        let (_, key) = test_key(1);
        let line = format!("{} user@host", key.to_openssh());
        assert_eq!(PublicKey::parse_openssh(&line).unwrap(), key);
    }

    #[test]
    fn rejects_other_algorithms() {
        let err = PublicKey::parse_openssh("ssh-rsa AAAAB3NzaC1yc2E=").unwrap_err();
        assert_eq!(err, KeyError::UnsupportedType("ssh-rsa".into()));
    }

    #[test]
    fn rejects_truncated_blob() {
        let (_, key) = test_key(2);
        let blob = key.to_blob();
        for cut in [0, 3, 10, blob.len() - 1] {
            assert!(PublicKey::from_blob(&blob[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let (_, key) = test_key(3);
        let mut blob = key.to_blob();
        blob.push(0);
        assert_eq!(PublicKey::from_blob(&blob), Err(KeyError::MalformedBlob("trailing bytes")));
    }

    #[test]
    fn rejects_bad_base64() {
        assert_eq!(PublicKey::from_parts(ED25519_KEY_TYPE, "!!!"), Err(KeyError::Base64));
    }

    #[test]
    fn fingerprint_display_parses_back() {
        let (_, key) = test_key(4);
        let fp = key.fingerprint();
        let text = fp.to_string();
        assert!(text.starts_with("SHA256:"));
        assert!(!text.ends_with('='));
        assert_eq!(text.parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn distinct_keys_have_distinct_fingerprints() {
        let (_, a) = test_key(5);
        let (_, b) = test_key(6);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_rejects_garbage() {
        assert!("MD5:abcd".parse::<Fingerprint>().is_err());
        assert!("SHA256:abcd".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn verifies_signatures() {
        let (signing, key) = test_key(7);
        let sig = signing.sign(b"nonce");
        assert!(key.verify(b"nonce", &sig.to_bytes()));
        assert!(!key.verify(b"other", &sig.to_bytes()));
        assert!(!key.verify(b"nonce", &[0u8; 10]));
    }
}
