//! Searchable digests for equality lookup on encrypted fields.
//!
//! A digest is a deterministic one-way commitment of a plaintext value. It is
//! stored next to the ciphertext so that "does this email already exist?" is
//! an indexed equality query instead of a decrypt-and-compare scan.
//!
//! Two modes are supported:
//!
//! - **Plain**: `hex(SHA-256(value))`
//! - **Peppered**: `hex(HMAC-SHA256(pepper, value))`, which prevents offline
//!   dictionary attacks against a leaked table

use crate::error::{Error, KeySourceError};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::{Digest as _, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of a digest in hexadecimal characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hex-encoded digest of a plaintext field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Wraps a digest string read back from storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the value is not a 64-character lowercase
    /// hex string.
    pub fn from_hex(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        let well_formed = value.len() == DIGEST_HEX_LEN
            && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(Error::Storage("stored digest is not a valid hex digest".to_string()));
        }
        Ok(Self(value))
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes digests, optionally keyed with a secret pepper.
#[derive(Clone, Default)]
pub struct Digester {
    keyed: Option<HmacSha256>,
}

impl Digester {
    /// Creates a digester producing plain SHA-256 digests.
    #[must_use]
    pub const fn plain() -> Self {
        Self { keyed: None }
    }

    /// Creates a digester keyed with the given pepper.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if the pepper is empty.
    pub fn with_pepper(pepper: &SecretVec<u8>) -> Result<Self, KeySourceError> {
        if pepper.expose_secret().is_empty() {
            return Err(KeySourceError::Malformed("digest pepper is empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(pepper.expose_secret())
            .map_err(|e| KeySourceError::Malformed(format!("digest pepper: {e}")))?;
        Ok(Self { keyed: Some(mac) })
    }

    /// Returns `true` if digests are keyed with a pepper.
    #[must_use]
    pub const fn is_keyed(&self) -> bool {
        self.keyed.is_some()
    }

    /// Computes the digest of `value`.
    #[must_use]
    pub fn digest(&self, value: &str) -> Digest {
        let bytes = match &self.keyed {
            Some(mac) => {
                let mut mac = mac.clone();
                mac.update(value.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            None => Sha256::digest(value.as_bytes()).to_vec(),
        };
        Digest(hex::encode(bytes))
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester").field("keyed", &self.is_keyed()).finish()
    }
}

/// Computes the plain SHA-256 digest of `value`.
#[must_use]
pub fn digest(value: &str) -> Digest {
    Digester::plain().digest(value)
}
