//! RSA key material for the storage and transit ciphers.

use crate::error::{Error, KeySourceError};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

/// Smallest modulus accepted for storage keys.
pub const MIN_KEY_BITS: usize = 1024;

/// Default modulus size for generated storage keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// OAEP overhead with SHA-256: two hash lengths plus two bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// Largest plaintext RSA-OAEP(SHA-256) accepts for a key of this size.
pub(crate) fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

/// The service's own keypair, loaded once and never mutated.
///
/// Cloning is cheap; clones share the same key material.
#[derive(Clone)]
pub struct StorageKeys {
    inner: Arc<KeyPair>,
}

struct KeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl StorageKeys {
    /// Builds the keypair from PEM text.
    ///
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`)
    /// public keys and PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1
    /// (`BEGIN RSA PRIVATE KEY`) private keys.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if either PEM cannot be parsed or
    /// the key is too small, and `KeySourceError::Mismatch` if the public key
    /// does not belong to the private key.
    pub fn from_pem(
        public_pem: &SecretString,
        private_pem: &SecretString,
    ) -> Result<Self, KeySourceError> {
        let public = parse_public_pem(public_pem.expose_secret())
            .ok_or_else(|| KeySourceError::Malformed("storage public key".to_string()))?;
        let private = parse_private_pem(private_pem.expose_secret())
            .ok_or_else(|| KeySourceError::Malformed("storage private key".to_string()))?;
        Self::from_parts(public, private)
    }

    /// Builds the keypair from a private key alone, deriving the public half.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if the PEM cannot be parsed.
    pub fn from_private_pem(private_pem: &SecretString) -> Result<Self, KeySourceError> {
        let private = parse_private_pem(private_pem.expose_secret())
            .ok_or_else(|| KeySourceError::Malformed("storage private key".to_string()))?;
        Self::from_parts(private.to_public_key(), private)
    }

    /// Generates a fresh keypair.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::GenerationFailed` if `bits` is below
    /// [`MIN_KEY_BITS`] or generation fails.
    pub fn generate(bits: usize) -> Result<Self, KeySourceError> {
        if bits < MIN_KEY_BITS {
            return Err(KeySourceError::GenerationFailed(format!(
                "key size {bits} is below the minimum of {MIN_KEY_BITS} bits"
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeySourceError::GenerationFailed(e.to_string()))?;
        Self::from_parts(private.to_public_key(), private)
    }

    fn from_parts(public: RsaPublicKey, private: RsaPrivateKey) -> Result<Self, KeySourceError> {
        private
            .validate()
            .map_err(|_| KeySourceError::Malformed("storage private key".to_string()))?;
        if private.size() * 8 < MIN_KEY_BITS {
            return Err(KeySourceError::Malformed(format!(
                "storage key is smaller than {MIN_KEY_BITS} bits"
            )));
        }
        if private.to_public_key() != public {
            return Err(KeySourceError::Mismatch);
        }
        Ok(Self { inner: Arc::new(KeyPair { public, private }) })
    }

    /// Returns the public half.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.inner.public
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.inner.private
    }

    /// Modulus size in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.inner.public.size() * 8
    }

    /// Largest plaintext, in bytes, the storage cipher accepts.
    #[must_use]
    pub fn max_plaintext_len(&self) -> usize {
        max_plaintext_len(&self.inner.public)
    }

    /// Encodes the public key as SPKI PEM.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if encoding fails.
    pub fn public_key_pem(&self) -> Result<String, KeySourceError> {
        self.inner
            .public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeySourceError::Malformed(format!("public key encoding: {e}")))
    }

    /// Encodes the private key as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceError::Malformed` if encoding fails.
    pub fn private_key_pem(&self) -> Result<SecretString, KeySourceError> {
        let pem = self
            .inner
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeySourceError::Malformed(format!("private key encoding: {e}")))?;
        Ok(SecretString::new(pem.as_str().to_owned()))
    }
}

impl fmt::Debug for StorageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageKeys").field("bits", &self.bits()).finish_non_exhaustive()
    }
}

/// A public key supplied by the recipient of transit ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct RecipientKey(RsaPublicKey);

impl RecipientKey {
    /// Parses a recipient public key from PEM (SPKI or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns `Error::Encryption` if the PEM is malformed or the key is
    /// smaller than [`MIN_KEY_BITS`].
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        parse_public_pem(pem)
            .ok_or_else(|| Error::Encryption("recipient public key is malformed".to_string()))?
            .try_into()
    }

    /// Parses a recipient key that may not have been supplied at all.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encryption` if the key is absent, blank or malformed.
    pub fn from_optional_pem(pem: Option<&str>) -> Result<Self, Error> {
        match pem.map(str::trim) {
            Some(pem) if !pem.is_empty() => Self::from_pem(pem),
            _ => Err(Error::Encryption("recipient public key is missing".to_string())),
        }
    }

    /// Largest plaintext, in bytes, this key can seal.
    #[must_use]
    pub fn max_plaintext_len(&self) -> usize {
        max_plaintext_len(&self.0)
    }

    pub(crate) const fn as_rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl TryFrom<RsaPublicKey> for RecipientKey {
    type Error = Error;

    fn try_from(key: RsaPublicKey) -> Result<Self, Error> {
        if key.size() * 8 < MIN_KEY_BITS {
            return Err(Error::Encryption(format!(
                "recipient public key is smaller than {MIN_KEY_BITS} bits"
            )));
        }
        Ok(Self(key))
    }
}

impl fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecipientKey").field(&(self.0.size() * 8)).finish()
    }
}

fn parse_public_pem(pem: &str) -> Option<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(pem).ok())
}

fn parse_private_pem(pem: &str) -> Option<RsaPrivateKey> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs1_pem(pem).ok())
}


#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};

    #[test]
    fn test_pem_round_trip() {
        let keys = test_keys::storage();
        let public_pem = SecretString::new(keys.public_key_pem().unwrap());
        let private_pem = keys.private_key_pem().unwrap();

        let loaded = StorageKeys::from_pem(&public_pem, &private_pem).unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
        assert_eq!(loaded.bits(), 1024);
    }

    #[test]
    fn test_pkcs1_pem_accepted() {
        let keys = test_keys::storage();
        let public_pem = keys.public_key().to_pkcs1_pem(LineEnding::LF).unwrap();
        let private_pem = keys.private_key().to_pkcs1_pem(LineEnding::LF).unwrap();

        let loaded = StorageKeys::from_pem(
            &SecretString::new(public_pem),
            &SecretString::new(private_pem.as_str().to_owned()),
        )
        .unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
    }

    #[test]
    fn test_from_private_pem_derives_public() {
        let keys = test_keys::storage();
        let loaded = StorageKeys::from_private_pem(&keys.private_key_pem().unwrap()).unwrap();
        assert_eq!(loaded.public_key(), keys.public_key());
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let keys = test_keys::storage();
        let other = test_keys::other();
        let result = StorageKeys::from_pem(
            &SecretString::new(other.public_key_pem().unwrap()),
            &keys.private_key_pem().unwrap(),
        );
        assert!(matches!(result, Err(KeySourceError::Mismatch)));
    }

    #[test]
    fn test_malformed_pem_rejected() {
        let garbage = SecretString::new("-----BEGIN PUBLIC KEY-----\nAAAA\n".to_string());
        let result = StorageKeys::from_pem(&garbage, &garbage);
        assert!(matches!(result, Err(KeySourceError::Malformed(_))));
    }

    #[test]
    fn test_small_key_generation_rejected() {
        let result = StorageKeys::generate(512);
        assert!(matches!(result, Err(KeySourceError::GenerationFailed(_))));
    }

    #[test]
    fn test_max_plaintext_len() {
        assert_eq!(test_keys::storage().max_plaintext_len(), 128 - 66);
    }

    #[test]
    fn test_recipient_key_missing() {
        for pem in [None, Some(""), Some("   \n")] {
            let err = RecipientKey::from_optional_pem(pem).unwrap_err();
            assert!(matches!(err, Error::Encryption(ref m) if m.contains("missing")));
        }
    }

    #[test]
    fn test_recipient_key_malformed() {
        let err = RecipientKey::from_pem("not a key").unwrap_err();
        assert!(matches!(err, Error::Encryption(ref m) if m.contains("malformed")));
    }

    #[test]
    fn test_recipient_key_too_small() {
        let weak = RsaPrivateKey::new(&mut OsRng, 512).unwrap().to_public_key();
        let pem = weak.to_public_key_pem(LineEnding::LF).unwrap();

        let err = RecipientKey::from_pem(&pem).unwrap_err();
        assert!(matches!(err, Error::Encryption(ref m) if m.contains("smaller than 1024")));
        assert!(RecipientKey::try_from(weak).is_err());
    }

    #[test]
    fn test_recipient_key_parses() {
        let pem = test_keys::other().public_key_pem().unwrap();
        let key = RecipientKey::from_optional_pem(Some(&pem)).unwrap();
        assert_eq!(key.as_rsa(), test_keys::other().public_key());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let rendered = format!("{:?}", test_keys::storage());
        assert!(rendered.starts_with("StorageKeys { bits: 1024"));
    }
}
