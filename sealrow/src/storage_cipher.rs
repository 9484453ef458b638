//! At-rest field encryption under the service's own RSA keypair.
//!
//! Fields are encrypted with RSA-OAEP (SHA-256) and stored as base64 text.
//! OAEP padding is randomized, so encrypting the same value twice yields
//! different ciphertexts; equality lookup goes through the
//! [`digest`](crate::digest) column instead.
//!
//! Every decryption failure (bad base64, wrong key, padding failure, invalid
//! UTF-8) surfaces as the same [`Error::Decryption`] so callers cannot tell
//! them apart.

use crate::error::Error;
use crate::keys::StorageKeys;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// Base64 RSA-OAEP ciphertext bound to the storage keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageCiphertext(String);

impl StorageCiphertext {
    /// Wraps base64 text read back from storage. No validation is done here;
    /// malformed values fail at decryption time.
    #[must_use]
    pub fn from_base64(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encrypts and decrypts fields with the storage keypair.
///
/// # Example
///
/// ```rust,ignore
/// use sealrow::keys::StorageKeys;
/// use sealrow::storage_cipher::StorageCipher;
///
/// let cipher = StorageCipher::new(StorageKeys::generate(2048)?);
/// let sealed = cipher.encrypt("ann@x.com")?;
/// assert_eq!(cipher.decrypt(&sealed)?, "ann@x.com");
/// ```
#[derive(Debug, Clone)]
pub struct StorageCipher {
    keys: StorageKeys,
}

impl StorageCipher {
    /// Creates a cipher over the given keypair.
    #[must_use]
    pub const fn new(keys: StorageKeys) -> Self {
        Self { keys }
    }

    /// Returns the keypair this cipher uses.
    #[must_use]
    pub const fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Encrypts a plaintext field.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encryption` if the plaintext is longer than
    /// [`StorageKeys::max_plaintext_len`] or the RSA operation fails.
    pub fn encrypt(&self, plain: &str) -> Result<StorageCiphertext, Error> {
        let limit = self.keys.max_plaintext_len();
        if plain.len() > limit {
            return Err(Error::Encryption(format!(
                "plaintext is {} bytes, the storage key accepts at most {limit}",
                plain.len()
            )));
        }

        let ciphertext = self
            .keys
            .public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plain.as_bytes())
            .map_err(|e| {
                debug!(error = %e, "storage encryption failed");
                Error::Encryption("storage encryption failed".to_string())
            })?;

        Ok(StorageCiphertext(STANDARD.encode(ciphertext)))
    }

    /// Decrypts a field previously produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `Error::Decryption` for any malformed, foreign or tampered
    /// ciphertext.
    pub fn decrypt(&self, cipher: &StorageCiphertext) -> Result<String, Error> {
        let raw = STANDARD.decode(cipher.as_str()).map_err(|_| Error::Decryption)?;

        let plain = self
            .keys
            .private_key()
            .decrypt(Oaep::new::<Sha256>(), &raw)
            .map(Zeroizing::new)
            .map_err(|_| Error::Decryption)?;

        std::str::from_utf8(&plain).map(str::to_owned).map_err(|_| Error::Decryption)
    }
}
