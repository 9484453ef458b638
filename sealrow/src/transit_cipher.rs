//! Re-encryption of outbound fields under a recipient's public key.
//!
//! The service never holds the recipient's private key, so it cannot read
//! back what it produces here. There is no decrypt counterpart.

use crate::error::Error;
use crate::keys::RecipientKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;

/// Base64 RSA-OAEP ciphertext bound to a recipient-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitCiphertext(String);

impl TransitCiphertext {
    /// Returns the base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransitCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encrypts `plain` for the holder of `recipient`'s private key.
///
/// # Errors
///
/// Returns `Error::Encryption` if the plaintext exceeds the recipient key's
/// size bound or the RSA operation fails.
pub fn encrypt_transit(plain: &str, recipient: &RecipientKey) -> Result<TransitCiphertext, Error> {
    let limit = recipient.max_plaintext_len();
    if plain.len() > limit {
        return Err(Error::Encryption(format!(
            "plaintext is {} bytes, the recipient key accepts at most {limit}",
            plain.len()
        )));
    }

    let ciphertext = recipient
        .as_rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plain.as_bytes())
        .map_err(|e| {
            debug!(error = %e, "transit encryption failed");
            Error::Encryption("transit encryption failed".to_string())
        })?;

    Ok(TransitCiphertext(STANDARD.encode(ciphertext)))
}

/// Encrypts `plain` for a recipient whose key arrives as optional PEM text.
///
/// # Errors
///
/// Returns `Error::Encryption` if the key is missing or malformed, or if
/// [`encrypt_transit`] fails.
pub fn encrypt_transit_pem(
    plain: &str,
    recipient_pem: Option<&str>,
) -> Result<TransitCiphertext, Error> {
    let recipient = RecipientKey::from_optional_pem(recipient_pem)?;
    encrypt_transit(plain, &recipient)
}
