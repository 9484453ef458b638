//! Error types for `SealRow` operations.

use std::fmt;

/// Main error type for `SealRow` operations.
///
/// Messages carried by the variants are composed by this crate and are safe
/// to hand to callers. Underlying library or driver errors are logged where
/// they occur and never embedded here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candidate record failed validation
    #[error("invalid input: {0}")]
    BadInput(String),

    /// A record with the same email digest already exists
    #[error("email already registered")]
    Conflict,

    /// The record to delete does not exist
    #[error("user not found")]
    NotFound,

    /// Plaintext too large for the key, or key material unusable
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Ciphertext malformed or bound to another keypair
    #[error("decryption failed")]
    Decryption,

    /// Row store I/O failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Key material could not be loaded
    #[error("key source error: {0}")]
    KeySource(#[from] KeySourceError),
}

impl Error {
    /// Returns `true` for errors caused by the caller's input rather than a
    /// server-side fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::BadInput(_) | Self::Conflict | Self::NotFound)
    }
}

/// Errors raised while loading key material.
#[derive(Debug)]
pub enum KeySourceError {
    /// A required key is not configured
    Missing(String),

    /// Key material exists but cannot be parsed
    Malformed(String),

    /// The public key does not belong to the private key
    Mismatch,

    /// Key generation failed
    GenerationFailed(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeySourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => write!(f, "key not configured: {what}"),
            Self::Malformed(what) => write!(f, "malformed key material: {what}"),
            Self::Mismatch => write!(f, "public key does not match private key"),
            Self::GenerationFailed(msg) => write!(f, "key generation failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeySourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeySourceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors reported by a [`RowStore`](crate::store::RowStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert rejected because the digest column already holds the value
    #[error("duplicate email digest")]
    DuplicateDigest,

    /// A stored row could not be mapped back into a `UserRow`
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// Backend I/O or driver failure
    #[error("backend failure: {0}")]
    Backend(String),
}
