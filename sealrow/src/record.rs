//! User record shapes: plaintext, persisted and transit-sealed.

use crate::digest::Digest;
use crate::storage_cipher::StorageCiphertext;
use crate::transit_cipher::TransitCiphertext;
use crate::validation::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row identifier assigned by the store.
pub type UserId = i64;

/// The logical, plaintext view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A row as it sits in the store. Name and email are ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: UserId,
    pub name: StorageCiphertext,
    pub email: StorageCiphertext,
    pub email_hash: Digest,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A row about to be inserted; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub name: StorageCiphertext,
    pub email: StorageCiphertext,
    pub email_hash: Digest,
    pub role: Role,
}

/// One output field, sealed for the recipient or passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Sealed(TransitCiphertext),
    Plain(String),
}

impl FieldValue {
    /// Returns the plaintext if the field was not sealed.
    #[must_use]
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain(v) => Some(v),
            Self::Sealed(_) => None,
        }
    }

    /// Returns the ciphertext if the field was sealed.
    #[must_use]
    pub const fn as_sealed(&self) -> Option<&TransitCiphertext> {
        match self {
            Self::Sealed(c) => Some(c),
            Self::Plain(_) => None,
        }
    }
}

/// A user record prepared for a downstream recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedUser {
    pub id: FieldValue,
    pub name: FieldValue,
    pub email: FieldValue,
    pub role: FieldValue,
    pub created_at: FieldValue,
}
