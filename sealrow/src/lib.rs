//! # `SealRow`
//!
//! Field-level encryption for user records: personal fields are unreadable
//! at rest, remain searchable by exact match, and can be re-encrypted for a
//! downstream recipient without exposing the service's private key.
//!
//! ## Features
//!
//! - RSA-OAEP (SHA-256) storage cipher with randomized padding
//! - SHA-256 or peppered HMAC-SHA256 digests for equality lookup
//! - Transit re-encryption under a recipient-supplied public key
//! - Per-field transit policy
//! - Store-enforced email uniqueness
//!
//! ## Example
//!
//! ```rust,ignore
//! use sealrow::prelude::*;
//!
//! let keys = EnvKeySource::default();
//! let service = RecordService::from_key_source(MemoryStore::new(), &keys)?;
//!
//! let ann = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor"))?;
//! let recipient = RecipientKey::from_pem(&client_pem)?;
//! let sealed = service.list_users_sealed(&recipient, None)?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod digest;
pub mod error;
pub mod key_source;
pub mod keys;
pub mod policy;
pub mod record;
pub mod service;
pub mod storage_cipher;
pub mod store;
pub mod transit_cipher;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::digest::{Digest, Digester};
    pub use crate::error::{Error, KeySourceError, StoreError};
    pub use crate::key_source::{EnvKeySource, KeySource, PemKeySource};
    pub use crate::keys::{RecipientKey, StorageKeys};
    pub use crate::policy::{Field, TransitPolicy};
    pub use crate::record::{FieldValue, NewRow, SealedUser, UserId, UserRecord, UserRow};
    pub use crate::service::{RecordService, ServiceConfig};
    pub use crate::storage_cipher::{StorageCipher, StorageCiphertext};
    pub use crate::store::{MemoryStore, RowStore};
    pub use crate::transit_cipher::{encrypt_transit, TransitCiphertext};
    pub use crate::validation::{NewUser, Role, UserSchema, ValidUser, Validator};
}
