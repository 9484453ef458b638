//! Record service: validation, digesting, encryption and persistence of
//! user records.

use crate::digest::Digester;
use crate::error::{Error, StoreError};
use crate::key_source::KeySource;
use crate::keys::{RecipientKey, StorageKeys};
use crate::policy::{Field, TransitPolicy};
use crate::record::{FieldValue, NewRow, SealedUser, UserId, UserRecord, UserRow};
use crate::storage_cipher::{StorageCipher, StorageCiphertext};
use crate::store::RowStore;
use crate::transit_cipher::encrypt_transit;
use crate::validation::{NewUser, Role, UserSchema, Validator};
use chrono::SecondsFormat;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Tunables for a [`RecordService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Fields sealed by [`RecordService::list_users_sealed`]
    pub transit_policy: TransitPolicy,
}

/// Orchestrates the envelope over a row store.
///
/// The service holds no per-request state; clones share the store and key
/// material and can be used from many threads at once.
///
/// # Example
///
/// ```rust,ignore
/// use sealrow::prelude::*;
///
/// let service = RecordService::new(MemoryStore::new(), StorageKeys::generate(2048)?);
/// let user = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor"))?;
/// assert_eq!(service.list_users()?, vec![user]);
/// ```
pub struct RecordService<S: RowStore> {
    store: Arc<S>,
    cipher: StorageCipher,
    digester: Digester,
    validator: Arc<dyn Validator>,
    config: ServiceConfig,
}

impl<S: RowStore> RecordService<S> {
    /// Creates a service with plain digests, the default schema and the
    /// default transit policy.
    pub fn new(store: S, keys: StorageKeys) -> Self {
        Self {
            store: Arc::new(store),
            cipher: StorageCipher::new(keys),
            digester: Digester::plain(),
            validator: Arc::new(UserSchema),
            config: ServiceConfig::default(),
        }
    }

    /// Creates a service whose keys and digest pepper come from `source`.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeySource` if the source cannot supply usable keys.
    pub fn from_key_source(store: S, source: &dyn KeySource) -> Result<Self, Error> {
        let keys = source.storage_keys()?;
        let digester = match source.pepper()? {
            Some(pepper) => Digester::with_pepper(&pepper)?,
            None => Digester::plain(),
        };
        debug!(bits = keys.bits(), keyed_digest = digester.is_keyed(), "storage keys loaded");
        Ok(Self::new(store, keys).with_digester(digester))
    }

    /// Replaces the digester.
    #[must_use]
    pub fn with_digester(mut self, digester: Digester) -> Self {
        self.digester = digester;
        self
    }

    /// Replaces the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates, encrypts and stores a new user.
    ///
    /// A known email is rejected before any encryption work. The store still
    /// enforces uniqueness on the email digest at insert, so two concurrent
    /// adds of the same address cannot both succeed.
    ///
    /// # Errors
    ///
    /// - `Error::BadInput` if validation fails
    /// - `Error::Encryption` if a field is too large for the storage key
    /// - `Error::Conflict` if the email is already registered
    /// - `Error::Storage` on store failure
    pub fn add_user(&self, candidate: &NewUser) -> Result<UserRecord, Error> {
        let user = self.validator.validate(candidate).map_err(|e| {
            warn!(error = %e, "rejected user candidate");
            e
        })?;

        let email_hash = self.digester.digest(&user.email);
        let existing =
            self.store.find_by_digest(&email_hash).map_err(|e| store_failure("look up user", e))?;
        if !existing.is_empty() {
            warn!("email digest already present");
            return Err(Error::Conflict);
        }

        let row = NewRow {
            name: self.cipher.encrypt(&user.name)?,
            email: self.cipher.encrypt(&user.email)?,
            email_hash,
            role: user.role,
        };

        let stored = self.store.insert(row).map_err(|e| store_failure("insert user", e))?;
        debug!(user_id = stored.id, role = %stored.role, "user added");

        Ok(UserRecord {
            id: stored.id,
            name: user.name,
            email: user.email,
            role: stored.role,
            created_at: stored.created_at,
        })
    }

    /// Returns every user, decrypted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on store failure and `Error::Decryption` if a
    /// stored field cannot be decrypted.
    pub fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
        self.fetch(None)
    }

    /// Returns the users holding `role`, decrypted.
    ///
    /// # Errors
    ///
    /// Same as [`list_users`](Self::list_users).
    pub fn list_users_by_role(&self, role: Role) -> Result<Vec<UserRecord>, Error> {
        self.fetch(Some(role))
    }

    /// Returns users, optionally filtered by role, with the fields selected
    /// by the transit policy sealed under `recipient`.
    ///
    /// # Errors
    ///
    /// Same as [`list_users`](Self::list_users), plus `Error::Encryption` if a
    /// field exceeds the recipient key's size bound.
    pub fn list_users_sealed(
        &self,
        recipient: &RecipientKey,
        role: Option<Role>,
    ) -> Result<Vec<SealedUser>, Error> {
        self.fetch(role)?.iter().map(|record| self.seal_record(record, recipient)).collect()
    }

    /// Looks a user up by exact email, without scanning or decrypting other
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on store failure and `Error::Decryption` if the
    /// matching row cannot be decrypted.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, Error> {
        let digest = self.digester.digest(email);
        let rows = self
            .store
            .find_by_digest(&digest)
            .map_err(|e| store_failure("look up user", e))?;
        rows.into_iter().next().map(|row| self.open_row(row)).transpose()
    }

    /// Deletes the user with `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no row was deleted and `Error::Storage` on
    /// store failure.
    pub fn delete_user(&self, id: UserId) -> Result<(), Error> {
        let affected = self.store.delete_by_id(id).map_err(|e| store_failure("delete user", e))?;
        if affected == 0 {
            warn!(user_id = id, "delete target not found");
            return Err(Error::NotFound);
        }
        debug!(user_id = id, "user deleted");
        Ok(())
    }

    /// Seals the fields of `record` selected by the transit policy.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encryption` if a field exceeds the recipient key's size
    /// bound.
    pub fn seal_record(
        &self,
        record: &UserRecord,
        recipient: &RecipientKey,
    ) -> Result<SealedUser, Error> {
        let policy = self.config.transit_policy;
        let emit = |field: Field, value: String| -> Result<FieldValue, Error> {
            if policy.seals(field) {
                encrypt_transit(&value, recipient).map(FieldValue::Sealed)
            } else {
                Ok(FieldValue::Plain(value))
            }
        };

        Ok(SealedUser {
            id: emit(Field::Id, record.id.to_string())?,
            name: emit(Field::Name, record.name.clone())?,
            email: emit(Field::Email, record.email.clone())?,
            role: emit(Field::Role, record.role.to_string())?,
            created_at: emit(
                Field::CreatedAt,
                record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )?,
        })
    }

    fn fetch(&self, role: Option<Role>) -> Result<Vec<UserRecord>, Error> {
        let rows = self.store.select_all(role).map_err(|e| store_failure("fetch users", e))?;
        rows.into_iter().map(|row| self.open_row(row)).collect()
    }

    fn open_row(&self, row: UserRow) -> Result<UserRecord, Error> {
        let decrypt = |field: &str, value: &StorageCiphertext| {
            self.cipher.decrypt(value).map_err(|e| {
                error!(user_id = row.id, field, "stored field failed to decrypt");
                e
            })
        };
        let name = decrypt("name", &row.name)?;
        let email = decrypt("email", &row.email)?;

        Ok(UserRecord { id: row.id, name, email, role: row.role, created_at: row.created_at })
    }
}

impl<S: RowStore> Clone for RecordService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cipher: self.cipher.clone(),
            digester: self.digester.clone(),
            validator: Arc::clone(&self.validator),
            config: self.config,
        }
    }
}

fn store_failure(operation: &str, err: StoreError) -> Error {
    match err {
        StoreError::DuplicateDigest => {
            warn!(operation, "email digest already present");
            Error::Conflict
        }
        other => {
            error!(operation, error = %other, "row store failure");
            Error::Storage(format!("unable to {operation}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys;
    use crate::store::MemoryStore;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use rsa::Oaep;
    use sha2::Sha256;

    fn service() -> RecordService<MemoryStore> {
        RecordService::new(MemoryStore::new(), test_keys::storage())
    }

    fn recipient() -> RecipientKey {
        RecipientKey::try_from(test_keys::other().public_key().clone()).unwrap()
    }

    fn open(value: &FieldValue) -> String {
        let sealed = value.as_sealed().expect("field should be sealed");
        let raw = STANDARD.decode(sealed.as_str()).unwrap();
        let plain =
            test_keys::other().private_key().decrypt(Oaep::new::<Sha256>(), &raw).unwrap();
        String::from_utf8(plain).unwrap()
    }

    struct FailingStore;

    impl RowStore for FailingStore {
        fn find_by_digest(&self, _: &crate::digest::Digest) -> Result<Vec<UserRow>, StoreError> {
            Err(StoreError::Backend("connection refused: secret-host:3306".to_string()))
        }

        fn insert(&self, _: NewRow) -> Result<UserRow, StoreError> {
            Err(StoreError::Backend("connection refused: secret-host:3306".to_string()))
        }

        fn select_all(&self, _: Option<Role>) -> Result<Vec<UserRow>, StoreError> {
            Err(StoreError::Backend("connection refused: secret-host:3306".to_string()))
        }

        fn delete_by_id(&self, _: UserId) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection refused: secret-host:3306".to_string()))
        }
    }

    #[test]
    fn test_add_list_delete_scenario() {
        let service = service();

        let added = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();
        assert_eq!(added.name, "Ann");
        assert_eq!(added.email, "ann@x.com");
        assert_eq!(added.role, Role::Editor);

        let users = service.list_users().unwrap();
        assert_eq!(users, vec![added.clone()]);

        let dup = service.add_user(&NewUser::new("Ann Again", "ann@x.com", "Viewer"));
        assert!(matches!(dup, Err(Error::Conflict)));

        service.delete_user(added.id).unwrap();
        assert!(service.list_users().unwrap().iter().all(|u| u.id != added.id));
    }

    #[test]
    fn test_fields_encrypted_at_rest() {
        let service = service();
        let added = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        let rows = service.store().select_all(None).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, added.id);
        assert_ne!(row.name.as_str(), "Ann");
        assert_ne!(row.email.as_str(), "ann@x.com");
        assert_eq!(row.email_hash, crate::digest::digest("ann@x.com"));
    }

    #[test]
    fn test_bad_input_stores_nothing() {
        let service = service();
        let result = service.add_user(&NewUser::new("Ann", "not-an-email", "Editor"));
        assert!(matches!(result, Err(Error::BadInput(_))));
        assert!(service.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_name_is_encryption_error() {
        let service = service();
        let long_name = "N".repeat(200);
        let result = service.add_user(&NewUser::new(long_name, "ann@x.com", "Editor"));
        assert!(matches!(result, Err(Error::Encryption(_))));
        assert!(service.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_with_oversized_name_is_conflict() {
        let service = service();
        service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        let long_name = "N".repeat(200);
        let result = service.add_user(&NewUser::new(long_name, "ann@x.com", "Editor"));
        assert!(matches!(result, Err(Error::Conflict)));
        assert_eq!(service.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        assert!(matches!(service().delete_user(42), Err(Error::NotFound)));
    }

    #[test]
    fn test_list_by_role() {
        let service = service();
        service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();
        service.add_user(&NewUser::new("Bob", "bob@x.com", "Admin")).unwrap();
        service.add_user(&NewUser::new("Cy", "cy@x.com", "Editor")).unwrap();

        let editors = service.list_users_by_role(Role::Editor).unwrap();
        assert_eq!(editors.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), vec!["Ann", "Cy"]);
        assert!(service.list_users_by_role(Role::Viewer).unwrap().is_empty());
    }

    #[test]
    fn test_find_user_by_email() {
        let service = service();
        let added = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        assert_eq!(service.find_user_by_email("ann@x.com").unwrap(), Some(added));
        assert_eq!(service.find_user_by_email("bob@x.com").unwrap(), None);
    }

    #[test]
    fn test_sealed_listing_default_policy() {
        let service = service();
        let added = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        let sealed = service.list_users_sealed(&recipient(), None).unwrap();
        assert_eq!(sealed.len(), 1);
        let user = &sealed[0];
        assert_eq!(open(&user.id), added.id.to_string());
        assert_eq!(open(&user.name), "Ann");
        assert_eq!(open(&user.email), "ann@x.com");
        assert_eq!(open(&user.role), "Editor");
        assert!(user.created_at.as_plain().is_some());
    }

    #[test]
    fn test_sealed_listing_custom_policy() {
        let config = ServiceConfig { transit_policy: TransitPolicy::secrets_only() };
        let service = service().with_config(config);
        service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();
        service.add_user(&NewUser::new("Bob", "bob@x.com", "Viewer")).unwrap();

        let sealed = service.list_users_sealed(&recipient(), Some(Role::Viewer)).unwrap();
        assert_eq!(sealed.len(), 1);
        assert_eq!(open(&sealed[0].name), "Bob");
        assert_eq!(sealed[0].role.as_plain(), Some("Viewer"));
        assert_eq!(sealed[0].id.as_plain(), Some("2"));
    }

    #[test]
    fn test_undecryptable_row_is_decryption_error() {
        let writer = service();
        writer.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        let reader = RecordService {
            store: Arc::clone(&writer.store),
            cipher: StorageCipher::new(test_keys::other()),
            digester: Digester::plain(),
            validator: Arc::new(UserSchema),
            config: ServiceConfig::default(),
        };
        assert!(matches!(reader.list_users(), Err(Error::Decryption)));
    }

    #[test]
    fn test_store_failure_hides_driver_text() {
        let service = RecordService::new(FailingStore, test_keys::storage());

        let err = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.to_string().contains("secret-host"));

        assert!(matches!(service.list_users(), Err(Error::Storage(_))));
        assert!(matches!(service.delete_user(1), Err(Error::Storage(_))));
        assert!(matches!(service.find_user_by_email("ann@x.com"), Err(Error::Storage(_))));
    }

    #[test]
    fn test_peppered_digest_used_for_uniqueness() {
        let pepper = secrecy::SecretVec::new(vec![5u8; 32]);
        let service = service().with_digester(Digester::with_pepper(&pepper).unwrap());
        service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap();

        let row = &service.store().select_all(None).unwrap()[0];
        assert_ne!(row.email_hash, crate::digest::digest("ann@x.com"));
        assert!(service.find_user_by_email("ann@x.com").unwrap().is_some());
        assert!(matches!(
            service.add_user(&NewUser::new("Ann", "ann@x.com", "Admin")),
            Err(Error::Conflict)
        ));
    }

    #[test]
    fn test_custom_validator() {
        struct RejectAll;

        impl Validator for RejectAll {
            fn validate(&self, _: &NewUser) -> Result<crate::validation::ValidUser, Error> {
                Err(Error::BadInput("closed for registration".to_string()))
            }
        }

        let service = service().with_validator(RejectAll);
        let err = service.add_user(&NewUser::new("Ann", "ann@x.com", "Editor")).unwrap_err();
        assert_eq!(err.to_string(), "invalid input: closed for registration");
    }
}
