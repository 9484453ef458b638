//! Row store abstraction and an in-memory implementation.

use crate::digest::Digest;
use crate::error::StoreError;
use crate::record::{NewRow, UserId, UserRow};
use crate::validation::Role;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Persistence for encrypted user rows.
///
/// Implementations must be thread-safe (`Send + Sync`) and must enforce
/// uniqueness of `email_hash` atomically inside [`insert`](Self::insert).
pub trait RowStore: Send + Sync {
    /// Returns all rows whose `email_hash` equals `digest`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on I/O failure.
    fn find_by_digest(&self, digest: &Digest) -> Result<Vec<UserRow>, StoreError>;

    /// Inserts a row and returns it with its assigned `id` and `created_at`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateDigest` if a row with the same
    /// `email_hash` already exists, `StoreError::Backend` on I/O failure.
    fn insert(&self, row: NewRow) -> Result<UserRow, StoreError>;

    /// Returns all rows ordered by `id`, optionally only those with `role`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on I/O failure and
    /// `StoreError::CorruptRow` if a stored row cannot be read back.
    fn select_all(&self, role: Option<Role>) -> Result<Vec<UserRow>, StoreError>;

    /// Deletes the row with `id` and returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on I/O failure.
    fn delete_by_id(&self, id: UserId) -> Result<u64, StoreError>;
}

/// In-memory row store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: UserId,
    rows: BTreeMap<UserId, UserRow>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl RowStore for MemoryStore {
    fn find_by_digest(&self, digest: &Digest) -> Result<Vec<UserRow>, StoreError> {
        let state = self.lock()?;
        Ok(state.rows.values().filter(|row| &row.email_hash == digest).cloned().collect())
    }

    fn insert(&self, row: NewRow) -> Result<UserRow, StoreError> {
        let mut state = self.lock()?;
        if state.rows.values().any(|existing| existing.email_hash == row.email_hash) {
            return Err(StoreError::DuplicateDigest);
        }

        state.next_id += 1;
        let stored = UserRow {
            id: state.next_id,
            name: row.name,
            email: row.email,
            email_hash: row.email_hash,
            role: row.role,
            created_at: Utc::now(),
        };
        state.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn select_all(&self, role: Option<Role>) -> Result<Vec<UserRow>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .rows
            .values()
            .filter(|row| role.map_or(true, |r| row.role == r))
            .cloned()
            .collect())
    }

    fn delete_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        Ok(u64::from(state.rows.remove(&id).is_some()))
    }
}
