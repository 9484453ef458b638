//! SQLite row store for `SealRow`.
//!
//! Rows are kept in a single `users` table. The `email_hash` column carries a
//! UNIQUE constraint, so duplicate detection happens inside the same
//! statement as the insert and concurrent adds of one email cannot both land.
//!
//! # Example
//!
//! ```rust,no_run
//! use sealrow_sqlite::SqliteStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("users.db")?;
//! // let service = RecordService::new(store, keys);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use sealrow::digest::Digest;
use sealrow::error::StoreError;
use sealrow::record::{NewRow, UserId, UserRow};
use sealrow::storage_cipher::StorageCiphertext;
use sealrow::store::RowStore;
use sealrow::validation::Role;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

const SELECT_COLUMNS: &str = "SELECT id, name, email, email_hash, role, created_at FROM users";

/// Errors specific to the SQLite backend.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Driver error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database was written by a newer schema
    #[error("unsupported schema version: {found} (supported: {SCHEMA_VERSION})")]
    UnsupportedSchema {
        /// The version recorded in the database
        found: i32,
    },

    /// Connection mutex poisoned by a panicking thread
    #[error("connection lock poisoned")]
    LockPoisoned,

    /// A stored row could not be decoded
    #[error("corrupt row {id}: {reason}")]
    CorruptRow {
        /// Row id
        id: UserId,
        /// What was wrong with it
        reason: String,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::DuplicateDigest
            }
            SqliteStoreError::CorruptRow { .. } => Self::CorruptRow(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// SQLite-backed [`RowStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, SqliteStoreError> {
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.conn.lock().map_err(|_| SqliteStoreError::LockPoisoned)
    }

    fn select(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<UserRow>, SqliteStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let raw = stmt
            .query_map(params, |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    email_hash: row.get(3)?,
                    role: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRow::decode).collect()
    }
}

impl RowStore for SqliteStore {
    fn find_by_digest(&self, digest: &Digest) -> Result<Vec<UserRow>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE email_hash = ?1");
        Ok(self.select(&sql, params![digest.as_str()])?)
    }

    fn insert(&self, row: NewRow) -> Result<UserRow, StoreError> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, email, email_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.name.as_str(),
                row.email.as_str(),
                row.email_hash.as_str(),
                row.role.as_str(),
                created_at,
            ],
        )
        .map_err(SqliteStoreError::from)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        debug!(user_id = id, "row inserted");

        Ok(UserRow {
            id,
            name: row.name,
            email: row.email,
            email_hash: row.email_hash,
            role: row.role,
            created_at: parse_timestamp(id, &created_at)?,
        })
    }

    fn select_all(&self, role: Option<Role>) -> Result<Vec<UserRow>, StoreError> {
        let rows = match role {
            Some(role) => {
                let sql = format!("{SELECT_COLUMNS} WHERE role = ?1 ORDER BY id");
                self.select(&sql, params![role.as_str()])?
            }
            None => self.select(&format!("{SELECT_COLUMNS} ORDER BY id"), [])?,
        };
        Ok(rows)
    }

    fn delete_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let affected = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(SqliteStoreError::from)?;
        Ok(affected as u64)
    }
}

struct RawRow {
    id: UserId,
    name: String,
    email: String,
    email_hash: String,
    role: String,
    created_at: String,
}

impl RawRow {
    fn decode(self) -> Result<UserRow, SqliteStoreError> {
        let id = self.id;
        let corrupt = |reason: &str| SqliteStoreError::CorruptRow { id, reason: reason.to_string() };

        Ok(UserRow {
            id,
            name: StorageCiphertext::from_base64(self.name),
            email: StorageCiphertext::from_base64(self.email),
            email_hash: Digest::from_hex(self.email_hash).map_err(|_| corrupt("bad email_hash"))?,
            role: self.role.parse().map_err(|_| corrupt("unknown role"))?,
            created_at: parse_timestamp(id, &self.created_at)?,
        })
    }
}

fn parse_timestamp(id: UserId, value: &str) -> Result<DateTime<Utc>, SqliteStoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| SqliteStoreError::CorruptRow { id, reason: "bad created_at".to_string() })
}

fn migrate(conn: &Connection) -> Result<(), SqliteStoreError> {
    conn.execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)", [])?;

    let current: i32 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;

    if current > SCHEMA_VERSION {
        return Err(SqliteStoreError::UnsupportedSchema { found: current });
    }
    if current < 1 {
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS users (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL,
                 email TEXT NOT NULL,
                 email_hash TEXT NOT NULL UNIQUE,
                 role TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
             INSERT INTO schema_version (version) VALUES (1);
             COMMIT;",
        )?;
        debug!(version = SCHEMA_VERSION, "sqlite schema created");
    }
    Ok(())
}
