//! Persistence for subscription records.
//!
//! Records are stored as JSON text, one row per user. The store does not
//! parse them; deciding what to do with a malformed record is the service's
//! job. [`SqliteStore`] is the durable implementation and [`MemoryStore`]
//! keeps everything in a map.

mod memory;
pub mod migrations;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::user::UserId;

pub use memory::MemoryStore;

/// Durable storage for per-user record blobs.
pub trait RecordStore: Send + fmt::Debug {
    /// Load the raw record for `user`, or `None` if none was ever saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn load_raw(&self, user: &UserId) -> Result<Option<String>>;

    /// Insert or replace the raw record for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write does not reach storage.
    fn save_raw(&mut self, user: &UserId, record: &str, updated_at: DateTime<Utc>) -> Result<()>;

    /// Store `record` for `user` only if nothing is stored yet.
    ///
    /// Returns `true` if the record was inserted. An existing record is never
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the write does not reach storage.
    fn insert_if_absent(
        &mut self,
        user: &UserId,
        record: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// All users with a stored record, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn list_users(&self) -> Result<Vec<UserId>>;
}

/// `SQLite`-backed record store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a database at `path`.
    ///
    /// Creates parent directories as needed and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { conn })
    }

    /// Create an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStore {
    fn load_raw(&self, user: &UserId) -> Result<Option<String>> {
        let record = self
            .conn
            .query_row(
                "SELECT record FROM subscriptions WHERE user_id = ?1",
                [user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(record)
    }

    fn save_raw(&mut self, user: &UserId, record: &str, updated_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO subscriptions (user_id, record, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            ",
            params![
                user.as_str(),
                record,
                updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
            ],
        )?;
        debug!(user = %user, "Saved subscription record");
        Ok(())
    }

    fn insert_if_absent(
        &mut self,
        user: &UserId,
        record: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn.execute(
            r"
            INSERT INTO subscriptions (user_id, record, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO NOTHING
            ",
            params![
                user.as_str(),
                record,
                updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
            ],
        )?;
        Ok(affected > 0)
    }

    fn list_users(&self) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM subscriptions ORDER BY updated_at DESC, user_id ASC")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids
            .into_iter()
            .filter_map(|id| match UserId::new(id) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Skipping stored row with {e}");
                    None
                }
            })
            .collect())
    }
}
