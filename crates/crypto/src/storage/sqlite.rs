//! SQLite-backed [`KvStore`].

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use crate::error::CryptoError;
use crate::storage::migrations::run_migrations;
use crate::storage::KvStore;

/// Persistent store in a single SQLite file.
///
/// `secure_delete` is on so removed values (the private key in particular) are
/// overwritten on disk rather than left in free pages.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn configure_connection(conn: &Connection) -> Result<(), CryptoError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;
         PRAGMA secure_delete=ON;",
    )?;
    Ok(())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SqliteStore {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, CryptoError> {
        let conn = Connection::open(path)
            .map_err(|e| CryptoError::Storage(format!("failed to open {}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CryptoError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CryptoError> {
        configure_connection(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CryptoError> {
        self.conn
            .lock()
            .map_err(|e| CryptoError::Storage(format!("local store lock poisoned: {e}")))
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, CryptoError> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, unix_now()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize, CryptoError> {
        let conn = self.lock()?;
        // substr instead of LIKE: prefixes may contain `%` or `_`.
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
            [prefix],
        )?;
        Ok(removed)
    }
}
