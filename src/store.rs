//! Calculator Vault - Durable Key-Value Store
//!
//! Credentials and the file listing live as string values under fixed keys,
//! the same shape a mobile key-value store offers. The SQLite backend keeps
//! them in a single table.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::VaultResult;

/// String-keyed durable storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> VaultResult<()>;
    fn remove(&self, key: &str) -> VaultResult<()>;
}

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> VaultResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Throwaway in-memory database
    pub fn in_memory() -> VaultResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
