//! Storage layer for skylog.
//!
//! Persistence goes through the [`KeyValueStore`] trait: string values
//! addressed by string keys, written whole. [`Storage`] is the `SQLite`
//! implementation used by the application; [`MemoryStore`] keeps values in
//! memory.

pub mod migrations;
pub mod repository;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use repository::{LogSnapshot, SavedLog, SavedLogRepository};

/// A local persistent key-value store.
pub trait KeyValueStore: Send {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Returns whether a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&mut self, key: &str) -> Result<bool>;
}

/// `SQLite`-backed key-value store.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
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
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
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

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored keys, most recently written first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_store ORDER BY updated_at DESC, key ASC")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// When `key` was last written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM kv_store WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref().and_then(parse_timestamp))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (keys, value_bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM kv_store",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let last_write: Option<String> = self
            .conn
            .query_row("SELECT MAX(updated_at) FROM kv_store", [], |row| row.get(0))?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            keys,
            value_bytes,
            last_write: last_write.as_deref().and_then(parse_timestamp),
            db_size_bytes,
            schema_version: migrations::schema_version(&self.conn)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl KeyValueStore for Storage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                r"
                INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .map_err(|e| Error::storage_write(key, e.to_string()))?;
        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of stored keys.
    pub keys: i64,
    /// Total size of stored values in bytes.
    pub value_bytes: i64,
    /// Time of the most recent write.
    pub last_write: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
    /// Schema version of the database.
    pub schema_version: i32,
}

/// A [`KeyValueStore`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.values.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_set_and_get() {
        let mut storage = create_test_storage();
        storage.set("skylog_saved_logs", "[]").unwrap();
        assert_eq!(
            storage.get("skylog_saved_logs").unwrap().as_deref(),
            Some("[]")
        );
        assert!(storage.updated_at("skylog_saved_logs").unwrap().is_some());
    }

    #[test]
    fn test_get_missing_key() {
        let storage = create_test_storage();
        assert!(storage.get("missing").unwrap().is_none());
        assert!(storage.updated_at("missing").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_value() {
        let mut storage = create_test_storage();
        storage.set("k", "one").unwrap();
        storage.set("k", "two").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("two"));
        assert_eq!(storage.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_remove() {
        let mut storage = create_test_storage();
        storage.set("k", "v").unwrap();
        assert!(storage.remove("k").unwrap());
        assert!(!storage.remove("k").unwrap());
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let mut storage = create_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.value_bytes, 0);
        assert!(stats.last_write.is_none());
        assert_eq!(stats.schema_version, migrations::CURRENT_VERSION);

        storage.set("a", "12345").unwrap();
        storage.set("b", "xy").unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.value_bytes, 7);
        assert!(stats.last_write.is_some());
    }

    #[test]
    fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("skylog-test-{}", std::process::id()));
        let path = dir.join("nested").join("skylog.db");
        {
            let mut storage = Storage::open(&path).unwrap();
            storage.set("k", "persisted").unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("persisted"));
        assert!(storage.stats().unwrap().db_size_bytes > 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }
}
