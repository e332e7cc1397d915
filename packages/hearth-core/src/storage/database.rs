//! # SQLite Store
//!
//! [`KeyValueStore`] backed by a single SQLite table.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  CachedFetch    │                                                   │
//! │  │  OutboundQueue  │  JSON text under StorageKey                       │
//! │  │  LocalPrefs     │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SqliteStore   │  get / set / remove / keys_with_prefix            │
//! │  │   (this file)   │  schema created on open                          │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{schema, KeyValueStore};
use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// SQLite-backed key/value store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the schema, or check the one on disk
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .ok()
            .flatten();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v != schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Unsupported schema version {} (expected {})",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema is current (version {})", v);
            }
        }

        Ok(())
    }

    /// Current schema version on disk
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock();
        let version = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
        Ok(version)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| Error::StorageReadError(format!("{}: {}", key, e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_timestamp()],
        )
        .map_err(|e| Error::StorageWriteError(format!("{}: {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM kv WHERE key = ?", params![key])
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", key, e)))?;
        Ok(removed > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?) = ? ORDER BY key")?;
        let rows = stmt.query_map(params![prefix.chars().count() as i64, prefix], |row| {
            row.get::<_, String>(0)
        })?;
        let keys = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::StorageReadError(e.to_string()))?;
        Ok(keys)
    }
}
