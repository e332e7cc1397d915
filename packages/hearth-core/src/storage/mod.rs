//! # Storage Module
//!
//! Local-first persistence for Hearth: the cache mirror, the outbox and the
//! device-only preferences all live in one string key/value store.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  StorageKey (keys.rs)                                           │   │
//! │  │  ─────────────────────                                           │   │
//! │  │  hearth.cache.<kind>.<family>[.<peer>]   server response mirror │   │
//! │  │  hearth.queue.messages.<family>.<user>   outbox                 │   │
//! │  │  hearth.last.family                      last selected family   │   │
//! │  │  hearth.pins / tags / rsvp / reminders / draft                  │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyValueStore (trait)                                          │   │
//! │  │  get / set / remove / keys_with_prefix                          │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │                  │                             │                        │
//! │                  ▼                             ▼                        │
//! │  ┌───────────────────────────┐   ┌───────────────────────────┐         │
//! │  │  MemoryStore              │   │  SqliteStore              │         │
//! │  │  RwLock<HashMap>          │   │  rusqlite, `kv` table     │         │
//! │  │  tests, ephemeral hosts   │   │  file or in-memory        │         │
//! │  └───────────────────────────┘   └───────────────────────────┘         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are JSON text. There is no atomicity beyond a single key.

mod database;
mod keys;
mod memory;
mod schema;

pub use database::SqliteStore;
pub use keys::{CacheKind, PrefKind, StorageKey, KEY_PREFIX};
pub use memory::MemoryStore;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// String key/value storage used for every local-first concern
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// JSON helpers available on every [`KeyValueStore`]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and parse a JSON value.
    ///
    /// A value that fails to parse is reported as [`Error::StorageCorrupted`].
    fn get_json<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        match self.get(key.as_str())? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::StorageCorrupted(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Read a JSON value, treating missing or corrupt entries as the default
    fn get_json_or_default<T: DeserializeOwned + Default>(&self, key: &StorageKey) -> T {
        match self.get_json(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring unreadable local value");
                T::default()
            }
        }
    }

    /// Serialize and write a JSON value
    fn set_json<T: Serialize + ?Sized>(&self, key: &StorageKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key.as_str(), &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Open the store described by `path`: SQLite at that path, or in-memory SQLite
pub fn open_store(path: Option<&str>) -> Result<Arc<dyn KeyValueStore>> {
    let store = SqliteStore::open(path)?;
    Ok(Arc::new(store))
}
