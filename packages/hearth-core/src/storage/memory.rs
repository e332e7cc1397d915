//! # Memory Store
//!
//! A [`KeyValueStore`] backed by a `HashMap`. Nothing survives the process;
//! use it for tests and for hosts that bring their own persistence.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::KeyValueStore;
use crate::error::Result;

/// In-memory key/value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.values.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .values
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("hearth.last.family", "f1").unwrap();
        store.set("hearth.last.family", "f2").unwrap();
        assert_eq!(store.get("hearth.last.family").unwrap().as_deref(), Some("f2"));
        assert_eq!(store.len(), 1);

        assert!(store.remove("hearth.last.family").unwrap());
        assert!(!store.remove("hearth.last.family").unwrap());
    }

    #[test]
    fn test_prefix_listing() {
        let store = MemoryStore::new();
        store.set("hearth.draft.note.b", "x").unwrap();
        store.set("hearth.draft.note.a", "y").unwrap();
        store.set("hearth.pins.notes.f1", "[]").unwrap();

        assert_eq!(
            store.keys_with_prefix("hearth.draft.").unwrap(),
            vec!["hearth.draft.note.a".to_string(), "hearth.draft.note.b".to_string()]
        );
    }
}
