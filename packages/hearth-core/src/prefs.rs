//! # Local Preferences
//!
//! Device-only preferences: pinned items, tags and unsent note drafts. None
//! of this reaches the backend. Pins and tags are scoped to the active
//! family; drafts are keyed by note.
//!
//! Unreadable values read as empty, and a write without an active family is
//! an error rather than a silent no-op.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::Result;
use crate::state::AppState;
use crate::storage::{KeyValueStore, KeyValueStoreExt, PrefKind, StorageKey};

type TagMap = BTreeMap<String, Vec<String>>;

/// Pins, tags and drafts stored on this device
pub struct LocalPrefs {
    store: Arc<dyn KeyValueStore>,
    state: Arc<AppState>,
}

impl LocalPrefs {
    /// Create preferences over `store`
    pub fn new(store: Arc<dyn KeyValueStore>, state: Arc<AppState>) -> Self {
        Self { store, state }
    }

    // ========================================================================
    // PINS
    // ========================================================================

    /// Pinned ids of `kind`
    pub fn pins(&self, kind: PrefKind) -> BTreeSet<String> {
        match self.state.family_id() {
            Ok(family_id) => self.store.get_json_or_default(&StorageKey::pins(kind, &family_id)),
            Err(_) => BTreeSet::new(),
        }
    }

    /// Whether `id` is pinned
    pub fn is_pinned(&self, kind: PrefKind, id: &str) -> bool {
        self.pins(kind).contains(id)
    }

    /// Pin or unpin `id`. Returns whether it is pinned afterwards.
    pub fn toggle_pin(&self, kind: PrefKind, id: &str) -> Result<bool> {
        let key = StorageKey::pins(kind, &self.state.family_id()?);
        let mut pins: BTreeSet<String> = self.store.get_json_or_default(&key);
        let pinned = if pins.remove(id) {
            false
        } else {
            pins.insert(id.to_string());
            true
        };
        self.store.set_json(&key, &pins)?;
        Ok(pinned)
    }

    /// Stable sort putting pinned items first
    pub fn sort_pinned_first<T, F>(&self, kind: PrefKind, items: &mut [T], id_of: F)
    where
        F: Fn(&T) -> &str,
    {
        let pins = self.pins(kind);
        if pins.is_empty() {
            return;
        }
        items.sort_by_key(|item| !pins.contains(id_of(item)));
    }

    // ========================================================================
    // TAGS
    // ========================================================================

    /// Tags of every item of `kind`
    pub fn tags(&self, kind: PrefKind) -> TagMap {
        match self.state.family_id() {
            Ok(family_id) => self.store.get_json_or_default(&StorageKey::tags(kind, &family_id)),
            Err(_) => TagMap::new(),
        }
    }

    /// Tags of one item
    pub fn tags_for(&self, kind: PrefKind, id: &str) -> Vec<String> {
        self.tags(kind).remove(id).unwrap_or_default()
    }

    /// Replace the tags of `id`. Blank and repeated tags are dropped; an
    /// empty list removes the entry.
    pub fn set_tags<S: AsRef<str>>(&self, kind: PrefKind, id: &str, tags: &[S]) -> Result<()> {
        let key = StorageKey::tags(kind, &self.state.family_id()?);
        let mut map: TagMap = self.store.get_json_or_default(&key);

        let mut cleaned: Vec<String> = Vec::new();
        for tag in tags.iter().map(|t| t.as_ref().trim()).filter(|t| !t.is_empty()) {
            if !cleaned.iter().any(|c| c == tag) {
                cleaned.push(tag.to_string());
            }
        }

        if cleaned.is_empty() {
            map.remove(id);
        } else {
            map.insert(id.to_string(), cleaned);
        }
        self.store.set_json(&key, &map)
    }

    /// Every tag used for `kind`, sorted
    pub fn all_tags(&self, kind: PrefKind) -> Vec<String> {
        let all: BTreeSet<String> = self.tags(kind).into_values().flatten().collect();
        all.into_iter().collect()
    }

    // ========================================================================
    // DRAFTS
    // ========================================================================

    /// Keep unsent paragraph text for `note_id`
    pub fn save_draft(&self, note_id: &str, content: &str) -> Result<()> {
        self.store.set(StorageKey::note_draft(note_id).as_str(), content)
    }

    /// Unsent paragraph text for `note_id`
    pub fn draft(&self, note_id: &str) -> Option<String> {
        match self.store.get(StorageKey::note_draft(note_id).as_str()) {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(note_id, error = %e, "Failed to read draft");
                None
            }
        }
    }

    /// Drop the draft for `note_id`
    pub fn clear_draft(&self, note_id: &str) -> Result<bool> {
        self.store.remove(StorageKey::note_draft(note_id).as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::error::Error;
    use crate::storage::MemoryStore;

    fn prefs() -> (Arc<MemoryStore>, Arc<AppState>, LocalPrefs) {
        let store = Arc::new(MemoryStore::new());
        let state = Arc::new(AppState::new(&SyncConfig::default()));
        *state.family_id.write() = Some("f1".into());
        let prefs = LocalPrefs::new(store.clone(), state.clone());
        (store, state, prefs)
    }

    #[test]
    fn test_toggle_pin() {
        let (_, _, prefs) = prefs();
        assert!(prefs.toggle_pin(PrefKind::Notes, "n1").unwrap());
        assert!(prefs.is_pinned(PrefKind::Notes, "n1"));
        assert!(!prefs.is_pinned(PrefKind::Books, "n1"));
        assert!(!prefs.toggle_pin(PrefKind::Notes, "n1").unwrap());
        assert!(prefs.pins(PrefKind::Notes).is_empty());
    }

    #[test]
    fn test_pins_are_per_family() {
        let (_, state, prefs) = prefs();
        prefs.toggle_pin(PrefKind::Books, "b1").unwrap();

        *state.family_id.write() = Some("f2".into());
        assert!(!prefs.is_pinned(PrefKind::Books, "b1"));

        *state.family_id.write() = None;
        assert!(matches!(prefs.toggle_pin(PrefKind::Books, "b1"), Err(Error::NoFamilySelected)));
    }

    #[test]
    fn test_sort_pinned_first_is_stable() {
        let (_, _, prefs) = prefs();
        prefs.toggle_pin(PrefKind::Activities, "c").unwrap();
        prefs.toggle_pin(PrefKind::Activities, "a").unwrap();

        let mut ids = vec!["a", "b", "c", "d"];
        prefs.sort_pinned_first(PrefKind::Activities, &mut ids, |id| *id);
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_tags_cleaned_and_unioned() {
        let (_, _, prefs) = prefs();
        prefs.set_tags(PrefKind::Notes, "n1", &["school", " ", "school", "urgent"]).unwrap();
        prefs.set_tags(PrefKind::Notes, "n2", &["home"]).unwrap();

        assert_eq!(prefs.tags_for(PrefKind::Notes, "n1"), vec!["school", "urgent"]);
        assert_eq!(prefs.all_tags(PrefKind::Notes), vec!["home", "school", "urgent"]);

        prefs.set_tags::<&str>(PrefKind::Notes, "n2", &[]).unwrap();
        assert_eq!(prefs.all_tags(PrefKind::Notes), vec!["school", "urgent"]);
    }

    #[test]
    fn test_corrupt_values_read_empty() {
        let (store, _, prefs) = prefs();
        store.set(StorageKey::pins(PrefKind::Notes, "f1").as_str(), "{oops").unwrap();
        store.set(StorageKey::tags(PrefKind::Notes, "f1").as_str(), "[1,2]").unwrap();

        assert!(prefs.pins(PrefKind::Notes).is_empty());
        assert!(prefs.tags(PrefKind::Notes).is_empty());
        assert!(prefs.toggle_pin(PrefKind::Notes, "n1").unwrap());
    }

    #[test]
    fn test_drafts() {
        let (_, _, prefs) = prefs();
        assert_eq!(prefs.draft("n1"), None);
        prefs.save_draft("n1", "<p>half</p>").unwrap();
        assert_eq!(prefs.draft("n1").as_deref(), Some("<p>half</p>"));
        assert!(prefs.clear_draft("n1").unwrap());
        assert_eq!(prefs.draft("n1"), None);
    }
}
