//! Storage key layout.
//!
//! Every key lives under the `hearth.` namespace and is scoped to a family
//! (and to a peer or user where that matters), so switching families never
//! reads another family's data.

use std::fmt;

/// Namespace prefix of every key
pub const KEY_PREFIX: &str = "hearth";

/// Server collections mirrored in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Notes list
    Notes,
    /// Books list
    Books,
    /// Activities list
    Activities,
    /// Member profiles
    Members,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Notes => "notes",
            CacheKind::Books => "books",
            CacheKind::Activities => "activities",
            CacheKind::Members => "members",
        }
    }
}

/// Item kinds that carry device-local pins and tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKind {
    /// Notes
    Notes,
    /// Books
    Books,
    /// Activities
    Activities,
}

impl PrefKind {
    fn as_str(&self) -> &'static str {
        match self {
            PrefKind::Notes => "notes",
            PrefKind::Books => "books",
            PrefKind::Activities => "activities",
        }
    }
}

/// A fully built storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    fn build(parts: &[&str]) -> Self {
        let mut key = String::from(KEY_PREFIX);
        for part in parts {
            key.push('.');
            key.push_str(part);
        }
        Self(key)
    }

    /// `hearth.cache.<kind>.<family>`
    pub fn cache(kind: CacheKind, family_id: &str) -> Self {
        Self::build(&["cache", kind.as_str(), family_id])
    }

    /// `hearth.cache.messages.<family>.<peer>`
    pub fn conversation(family_id: &str, peer_id: &str) -> Self {
        Self::build(&["cache", "messages", family_id, peer_id])
    }

    /// `hearth.queue.messages.<family>.<user>`
    pub fn outbox(family_id: &str, user_id: &str) -> Self {
        Self::build(&["queue", "messages", family_id, user_id])
    }

    /// `hearth.last.family`
    pub fn last_family() -> Self {
        Self::build(&["last", "family"])
    }

    /// `hearth.pending.join_code`
    pub fn pending_join_code() -> Self {
        Self::build(&["pending", "join_code"])
    }

    /// `hearth.pins.<kind>.<family>`
    pub fn pins(kind: PrefKind, family_id: &str) -> Self {
        Self::build(&["pins", kind.as_str(), family_id])
    }

    /// `hearth.tags.<kind>.<family>`
    pub fn tags(kind: PrefKind, family_id: &str) -> Self {
        Self::build(&["tags", kind.as_str(), family_id])
    }

    /// `hearth.rsvp.<family>.<activity>`
    pub fn rsvp(family_id: &str, activity_id: &str) -> Self {
        Self::build(&["rsvp", family_id, activity_id])
    }

    /// `hearth.reminders.activities.<family>`
    pub fn reminders(family_id: &str) -> Self {
        Self::build(&["reminders", "activities", family_id])
    }

    /// `hearth.draft.note.<note>`
    pub fn note_draft(note_id: &str) -> Self {
        Self::build(&["draft", "note", note_id])
    }

    /// The key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
