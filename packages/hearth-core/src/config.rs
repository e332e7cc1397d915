//! # Configuration
//!
//! Tunables for the sync layer. Every field has a default, so a config file
//! only needs to name what it overrides.
//!
//! ```json
//! { "database_path": "/var/lib/hearth/local.db", "conversation_page_size": 50 }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::HasMorePolicy;

/// Default page size for the books, notes and activities lists
pub const DEFAULT_LIST_PAGE_SIZE: usize = 20;

/// Default page size for a conversation
pub const DEFAULT_CONVERSATION_PAGE_SIZE: usize = 30;

/// Default number of paragraphs per preview chunk
pub const DEFAULT_PREVIEW_CHUNK_SIZE: usize = 10;

/// Default join code length
pub const DEFAULT_JOIN_CODE_LENGTH: usize = 10;

/// Families listed when the user has no memberships yet
pub const DEFAULT_FAMILY_FALLBACK_LIMIT: usize = 50;

/// Configuration for a [`SyncClient`](crate::SyncClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path to the local SQLite mirror (None for in-memory)
    pub database_path: Option<String>,
    /// Page size for the books list
    pub books_page_size: usize,
    /// Page size for the notes list
    pub notes_page_size: usize,
    /// Page size for the activities list
    pub activities_page_size: usize,
    /// Page size for a conversation
    pub conversation_page_size: usize,
    /// Page size for the notes of an open book
    pub book_notes_page_size: usize,
    /// Paragraphs per note preview chunk
    pub preview_chunk_size: usize,
    /// How "has more" is decided for paginated lists
    pub has_more_policy: HasMorePolicy,
    /// Length of generated join codes
    pub join_code_length: usize,
    /// How many families to list for a user without memberships
    pub family_fallback_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            books_page_size: DEFAULT_LIST_PAGE_SIZE,
            notes_page_size: DEFAULT_LIST_PAGE_SIZE,
            activities_page_size: DEFAULT_LIST_PAGE_SIZE,
            conversation_page_size: DEFAULT_CONVERSATION_PAGE_SIZE,
            book_notes_page_size: DEFAULT_LIST_PAGE_SIZE,
            preview_chunk_size: DEFAULT_PREVIEW_CHUNK_SIZE,
            has_more_policy: HasMorePolicy::Heuristic,
            join_code_length: DEFAULT_JOIN_CODE_LENGTH,
            family_fallback_limit: DEFAULT_FAMILY_FALLBACK_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pagination layer cannot work with
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("books_page_size", self.books_page_size),
            ("notes_page_size", self.notes_page_size),
            ("activities_page_size", self.activities_page_size),
            ("conversation_page_size", self.conversation_page_size),
            ("book_notes_page_size", self.book_notes_page_size),
            ("preview_chunk_size", self.preview_chunk_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if self.join_code_length < 4 {
            return Err(Error::InvalidConfig(
                "join_code_length must be at least 4".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.books_page_size, 20);
        assert_eq!(config.conversation_page_size, 30);
        assert_eq!(config.has_more_policy, HasMorePolicy::Heuristic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            SyncConfig::from_json_str(r#"{"conversation_page_size": 50, "has_more_policy": "exact"}"#)
                .unwrap();
        assert_eq!(config.conversation_page_size, 50);
        assert_eq!(config.has_more_policy, HasMorePolicy::Exact);
        assert_eq!(config.notes_page_size, DEFAULT_LIST_PAGE_SIZE);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = SyncConfig::from_json_str(r#"{"notes_page_size": 0}"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
