//! # Database Schema
//!
//! SQL schema for the local SQLite mirror.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │ schema_version  │    │       kv        │
//! ├─────────────────┤    ├─────────────────┤
//! │ version         │    │ key (PK)        │
//! └─────────────────┘    │ value           │
//!                        │ updated_at      │
//!                        └─────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Key/value pairs: cache entries, outbox, preferences
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    -- JSON text
    value TEXT NOT NULL,
    -- Unix timestamp of the last write
    updated_at INTEGER NOT NULL DEFAULT 0
);
"#;
