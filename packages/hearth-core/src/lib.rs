//! # Hearth Core
//!
//! The offline/online synchronization layer of a family organizer: shared
//! books, notes, activities and direct messages, readable from a local
//! mirror when the backend is out of reach.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         HEARTH CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │   Family    │  │   Content   │  │ Activities  │  │    Prefs     │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Context   │  │ - Books     │  │ - Create    │  │ - Pins       │   │
//! │  │ - Join code │  │ - Notes     │  │ - RSVP      │  │ - Tags       │   │
//! │  │ - Requests  │  │ - Paragraphs│  │ - Reminders │  │ - Drafts     │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │                        ┌─────────▼─────────┐                            │
//! │                        │    SyncClient     │  AppState, SyncEvent       │
//! │                        └─────────┬─────────┘                            │
//! │                                  │                                      │
//! │  ┌─────────────┐  ┌──────────────▼──────────────┐  ┌────────────────┐  │
//! │  │   Storage   │  │            Sync             │  │     Remote     │  │
//! │  │             │◄─┤                             ├─►│                │  │
//! │  │ - SQLite kv │  │ - Cached fetch + fallback   │  │ - RemoteStore  │  │
//! │  │ - Memory kv │  │ - Outbound message queue    │  │ - Realtime     │  │
//! │  │ - Keys      │  │ - Invalidation listener     │  │ - Connectivity │  │
//! │  └─────────────┘  │ - Pagination cursors        │  │ - MemoryBackend│  │
//! │                   └─────────────────────────────┘  └────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Page sizes and other tunables
//! - [`storage`] - Local key/value persistence
//! - [`remote`] - Backend interfaces and the in-memory backend
//! - [`sync`] - Cached reads, outbox, realtime invalidation, pagination
//! - [`state`] - Application state shared with the UI
//! - [`client`] - The [`SyncClient`] tying it all together
//! - [`family`], [`content`], [`activities`], [`prefs`], [`profile`] - Domain operations
//!
//! ## Failure Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WHEN THINGS FAIL                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Read fails       → last mirrored rows (or nothing), banner or notice  │
//! │  Send fails       → message waits in the outbox until back online      │
//! │  RSVP fails       → answer kept on the device                          │
//! │  Channel drops    → no retry; the next refresh rebinds                 │
//! │  Cache corrupt    → treated as empty                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod activities;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod family;
pub mod logging;
pub mod model;
pub mod prefs;
pub mod profile;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use client::{LoadSummary, SendOutcome, SyncClient};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use events::SyncEvent;
pub use remote::{MemoryBackend, Realtime, RemoteStore};
pub use state::{AppState, ListKind, Session, View};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{FetchMode, FetchSource, HasMorePolicy};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Hearth Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        target: "unknown",
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target OS
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
    }
}
