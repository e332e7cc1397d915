//! # Cached Fetch
//!
//! Wraps a remote read with a local mirror. A read never surfaces an error
//! to the caller; it degrades.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           CACHED FETCH                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  remote read ──ok──► parse ──ok──► store rows under key ──► Live       │
//! │       │                │           hide offline banner                 │
//! │       │ err            │ err                                            │
//! │       ▼                ▼                                                │
//! │  offline?  ──yes──► OfflineBanner { visible: true }                    │
//! │       │ no                                                              │
//! │       └────────► Notice { "Failed to load data" }                      │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  cached entry ──parses──► Cache                                        │
//! │       │ missing / corrupt / no key                                      │
//! │       └──────────────────► Empty                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::events::{emit, EventSender, SyncEvent};
use crate::remote::{parse_rows, Connectivity};
use crate::storage::{KeyValueStore, StorageKey};

/// Notice shown when a read fails while the device looks online
pub const LOAD_FAILED_NOTICE: &str = "Failed to load data";

/// Where the rows of a [`FetchOutcome`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Fresh from the remote store
    Live,
    /// Last successful response stored locally
    Cache,
    /// Nothing usable
    Empty,
}

/// Result of a cached read
#[derive(Debug, Clone)]
pub struct FetchOutcome<T> {
    /// Rows to show; never absent
    pub rows: Vec<T>,
    /// Where they came from
    pub source: FetchSource,
    /// Why the live read failed, if it did
    pub error: Option<Error>,
}

impl<T> FetchOutcome<T> {
    /// Whether the rows are fresh
    pub fn is_live(&self) -> bool {
        self.source == FetchSource::Live
    }

    /// Whether the read failed and rows are stale or empty
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Remote reads with a local fallback
pub struct CachedFetch {
    store: Arc<dyn KeyValueStore>,
    connectivity: Connectivity,
    events: EventSender,
    banner_visible: AtomicBool,
}

impl CachedFetch {
    /// Create a fetcher
    pub fn new(store: Arc<dyn KeyValueStore>, connectivity: Connectivity, events: EventSender) -> Self {
        Self {
            store,
            connectivity,
            events,
            banner_visible: AtomicBool::new(false),
        }
    }

    /// Whether the offline banner is currently raised
    pub fn offline_banner(&self) -> bool {
        self.banner_visible.load(Ordering::SeqCst)
    }

    /// Run `read`; on success mirror its rows under `key`, on failure fall
    /// back to the mirror.
    ///
    /// Passing `None` as the key skips both mirroring and fallback; used for
    /// searches and deeper pages, which are not the shape the cache holds.
    pub async fn fetch<T, F>(&self, key: Option<&StorageKey>, read: F) -> FetchOutcome<T>
    where
        T: DeserializeOwned,
        F: Future<Output = Result<Vec<Value>>>,
    {
        let error = match read.await {
            Ok(raw) => match self.accept(key, raw) {
                Ok(rows) => {
                    return FetchOutcome {
                        rows,
                        source: FetchSource::Live,
                        error: None,
                    }
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        self.report_failure(key, &error);
        let (rows, source) = self.fallback(key);
        FetchOutcome {
            rows,
            source,
            error: Some(error),
        }
    }

    fn accept<T: DeserializeOwned>(&self, key: Option<&StorageKey>, raw: Vec<Value>) -> Result<Vec<T>> {
        let serialized = serde_json::to_string(&raw)?;
        let rows = parse_rows(raw)?;

        if let Some(key) = key {
            if let Err(e) = self.store.set(key.as_str(), &serialized) {
                tracing::warn!(key = %key, error = %e, "Failed to mirror response");
            }
        }
        self.set_banner(false);
        Ok(rows)
    }

    fn report_failure(&self, key: Option<&StorageKey>, error: &Error) {
        if !self.connectivity.is_online() {
            tracing::debug!(key = ?key.map(StorageKey::as_str), "Read failed while offline");
            self.set_banner(true);
        } else {
            tracing::warn!(key = ?key.map(StorageKey::as_str), error = %error, "Read failed");
            emit(
                &self.events,
                SyncEvent::Notice {
                    message: LOAD_FAILED_NOTICE.to_string(),
                },
            );
        }
    }

    fn fallback<T: DeserializeOwned>(&self, key: Option<&StorageKey>) -> (Vec<T>, FetchSource) {
        let Some(key) = key else {
            return (Vec::new(), FetchSource::Empty);
        };

        let raw = match self.store.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (Vec::new(), FetchSource::Empty),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return (Vec::new(), FetchSource::Empty);
            }
        };

        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(rows) => {
                tracing::debug!(key = %key, rows = rows.len(), "Serving rows from cache");
                (rows, FetchSource::Cache)
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Ignoring corrupt cache entry");
                (Vec::new(), FetchSource::Empty)
            }
        }
    }

    /// Raise or drop the offline banner, emitting only on change
    pub(crate) fn set_banner(&self, visible: bool) {
        if self.banner_visible.swap(visible, Ordering::SeqCst) != visible {
            emit(&self.events, SyncEvent::OfflineBanner { visible });
        }
    }
}
