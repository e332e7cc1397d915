//! # Remote Module
//!
//! Seams to the hosted backend: a CRUD store, a change feed and a
//! connectivity hint. Everything above this module talks to traits, so the
//! hosted service can be swapped for [`MemoryBackend`] in tests or in a
//! purely local mode.
//!
//! ## Remote Interfaces
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         REMOTE INTERFACES                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  RemoteStore                                                           │
//! │  ├── select(Query)            → rows                                   │
//! │  ├── insert(table, row)       → inserted row                           │
//! │  ├── update(Query, patch)     → affected count                         │
//! │  ├── upsert(table, row, keys) → stored row                             │
//! │  ├── delete(Query)            → affected count                         │
//! │  └── count(Query)             → matching count                         │
//! │                                                                         │
//! │  Realtime                                                              │
//! │  └── subscribe(ChannelSpec)   → Subscription (drop = unsubscribe)      │
//! │                                                                         │
//! │  Connectivity                                                          │
//! │  └── online/offline hint (watch channel), not a source of truth       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod connectivity;
mod memory;
pub mod query;

pub use connectivity::Connectivity;
pub use memory::MemoryBackend;
pub use query::{Filter, Order, Query, Range};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Structured CRUD access to the hosted database
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read rows
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// Insert one row, returning it as stored (with generated columns)
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Merge `patch` into every row matched by `query`
    async fn update(&self, query: &Query, patch: Value) -> Result<u64>;

    /// Insert, or merge into the row whose `conflict` columns match
    async fn upsert(&self, table: &str, row: Value, conflict: &[&str]) -> Result<Value>;

    /// Delete every row matched by `query`
    async fn delete(&self, query: &Query) -> Result<u64>;

    /// Count rows matched by `query`
    async fn count(&self, query: &Query) -> Result<u64>;
}

/// Select and parse rows into `T`
pub async fn select_as<T: DeserializeOwned>(remote: &dyn RemoteStore, query: &Query) -> Result<Vec<T>> {
    let rows = remote.select(query).await?;
    parse_rows(rows)
}

/// Parse JSON rows into `T`
pub fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| Error::DeserializationError(e.to_string())))
        .collect()
}

/// Parse one JSON row into `T`
pub fn parse_row<T: DeserializeOwned>(row: Value) -> Result<T> {
    serde_json::from_value(row).map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
}

/// A change notification from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Table the change happened in
    pub table: String,
    /// What happened
    pub kind: ChangeKind,
    /// The new row (old row for deletes)
    pub record: Value,
}

/// What to subscribe to: changes in `table` where `filter_column = filter_value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Channel name, unique per subscriber
    pub name: String,
    /// Table to watch
    pub table: String,
    /// Column the filter applies to
    pub filter_column: String,
    /// Required column value
    pub filter_value: String,
}

impl ChannelSpec {
    /// Watch `table` rows belonging to `family_id`
    pub fn family_scoped(name: impl Into<String>, table: &str, family_id: &str) -> Self {
        Self {
            name: name.into(),
            table: table.to_string(),
            filter_column: "family_id".to_string(),
            filter_value: family_id.to_string(),
        }
    }

    /// Whether a row passes the channel filter
    pub fn accepts(&self, table: &str, record: &Value) -> bool {
        self.table == table
            && record.get(&self.filter_column).and_then(Value::as_str) == Some(self.filter_value.as_str())
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Keeps a channel open. Dropping it unsubscribes.
pub struct SubscriptionGuard {
    name: String,
    on_drop: Option<Unsubscribe>,
}

impl SubscriptionGuard {
    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard").field("name", &self.name).finish()
    }
}

/// A live change feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    guard: SubscriptionGuard,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    /// Build a subscription from a receiver and an unsubscribe hook
    pub fn new(
        name: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            guard: SubscriptionGuard {
                name: name.into(),
                on_drop: Some(Box::new(on_drop)),
            },
            receiver,
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        self.guard.name()
    }

    /// Next change, or `None` once the backend closed the channel
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Stop delivery
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Split into the guard that keeps the channel open and the event stream
    pub fn into_parts(self) -> (SubscriptionGuard, mpsc::UnboundedReceiver<ChangeEvent>) {
        (self.guard, self.receiver)
    }
}

/// Change feed of the hosted database
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Open a channel
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription>;
}
