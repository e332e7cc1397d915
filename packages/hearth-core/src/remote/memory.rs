//! # Memory Backend
//!
//! An in-process implementation of [`RemoteStore`] and [`Realtime`]. It backs
//! the local-only mode and every test, so it carries fault injection:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_online(false)          every call fails with NotConnected         │
//! │  fail_next_inserts(n)       next n inserts fail with RemoteError       │
//! │  reject_inserts_where(..)   matching inserts fail with PermissionDenied│
//! │  drop_channels()            every open subscription stops delivering   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows without an `id` get a UUID; rows without `created_at` get a strictly
//! increasing timestamp so ordering by creation time is stable.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::{ChangeEvent, ChangeKind, ChannelSpec, Query, Realtime, RemoteStore, Subscription};
use crate::error::{Error, Result};
use crate::time::{now_timestamp_millis, to_rfc3339};

struct Subscriber {
    id: u64,
    spec: ChannelSpec,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

struct Rejection {
    table: String,
    column: String,
    value: Value,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    offline: bool,
    fail_next_inserts: usize,
    rejections: Vec<Rejection>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    last_stamp_ms: i64,
    writes: u64,
}

impl Inner {
    fn ensure_online(&self) -> Result<()> {
        if self.offline {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }

    fn next_stamp(&mut self) -> String {
        let ms = now_timestamp_millis().max(self.last_stamp_ms + 1);
        self.last_stamp_ms = ms;
        let at = Utc
            .timestamp_millis_opt(ms)
            .single()
            .unwrap_or_else(Utc::now);
        to_rfc3339(at)
    }

    fn notify(&mut self, table: &str, kind: ChangeKind, record: &Value) {
        self.subscribers.retain(|sub| {
            if !sub.spec.accepts(table, record) {
                return true;
            }
            sub.tx
                .send(ChangeEvent {
                    table: table.to_string(),
                    kind,
                    record: record.clone(),
                })
                .is_ok()
        });
    }

    fn check_insert(&mut self, table: &str, row: &Value) -> Result<()> {
        self.ensure_online()?;
        if self.fail_next_inserts > 0 {
            self.fail_next_inserts -= 1;
            return Err(Error::RemoteError(format!("insert into {} failed", table)));
        }
        let rejected = self
            .rejections
            .iter()
            .any(|r| r.table == table && row.get(&r.column) == Some(&r.value));
        if rejected {
            return Err(Error::PermissionDenied(format!("insert into {} rejected", table)));
        }
        Ok(())
    }

    fn insert_row(&mut self, table: &str, row: Value) -> Result<Value> {
        let mut row = into_object(row)?;
        if !row.contains_key("id") {
            row.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            let stamp = self.next_stamp();
            row.insert("created_at".into(), Value::String(stamp));
        }
        let row = Value::Object(row);

        let rows = self.tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| r.get("id") == row.get("id")) {
            return Err(Error::Conflict(format!("duplicate id in {}", table)));
        }
        rows.push(row.clone());
        self.writes += 1;
        self.notify(table, ChangeKind::Insert, &row);
        Ok(row)
    }
}

fn into_object(row: Value) -> Result<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!("row must be an object, got {}", other))),
    }
}

fn merge(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(map) = target {
        for (k, v) in patch {
            map.insert(k.clone(), v.clone());
        }
    }
}

/// In-memory remote store and change feed
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    /// Create an empty, online backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability
    pub fn set_online(&self, online: bool) {
        self.inner.lock().offline = !online;
        tracing::debug!(online, "Memory backend availability changed");
    }

    /// Whether calls currently succeed
    pub fn is_online(&self) -> bool {
        !self.inner.lock().offline
    }

    /// Make the next `n` inserts fail with a remote error
    pub fn fail_next_inserts(&self, n: usize) {
        self.inner.lock().fail_next_inserts = n;
    }

    /// Refuse inserts into `table` whose `column` equals `value`
    pub fn reject_inserts_where(&self, table: &str, column: &str, value: impl Into<Value>) {
        self.inner.lock().rejections.push(Rejection {
            table: table.to_string(),
            column: column.to_string(),
            value: value.into(),
        });
    }

    /// Remove every injected rejection
    pub fn clear_rejections(&self) {
        self.inner.lock().rejections.clear();
    }

    /// Insert rows directly, bypassing faults and notifications
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut inner = self.inner.lock();
        for mut row in rows {
            if let Value::Object(map) = &mut row {
                if !map.contains_key("id") {
                    map.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
                }
                if !map.contains_key("created_at") {
                    map.insert("created_at".into(), Value::String(inner.next_stamp()));
                }
            }
            inner.tables.entry(table.to_string()).or_default().push(row);
        }
    }

    /// All rows of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Names of the channels currently subscribed
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .map(|s| s.spec.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Close every open channel from the backend side
    pub fn drop_channels(&self) {
        let dropped = std::mem::take(&mut self.inner.lock().subscribers);
        tracing::debug!(count = dropped.len(), "Dropping realtime channels");
    }

    /// Publish a change as if another client had made it
    pub fn publish(&self, table: &str, kind: ChangeKind, record: Value) {
        self.inner.lock().notify(table, kind, &record);
    }
}

#[async_trait]
impl RemoteStore for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let inner = self.inner.lock();
        inner.ensure_online()?;
        let rows = inner.tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.check_insert(table, &row)?;
        inner.insert_row(table, row)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<u64> {
        let patch = into_object(patch)?;
        let mut inner = self.inner.lock();
        inner.ensure_online()?;

        let mut changed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|r| query.matches(r)) {
                merge(row, &patch);
                changed.push(row.clone());
            }
        }
        inner.writes += changed.len() as u64;
        for row in &changed {
            inner.notify(&query.table, ChangeKind::Update, row);
        }
        Ok(changed.len() as u64)
    }

    async fn upsert(&self, table: &str, row: Value, conflict: &[&str]) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.check_insert(table, &row)?;

        let patch = into_object(row)?;
        let existing = inner.tables.get_mut(table).and_then(|rows| {
            rows.iter_mut()
                .find(|r| conflict.iter().all(|c| r.get(*c) == patch.get(*c)))
        });

        match existing {
            Some(current) => {
                merge(current, &patch);
                let stored = current.clone();
                inner.writes += 1;
                inner.notify(table, ChangeKind::Update, &stored);
                Ok(stored)
            }
            None => inner.insert_row(table, Value::Object(patch)),
        }
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.ensure_online()?;

        let mut removed = Vec::new();
        if let Some(rows) = inner.tables.get_mut(&query.table) {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows.drain(..) {
                if query.matches(&row) {
                    removed.push(row);
                } else {
                    kept.push(row);
                }
            }
            *rows = kept;
        }
        inner.writes += removed.len() as u64;
        for row in &removed {
            inner.notify(&query.table, ChangeKind::Delete, row);
        }
        Ok(removed.len() as u64)
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let inner = self.inner.lock();
        inner.ensure_online()?;
        let count = inner
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[async_trait]
impl Realtime for MemoryBackend {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription> {
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(Error::SubscriptionFailed(format!("{}: backend unreachable", spec.name)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        let name = spec.name.clone();
        inner.subscribers.push(Subscriber { id, spec, tx });

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(name, rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.retain(|s| s.id != id);
            }
        }))
    }
}
