//! # Invalidation Listener
//!
//! Binds one realtime channel per watched table for the active family and
//! turns every change into an [`Invalidation`]. Notifications carry no data
//! the client applies; they only say "this list is stale".
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        INVALIDATION LISTENER                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  bind(f1)                                                              │
//! │    ├── rt-paragraphs-f1  (paragraphs, family_id = f1)   ─┐             │
//! │    ├── rt-activities-f1  (activities, family_id = f1)    │  forwarding │
//! │    ├── rt-messages-f1    (messages, family_id = f1)      ├─ tasks ──►  │
//! │    └── rt-requests-f1    (family_access_requests, ...)  ─┘  mpsc       │
//! │                                                                         │
//! │  bind(f2)  ──► unbind_all() first, then the same four for f2           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no retry: a channel the backend closes stays closed until the
//! next `bind`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::tables;
use crate::remote::{ChangeKind, ChannelSpec, Realtime, SubscriptionGuard};

/// Tables the client watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedTable {
    /// Note paragraphs (notes view)
    Paragraphs,
    /// Activities
    Activities,
    /// Direct messages
    Messages,
    /// Join requests
    AccessRequests,
}

impl WatchedTable {
    /// Every watched table
    pub const ALL: [WatchedTable; 4] = [
        WatchedTable::Paragraphs,
        WatchedTable::Activities,
        WatchedTable::Messages,
        WatchedTable::AccessRequests,
    ];

    /// Remote table name
    pub fn table_name(&self) -> &'static str {
        match self {
            WatchedTable::Paragraphs => tables::PARAGRAPHS,
            WatchedTable::Activities => tables::ACTIVITIES,
            WatchedTable::Messages => tables::MESSAGES,
            WatchedTable::AccessRequests => tables::ACCESS_REQUESTS,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WatchedTable::Paragraphs => "paragraphs",
            WatchedTable::Activities => "activities",
            WatchedTable::Messages => "messages",
            WatchedTable::AccessRequests => "requests",
        }
    }

    /// Channel name for this table in `family_id`
    pub fn channel_name(&self, family_id: &str) -> String {
        format!("rt-{}-{}", self.label(), family_id)
    }
}

/// "A list in this family is stale"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Family the channel was bound to
    pub family_id: String,
    /// Table that changed
    pub table: WatchedTable,
    /// Kind of change
    pub kind: ChangeKind,
}

struct Binding {
    family_id: String,
    guards: Vec<SubscriptionGuard>,
    tasks: Vec<JoinHandle<()>>,
}

impl Binding {
    fn teardown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(family_id = %self.family_id, channels = self.guards.len(), "Unbound realtime channels");
        // Guards drop here, which unsubscribes.
    }
}

/// Realtime channel manager for the active family
pub struct InvalidationListener {
    realtime: Arc<dyn Realtime>,
    tx: mpsc::UnboundedSender<Invalidation>,
    binding: Mutex<Option<Binding>>,
}

impl InvalidationListener {
    /// Create a listener and the stream its invalidations arrive on
    pub fn new(realtime: Arc<dyn Realtime>) -> (Self, mpsc::UnboundedReceiver<Invalidation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Self {
            realtime,
            tx,
            binding: Mutex::new(None),
        };
        (listener, rx)
    }

    /// Tear down any existing channels, then watch every table of `family_id`.
    ///
    /// Returns how many channels were bound. Tables whose subscription fails
    /// are skipped with a warning.
    pub async fn bind(&self, family_id: &str) -> usize {
        self.unbind_all();

        let mut guards = Vec::new();
        let mut tasks = Vec::new();
        for table in WatchedTable::ALL {
            let name = table.channel_name(family_id);
            let spec = ChannelSpec::family_scoped(name.clone(), table.table_name(), family_id);

            match self.realtime.subscribe(spec).await {
                Ok(subscription) => {
                    let (guard, mut changes) = subscription.into_parts();
                    let tx = self.tx.clone();
                    let family = family_id.to_string();
                    tasks.push(tokio::spawn(async move {
                        while let Some(change) = changes.recv().await {
                            let invalidation = Invalidation {
                                family_id: family.clone(),
                                table,
                                kind: change.kind,
                            };
                            if tx.send(invalidation).is_err() {
                                return;
                            }
                        }
                        tracing::warn!(channel = %name, "Realtime channel closed");
                    }));
                    guards.push(guard);
                }
                Err(e) => {
                    tracing::warn!(channel = %name, error = %e, "Realtime subscription failed");
                }
            }
        }

        let bound = guards.len();
        let previous = self.binding.lock().replace(Binding {
            family_id: family_id.to_string(),
            guards,
            tasks,
        });
        if let Some(previous) = previous {
            previous.teardown();
        }
        tracing::info!(family_id, channels = bound, "Realtime bound");
        bound
    }

    /// Remove every channel
    pub fn unbind_all(&self) {
        let binding = self.binding.lock().take();
        if let Some(binding) = binding {
            binding.teardown();
        }
    }

    /// Family the channels are bound to
    pub fn bound_family(&self) -> Option<String> {
        self.binding.lock().as_ref().map(|b| b.family_id.clone())
    }

    /// Names of the bound channels
    pub fn active_channels(&self) -> Vec<String> {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.guards.iter().map(|g| g.name().to_string()).collect())
            .unwrap_or_default()
    }
}

impl Drop for InvalidationListener {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.teardown();
        }
    }
}
