//! # Outbound Message Queue
//!
//! Messages that could not be sent wait here, per recipient, until the next
//! online transition.
//!
//! ## Queue Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OUTBOUND QUEUE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  memory:   peer u2 ──► [m1, m2, m3]       (FIFO per peer)              │
//! │            peer u7 ──► [m4]                                            │
//! │                                                                         │
//! │  storage:  hearth.queue.messages.<family>.<user>                       │
//! │            [ {id, peer_id, content, created_at}, ... ]  (flat list)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flush
//!
//! ```text
//!   for each peer:
//!       peek front ──► deliver ──ok──► pop, persist, next
//!                         │
//!                         └─err──► stop this peer, keep the rest in order
//! ```
//!
//! Every message carries a client-generated id that becomes the remote row
//! id. If a delivery is retried after the remote already stored it, the
//! insert reports [`Error::Conflict`] and the message counts as delivered, so
//! at-least-once delivery never produces duplicate rows.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::tables;
use crate::remote::RemoteStore;
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageKey};
use crate::time::now_rfc3339;

/// Fresh client id for a message
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A message waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Client id, reused as the remote row id
    #[serde(default)]
    pub id: String,
    /// Recipient
    pub peer_id: String,
    /// Body
    pub content: String,
    /// When the user sent it (RFC 3339)
    pub created_at: String,
}

/// Delivers one queued message
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver `message`
    async fn deliver(&self, message: &PendingMessage) -> Result<()>;
}

/// Sink that inserts into the remote `messages` table
pub struct RemoteMessageSink {
    remote: Arc<dyn RemoteStore>,
    family_id: String,
    user_id: String,
}

impl RemoteMessageSink {
    /// Deliver as `user_id` within `family_id`
    pub fn new(remote: Arc<dyn RemoteStore>, family_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            remote,
            family_id: family_id.into(),
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl MessageSink for RemoteMessageSink {
    async fn deliver(&self, message: &PendingMessage) -> Result<()> {
        let row = json!({
            "id": message.id,
            "family_id": self.family_id,
            "sender_id": self.user_id,
            "receiver_id": message.peer_id,
            "content": message.content,
        });
        self.remote.insert(tables::MESSAGES, row).await?;
        Ok(())
    }
}

/// Outcome of one flush
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Messages delivered, in delivery order
    pub delivered: Vec<PendingMessage>,
    /// Peers whose delivery stopped, with the error that stopped it
    pub failed: Vec<(String, Error)>,
    /// Messages still queued afterwards
    pub remaining: usize,
}

/// Per-peer FIFO of unsent messages, mirrored to storage
pub struct OutboundQueue {
    store: Arc<dyn KeyValueStore>,
    key: StorageKey,
    queues: Mutex<BTreeMap<String, VecDeque<PendingMessage>>>,
    flushing: tokio::sync::Mutex<()>,
}

impl OutboundQueue {
    /// Open the queue of `user_id` in `family_id`, rehydrating stored messages
    pub fn open(store: Arc<dyn KeyValueStore>, family_id: &str, user_id: &str) -> Self {
        let key = StorageKey::outbox(family_id, user_id);
        let stored: Vec<PendingMessage> = store.get_json_or_default(&key);

        let mut queues: BTreeMap<String, VecDeque<PendingMessage>> = BTreeMap::new();
        let mut assigned = 0usize;
        for mut message in stored {
            if message.id.is_empty() {
                message.id = new_message_id();
                assigned += 1;
            }
            queues.entry(message.peer_id.clone()).or_default().push_back(message);
        }
        let count: usize = queues.values().map(VecDeque::len).sum();
        if count > 0 {
            tracing::info!(family_id, count, "Rehydrated outbox");
        }

        let queue = Self {
            store,
            key,
            queues: Mutex::new(queues),
            flushing: tokio::sync::Mutex::new(()),
        };
        // Ids must be stable across restarts for delivery to stay idempotent.
        if assigned > 0 {
            tracing::debug!(family_id, assigned, "Assigned ids to stored messages");
            queue.persist(&queue.queues.lock());
        }
        queue
    }

    /// Storage key of this queue
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    /// Queue a message for `peer_id`. Never fails: if storage rejects the
    /// write, the message still waits in memory.
    pub fn enqueue(&self, peer_id: &str, content: &str) -> PendingMessage {
        self.enqueue_with_id(new_message_id(), peer_id, content)
    }

    /// Queue a message under an id already used for a send attempt, so a
    /// retry of a send the remote did store is recognised as a duplicate.
    pub fn enqueue_with_id(&self, id: String, peer_id: &str, content: &str) -> PendingMessage {
        let message = PendingMessage {
            id,
            peer_id: peer_id.to_string(),
            content: content.to_string(),
            created_at: now_rfc3339(),
        };

        let mut queues = self.queues.lock();
        queues
            .entry(peer_id.to_string())
            .or_default()
            .push_back(message.clone());
        self.persist(&queues);
        tracing::debug!(peer_id, id = %message.id, "Queued message");
        message
    }

    /// Messages waiting for `peer_id`, oldest first
    pub fn pending_for(&self, peer_id: &str) -> Vec<PendingMessage> {
        self.queues
            .lock()
            .get(peer_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Peers with queued messages
    pub fn peers(&self) -> Vec<String> {
        self.queues
            .lock()
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Total queued messages
    pub fn len(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to deliver everything.
    ///
    /// Peers are independent: a failure stops delivery for that peer only.
    /// A flush already in progress makes this call a no-op.
    pub async fn flush(&self, sink: &dyn MessageSink) -> FlushReport {
        let Ok(_flushing) = self.flushing.try_lock() else {
            tracing::debug!("Flush already running");
            return FlushReport {
                remaining: self.len(),
                ..FlushReport::default()
            };
        };

        let mut report = FlushReport::default();
        for peer in self.peers() {
            loop {
                let front = self.queues.lock().get(&peer).and_then(|q| q.front().cloned());
                let Some(message) = front else { break };

                match sink.deliver(&message).await {
                    Ok(()) => {}
                    Err(Error::Conflict(_)) => {
                        tracing::debug!(id = %message.id, "Message already stored remotely");
                    }
                    Err(e) => {
                        tracing::warn!(peer_id = %peer, id = %message.id, error = %e, "Delivery failed, keeping queue");
                        report.failed.push((peer.clone(), e));
                        break;
                    }
                }

                self.remove(&peer, &message.id);
                report.delivered.push(message);
            }
        }

        report.remaining = self.len();
        tracing::info!(
            delivered = report.delivered.len(),
            remaining = report.remaining,
            "Outbox flushed"
        );
        report
    }

    fn remove(&self, peer_id: &str, id: &str) {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get_mut(peer_id) {
            queue.retain(|m| m.id != id);
            if queue.is_empty() {
                queues.remove(peer_id);
            }
        }
        self.persist(&queues);
    }

    fn persist(&self, queues: &BTreeMap<String, VecDeque<PendingMessage>>) {
        let flat: Vec<&PendingMessage> = queues.values().flatten().collect();
        let result = if flat.is_empty() {
            self.store.remove(self.key.as_str()).map(|_| ())
        } else {
            self.store.set_json(&self.key, &flat)
        };
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist outbox");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    /// Sink that records deliveries and fails on chosen contents
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: &PendingMessage) -> Result<()> {
            if self.fail_on.contains(&message.content) {
                return Err(Error::NotConnected);
            }
            self.delivered.lock().push(message.content.clone());
            Ok(())
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_flush_delivers_in_order_and_empties() {
        let queue = OutboundQueue::open(store(), "f1", "u1");
        for i in 1..=5 {
            queue.enqueue("u2", &format!("m{}", i));
        }

        let sink = RecordingSink::default();
        let report = queue.flush(&sink).await;

        assert_eq!(*sink.delivered.lock(), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert_eq!(report.delivered.len(), 5);
        assert_eq!(report.remaining, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_suffix_in_order() {
        let queue = OutboundQueue::open(store(), "f1", "u1");
        for i in 1..=5 {
            queue.enqueue("u2", &format!("m{}", i));
        }

        let sink = RecordingSink {
            fail_on: vec!["m3".into()],
            ..Default::default()
        };
        let report = queue.flush(&sink).await;

        assert_eq!(*sink.delivered.lock(), vec!["m1", "m2"]);
        let left: Vec<_> = queue.pending_for("u2").into_iter().map(|m| m.content).collect();
        assert_eq!(left, vec!["m3", "m4", "m5"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.remaining, 3);
    }

    #[tokio::test]
    async fn test_one_peer_failing_does_not_block_others() {
        let queue = OutboundQueue::open(store(), "f1", "u1");
        queue.enqueue("u2", "stuck");
        queue.enqueue("u3", "hello");

        let sink = RecordingSink {
            fail_on: vec!["stuck".into()],
            ..Default::default()
        };
        queue.flush(&sink).await;

        assert_eq!(*sink.delivered.lock(), vec!["hello"]);
        assert_eq!(queue.peers(), vec!["u2".to_string()]);
    }

    #[tokio::test]
    async fn test_conflict_counts_as_delivered() {
        struct DuplicateSink;

        #[async_trait]
        impl MessageSink for DuplicateSink {
            async fn deliver(&self, _message: &PendingMessage) -> Result<()> {
                Err(Error::Conflict("duplicate id".into()))
            }
        }

        let queue = OutboundQueue::open(store(), "f1", "u1");
        queue.enqueue("u2", "again");
        let report = queue.flush(&DuplicateSink).await;
        assert_eq!(report.delivered.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rehydrates_flat_list() {
        let store = store();
        {
            let queue = OutboundQueue::open(store.clone(), "f1", "u1");
            queue.enqueue("u2", "a");
            queue.enqueue("u3", "b");
            queue.enqueue("u2", "c");
        }

        let queue = OutboundQueue::open(store.clone(), "f1", "u1");
        let contents: Vec<_> = queue.pending_for("u2").into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["a", "c"]);
        assert_eq!(queue.len(), 3);

        let other = OutboundQueue::open(store, "f1", "u9");
        assert!(other.is_empty());
    }

    #[test]
    fn test_entries_without_ids_get_one() {
        let store = store();
        let key = StorageKey::outbox("f1", "u1");
        store
            .set(
                key.as_str(),
                r#"[{"peer_id":"u2","content":"legacy","created_at":"2024-01-01T00:00:00Z"}]"#,
            )
            .unwrap();

        let queue = OutboundQueue::open(store.clone(), "f1", "u1");
        let pending = queue.pending_for("u2");
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].id.is_empty());
        drop(queue);

        let reopened = OutboundQueue::open(store, "f1", "u1");
        assert_eq!(reopened.pending_for("u2")[0].id, pending[0].id);
    }

    #[test]
    fn test_enqueue_with_id_keeps_id() {
        let queue = OutboundQueue::open(store(), "f1", "u1");
        let message = queue.enqueue_with_id("m-1".into(), "u2", "hi");
        assert_eq!(message.id, "m-1");
        assert_eq!(queue.pending_for("u2")[0].id, "m-1");
    }

    #[test]
    fn test_corrupt_queue_opens_empty() {
        let store = store();
        store.set(StorageKey::outbox("f1", "u1").as_str(), "not json").unwrap();
        let queue = OutboundQueue::open(store, "f1", "u1");
        assert!(queue.is_empty());
    }
}
