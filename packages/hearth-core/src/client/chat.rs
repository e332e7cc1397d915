//! Direct messages: sending with an offline queue behind it.

use serde_json::json;

use super::SyncClient;
use crate::error::{Error, Result};
use crate::events::{emit, SyncEvent};
use crate::model::{tables, Message};
use crate::remote::parse_row;
use crate::sync::{new_message_id, FetchMode, FlushReport, PendingMessage};

/// Notice shown when a message is queued instead of sent
pub const QUEUED_NOTICE: &str = "Queued";

/// What happened to a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Stored remotely
    Sent(Message),
    /// Waiting in the outbox
    Queued(PendingMessage),
}

impl SyncClient {
    /// Send `content` to `peer_id`.
    ///
    /// Offline, or when the backend refuses, the message goes to the outbox
    /// and a [`SyncEvent::MessageQueued`] is emitted. The queued message keeps
    /// the id of the failed attempt, so a send the backend stored without
    /// answering is not stored twice on flush. After a successful send the
    /// open conversation reloads its latest page.
    pub async fn send_message(&self, peer_id: &str, content: &str) -> Result<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("message is empty".into()));
        }
        let scope = self.state.scope()?;
        let id = new_message_id();

        if !self.connectivity.is_online() {
            return self.queue_message(id, peer_id, content);
        }

        let row = json!({
            "id": id.as_str(),
            "family_id": scope.family_id,
            "sender_id": scope.user_id,
            "receiver_id": peer_id,
            "content": content,
        });
        match self.remote.insert(tables::MESSAGES, row).await {
            Ok(stored) => {
                let message: Message = parse_row(stored)?;
                tracing::debug!(peer_id, id = %message.id, "Message sent");
                if self.state.open_peer.read().as_deref() == Some(peer_id) {
                    self.load_conversation(FetchMode::Replace).await?;
                }
                Ok(SendOutcome::Sent(message))
            }
            Err(e) => {
                tracing::warn!(peer_id, error = %e, "Send failed, queueing");
                self.queue_message(id, peer_id, content)
            }
        }
    }

    fn queue_message(&self, id: String, peer_id: &str, content: &str) -> Result<SendOutcome> {
        let queue = self.outbox().ok_or(Error::OutboxUnavailable)?;
        let message = queue.enqueue_with_id(id, peer_id, content);
        emit(
            &self.events,
            SyncEvent::MessageQueued {
                peer_id: peer_id.to_string(),
                pending: queue.pending_for(peer_id).len(),
            },
        );
        self.notice(QUEUED_NOTICE);
        Ok(SendOutcome::Queued(message))
    }

    /// Messages waiting for `peer_id`, oldest first
    pub fn pending_messages(&self, peer_id: &str) -> Vec<PendingMessage> {
        self.outbox()
            .map(|queue| queue.pending_for(peer_id))
            .unwrap_or_default()
    }

    /// Total messages waiting in the outbox
    pub fn pending_count(&self) -> usize {
        self.outbox().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Deliver queued messages.
    ///
    /// When anything was delivered to the peer of the open conversation, it
    /// reloads its latest page.
    pub async fn flush_outbox(&self) -> FlushReport {
        let Some(queue) = self.outbox() else {
            return FlushReport::default();
        };
        let sink = match self.message_sink() {
            Ok(sink) => sink,
            Err(e) => {
                tracing::debug!(error = %e, "No scope to flush in");
                return FlushReport {
                    remaining: queue.len(),
                    ..FlushReport::default()
                };
            }
        };

        let report = queue.flush(&sink).await;
        if report.delivered.is_empty() && report.failed.is_empty() {
            return report;
        }
        emit(
            &self.events,
            SyncEvent::OutboxFlushed {
                delivered: report.delivered.len(),
                remaining: report.remaining,
            },
        );

        let open_peer = self.state.open_peer.read().clone();
        if let Some(peer) = open_peer {
            if report.delivered.iter().any(|m| m.peer_id == peer) {
                if let Err(e) = self.load_conversation(FetchMode::Replace).await {
                    tracing::warn!(peer_id = %peer, error = %e, "Conversation reload failed");
                }
            }
        }
        report
    }
}
