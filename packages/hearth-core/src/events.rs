//! # Sync Events
//!
//! Events emitted by the sync layer for the UI to render. The library never
//! shows a banner or a toast itself; it broadcasts one of these and moves on.
//!
//! ```text
//! ┌──────────────┐   send()    ┌────────────────────┐  subscribe()  ┌──────┐
//! │ CachedFetch  │────────────►│                    │──────────────►│  UI  │
//! │ OutboundQueue│────────────►│ broadcast (256)    │──────────────►│ test │
//! │ SyncClient   │────────────►│                    │               └──────┘
//! └──────────────┘             └────────────────────┘
//! ```

use tokio::sync::broadcast;

use crate::state::View;
use crate::sync::WatchedTable;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sender half shared by every component that emits events
pub type EventSender = broadcast::Sender<SyncEvent>;

/// Events emitted by the sync layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Offline banner should be shown (true) or hidden (false)
    OfflineBanner {
        /// Whether the banner is visible
        visible: bool,
    },

    /// A short user-facing notice ("toast")
    Notice {
        /// The message to show
        message: String,
    },

    /// A list backing a view was reloaded
    ViewRefreshed {
        /// Which view
        view: View,
    },

    /// A message could not be sent and was queued for later
    MessageQueued {
        /// Recipient
        peer_id: String,
        /// Messages now pending for that recipient
        pending: usize,
    },

    /// The outbox was flushed
    OutboxFlushed {
        /// Messages delivered during this flush
        delivered: usize,
        /// Messages still pending afterwards
        remaining: usize,
    },

    /// The active family changed
    FamilyChanged {
        /// New family id
        family_id: String,
    },

    /// A realtime change notification was received
    Invalidated {
        /// Family the notification was scoped to
        family_id: String,
        /// Table that changed
        table: WatchedTable,
    },
}

/// Create the event channel
pub fn event_channel() -> EventSender {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Send an event, ignoring the case where nobody is listening
pub(crate) fn emit(events: &EventSender, event: SyncEvent) {
    if events.send(event).is_err() {
        tracing::trace!("No event subscribers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let tx = event_channel();
        let mut rx = tx.subscribe();
        emit(&tx, SyncEvent::Notice { message: "Failed to load data".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::Notice { message: "Failed to load data".into() }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let tx = event_channel();
        emit(&tx, SyncEvent::OfflineBanner { visible: true });
    }
}
