//! # Sync Module
//!
//! The offline/online machinery: cached reads, the outbox, realtime
//! invalidation and pagination. None of it knows about families or views;
//! [`SyncClient`](crate::SyncClient) wires it to application state.

mod fetch;
mod outbox;
mod pagination;
mod realtime;

pub use fetch::{CachedFetch, FetchOutcome, FetchSource, LOAD_FAILED_NOTICE};
pub use outbox::{
    new_message_id, FlushReport, MessageSink, OutboundQueue, PendingMessage, RemoteMessageSink,
};
pub use pagination::{Cursor, FetchMode, HasMorePolicy, PageRequest};
pub use realtime::{Invalidation, InvalidationListener, WatchedTable};
