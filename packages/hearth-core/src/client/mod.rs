//! # Sync Client
//!
//! The entry point a UI holds on to. It owns the application state and wires
//! the sync machinery (cached reads, outbox, realtime invalidation) to it.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CLIENT LIFECYCLE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SyncClient::new(remote, realtime, store, config)                      │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  start_session(session, requested_family)                              │
//! │    ├── publish the user's profile (best effort)                        │
//! │    ├── list families (offline: fall back to the last family)           │
//! │    ├── submit a join code left over from before sign-in                │
//! │    └── switch_family(chosen)                                           │
//! │          ├── remember as last family                                   │
//! │          ├── reset lists and cursors                                   │
//! │          ├── open the outbox of (family, user)                         │
//! │          ├── rebind realtime channels                                  │
//! │          ├── load role                                                 │
//! │          └── load books, notes, activities, members                    │
//! │                                                                         │
//! │  set_online(true)  ──► drop banner, flush outbox                       │
//! │  invalidations     ──► page-0 refetch of the visible list              │
//! │                                                                         │
//! │  sign_out()        ──► unbind, close outbox, clear state               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod chat;
mod lists;

pub use chat::SendOutcome;
pub use lists::LoadSummary;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::activities::ActivityService;
use crate::config::SyncConfig;
use crate::content::ContentService;
use crate::error::Result;
use crate::events::{emit, event_channel, EventSender, SyncEvent};
use crate::family::FamilyService;
use crate::model::Family;
use crate::prefs::LocalPrefs;
use crate::profile::ProfileService;
use crate::remote::{Connectivity, MemoryBackend, Realtime, RemoteStore};
use crate::state::{AppState, ListKind, Session, View};
use crate::storage::{open_store, KeyValueStore, StorageKey};
use crate::sync::{
    CachedFetch, FetchMode, FlushReport, Invalidation, InvalidationListener, OutboundQueue,
    RemoteMessageSink, WatchedTable,
};

/// Notice shown when the family list can't be read
pub const FAMILIES_FAILED_NOTICE: &str = "Failed to load families";

/// Notice shown after a manual refresh
pub const REFRESHED_NOTICE: &str = "Data refreshed";

/// Offline-aware client for one device
pub struct SyncClient {
    config: Arc<SyncConfig>,
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    state: Arc<AppState>,
    events: EventSender,
    connectivity: Connectivity,
    fetcher: CachedFetch,
    outbox: RwLock<Option<Arc<OutboundQueue>>>,
    listener: InvalidationListener,
    invalidations: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Invalidation>>>,
    families: FamilyService,
    content: ContentService,
    activities: ActivityService,
    prefs: LocalPrefs,
    profile: ProfileService,
}

impl SyncClient {
    /// Build a client over the given backend and local store
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        realtime: Arc<dyn Realtime>,
        store: Arc<dyn KeyValueStore>,
        config: SyncConfig,
    ) -> Self {
        let config = Arc::new(config);
        let state = Arc::new(AppState::new(&config));
        let events = event_channel();
        let connectivity = Connectivity::default();
        let fetcher = CachedFetch::new(store.clone(), connectivity.clone(), events.clone());
        let (listener, invalidations) = InvalidationListener::new(realtime);

        let families = FamilyService::new(remote.clone(), store.clone(), state.clone(), config.clone());
        let content = ContentService::new(remote.clone(), store.clone(), state.clone(), config.clone());
        let activities = ActivityService::new(remote.clone(), store.clone(), state.clone());
        let prefs = LocalPrefs::new(store.clone(), state.clone());
        let profile = ProfileService::new(remote.clone(), state.clone());

        Self {
            config,
            remote,
            store,
            state,
            events,
            connectivity,
            fetcher,
            outbox: RwLock::new(None),
            listener,
            invalidations: tokio::sync::Mutex::new(Some(invalidations)),
            families,
            content,
            activities,
            prefs,
            profile,
        }
    }

    /// A client running against an in-process backend, with local storage
    /// at `config.database_path` (in-memory when unset)
    pub fn with_memory_backend(config: SyncConfig) -> Result<(Self, MemoryBackend)> {
        let store = open_store(config.database_path.as_deref())?;
        let backend = MemoryBackend::new();
        let client = Self::new(Arc::new(backend.clone()), Arc::new(backend.clone()), store, config);
        Ok((client, backend))
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Receive sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Configuration in use
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Connectivity hint
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Whether the offline banner is up
    pub fn offline_banner(&self) -> bool {
        self.fetcher.offline_banner()
    }

    /// Family operations
    pub fn families(&self) -> &FamilyService {
        &self.families
    }

    /// Book, note and paragraph operations
    pub fn content(&self) -> &ContentService {
        &self.content
    }

    /// Activity operations
    pub fn activities(&self) -> &ActivityService {
        &self.activities
    }

    /// Pins, tags and drafts
    pub fn prefs(&self) -> &LocalPrefs {
        &self.prefs
    }

    /// Profile publishing and export
    pub fn profile(&self) -> &ProfileService {
        &self.profile
    }

    /// Channels bound for the active family
    pub fn realtime_channels(&self) -> Vec<String> {
        self.listener.active_channels()
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// Sign `session` in and activate a family.
    ///
    /// `requested_family` wins when the user can see it. When the family list
    /// can't be read the last family used on this device is activated so
    /// cached data stays reachable offline. Returns the active family.
    pub async fn start_session(&self, session: Session, requested_family: Option<&str>) -> Result<Option<String>> {
        let user_id = session.user_id.clone();
        tracing::info!(user_id = %user_id, "Starting session");
        *self.state.session.write() = Some(session);

        if let Err(e) = self.profile.publish().await {
            tracing::debug!(user_id = %user_id, error = %e, "Profile not published");
        }

        let chosen = match self.families.list_families(&user_id).await {
            Ok(families) => {
                let chosen = self.families.choose_family(&families, requested_family);
                *self.state.families.write() = families;
                chosen
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Family list unavailable");
                if self.connectivity.is_online() {
                    self.notice(FAMILIES_FAILED_NOTICE);
                } else {
                    self.fetcher.set_banner(true);
                }
                self.families.last_family()
            }
        };

        self.submit_pending_join_code().await;

        match chosen {
            Some(family_id) => {
                self.switch_family(&family_id).await?;
                Ok(Some(family_id))
            }
            None => {
                tracing::info!(user_id = %user_id, "No family to activate");
                self.leave_family();
                Ok(None)
            }
        }
    }

    /// Remember a join code entered before signing in
    pub fn set_pending_join_code(&self, code: &str) -> Result<()> {
        self.store.set(StorageKey::pending_join_code().as_str(), code.trim())
    }

    async fn submit_pending_join_code(&self) {
        let key = StorageKey::pending_join_code();
        let code = match self.store.get(key.as_str()) {
            Ok(Some(code)) => code,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pending join code");
                return;
            }
        };

        match self.families.join_by_code(&code).await {
            Ok(request) => {
                tracing::info!(family_id = %request.family_id, "Submitted pending join request");
                self.notice("Join request sent");
            }
            Err(e) if e.is_network() => {
                tracing::debug!(error = %e, "Keeping pending join code for later");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pending join code rejected");
                self.notice(&e.to_string());
            }
        }
        if let Err(e) = self.store.remove(key.as_str()) {
            tracing::warn!(error = %e, "Failed to drop pending join code");
        }
    }

    /// Sign out: unbind realtime, close the outbox and forget all state.
    /// Local caches stay on the device.
    pub fn sign_out(&self) {
        self.listener.unbind_all();
        *self.outbox.write() = None;
        self.state.clear();
        tracing::info!("Signed out");
    }

    // ========================================================================
    // FAMILY CONTEXT
    // ========================================================================

    /// Create a family owned by the user and switch to it
    pub async fn create_family(&self, name: &str) -> Result<Family> {
        let family = self.families.create_family(name).await?;
        self.switch_family(&family.id).await?;
        Ok(family)
    }

    /// Make `family_id` the active family.
    ///
    /// Every list and cursor is reset, the outbox of (family, user) is
    /// opened, realtime channels are rebound to the new family only, and
    /// all lists reload.
    pub async fn switch_family(&self, family_id: &str) -> Result<()> {
        let user_id = self.state.user_id()?;
        tracing::info!(family_id, "Switching family");

        self.families.remember_family(family_id);
        *self.state.family_id.write() = Some(family_id.to_string());
        self.state.clear_family_data();

        let queue = Arc::new(OutboundQueue::open(self.store.clone(), family_id, &user_id));
        *self.outbox.write() = Some(queue);
        emit(
            &self.events,
            SyncEvent::FamilyChanged {
                family_id: family_id.to_string(),
            },
        );

        self.listener.bind(family_id).await;

        if let Err(e) = self.families.load_role().await {
            tracing::warn!(family_id, error = %e, "Role unavailable");
        }

        self.load_all().await?;

        if self.connectivity.is_online() {
            self.flush_outbox().await;
        }
        Ok(())
    }

    fn leave_family(&self) {
        self.listener.unbind_all();
        *self.outbox.write() = None;
        *self.state.family_id.write() = None;
        self.state.clear_family_data();
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    /// Show `view`
    pub fn set_view(&self, view: View) {
        *self.state.view.write() = view;
    }

    /// Open the book `book_id` and load its notes
    pub async fn open_book(&self, book_id: &str) -> Result<LoadSummary> {
        *self.state.open_book.write() = Some(book_id.to_string());
        self.state.lists.write().book_notes.clear();
        self.state.cursors.write().book_notes.reset();
        self.set_view(View::Books);
        self.load_book_notes(FetchMode::Replace).await
    }

    /// Close the open book
    pub fn close_book(&self) {
        *self.state.open_book.write() = None;
        self.state.lists.write().book_notes.clear();
        self.state.cursors.write().book_notes.reset();
    }

    /// Open the conversation with `peer_id` and load its latest page
    pub async fn open_conversation(&self, peer_id: &str) -> Result<LoadSummary> {
        *self.state.open_peer.write() = Some(peer_id.to_string());
        self.state.lists.write().conversation.clear();
        self.state.cursors.write().conversation.reset();
        self.set_view(View::Chat);
        self.load_conversation(FetchMode::Replace).await
    }

    /// Close the open conversation
    pub fn close_conversation(&self) {
        *self.state.open_peer.write() = None;
        self.state.lists.write().conversation.clear();
        self.state.cursors.write().conversation.reset();
    }

    // ========================================================================
    // CONNECTIVITY
    // ========================================================================

    /// Record a connectivity change. Coming back online drops the banner and
    /// flushes the outbox.
    pub async fn set_online(&self, online: bool) -> Option<FlushReport> {
        if !self.connectivity.set_online(online) {
            return None;
        }
        tracing::info!(online, "Connectivity changed");
        self.fetcher.set_banner(!online);

        if online {
            Some(self.flush_outbox().await)
        } else {
            None
        }
    }

    /// Re-read everything: family list, every list, the open conversation,
    /// and the realtime channels
    pub async fn refresh(&self) -> Result<()> {
        let user_id = self.state.user_id()?;
        match self.families.list_families(&user_id).await {
            Ok(families) => *self.state.families.write() = families,
            Err(e) => tracing::warn!(error = %e, "Family list unavailable during refresh"),
        }

        let family_id = self.state.family_id()?;
        self.listener.bind(&family_id).await;
        if let Err(e) = self.families.load_role().await {
            tracing::warn!(family_id = %family_id, error = %e, "Role unavailable");
        }
        self.load_all().await?;
        if self.state.open_peer.read().is_some() {
            self.load_conversation(FetchMode::Replace).await?;
        }
        if self.state.open_book.read().is_some() {
            self.load_book_notes(FetchMode::Replace).await?;
        }
        self.notice(REFRESHED_NOTICE);
        Ok(())
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Wait for the next realtime invalidation. Returns `None` once a pump
    /// owns the stream.
    pub async fn recv_invalidation(&self) -> Option<Invalidation> {
        match self.invalidations.lock().await.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// React to an invalidation: refetch page 0 of the affected list when its
    /// view is on screen. Notifications for any family other than the active
    /// one are dropped. Returns whether a list was reloaded.
    pub async fn handle_invalidation(&self, invalidation: &Invalidation) -> Result<bool> {
        let current = self.state.family_id.read().clone();
        if current.as_deref() != Some(invalidation.family_id.as_str()) {
            tracing::debug!(
                family_id = %invalidation.family_id,
                "Dropping invalidation for inactive family"
            );
            return Ok(false);
        }

        emit(
            &self.events,
            SyncEvent::Invalidated {
                family_id: invalidation.family_id.clone(),
                table: invalidation.table,
            },
        );

        let view = self.state.view();
        let conversation_open = self.state.open_peer.read().is_some();
        let kind = match (invalidation.table, view) {
            (WatchedTable::Paragraphs, View::Notes) => ListKind::Notes,
            (WatchedTable::Activities, View::Activities) => ListKind::Activities,
            (WatchedTable::Messages, View::Chat) if conversation_open => ListKind::Conversation,
            _ => return Ok(false),
        };

        tracing::debug!(table = ?invalidation.table, ?view, "Refetching visible list");
        self.load(kind, FetchMode::Replace).await?;
        Ok(true)
    }

    /// Handle invalidations in the background until the client is dropped.
    ///
    /// The pump takes over the invalidation stream; a second call returns
    /// `None`.
    pub async fn spawn_invalidation_pump(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.invalidations.lock().await.take()?;
        let client = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while let Some(invalidation) = rx.recv().await {
                let Some(client) = client.upgrade() else { return };
                if let Err(e) = client.handle_invalidation(&invalidation).await {
                    tracing::warn!(error = %e, "Invalidation refetch failed");
                }
            }
            tracing::debug!("Invalidation pump stopped");
        }))
    }

    fn notice(&self, message: &str) {
        emit(
            &self.events,
            SyncEvent::Notice {
                message: message.to_string(),
            },
        );
    }

    fn outbox(&self) -> Option<Arc<OutboundQueue>> {
        self.outbox.read().clone()
    }

    fn message_sink(&self) -> Result<RemoteMessageSink> {
        let scope = self.state.scope()?;
        Ok(RemoteMessageSink::new(self.remote.clone(), scope.family_id, scope.user_id))
    }
}
