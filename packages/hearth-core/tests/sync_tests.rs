//! End-to-end behaviour of the sync layer, driven through `SyncClient`
//! against the in-memory backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hearth_core::model::tables;
use hearth_core::storage::{CacheKind, StorageKey};
use hearth_core::sync::{Invalidation, WatchedTable};
use hearth_core::{
    FetchMode, FetchSource, KeyValueStore, ListKind, MemoryBackend, MemoryStore, SendOutcome,
    Session, SyncClient, SyncConfig, SyncEvent, View,
};
use hearth_core::remote::{ChangeKind, Query, RemoteStore};
use hearth_core::Error;
use serde_json::{json, Value};
use tokio_test::assert_ok;

struct Harness {
    backend: MemoryBackend,
    store: Arc<MemoryStore>,
    client: SyncClient,
}

fn seed_families(backend: &MemoryBackend) {
    backend.seed(
        tables::FAMILIES,
        vec![
            json!({ "id": "f1", "name": "Alpha", "owner_id": "u1" }),
            json!({ "id": "f2", "name": "Beta", "owner_id": "u9" }),
        ],
    );
    backend.seed(
        tables::FAMILY_MEMBERS,
        vec![
            json!({ "family_id": "f1", "user_id": "u1", "role": "owner" }),
            json!({ "family_id": "f1", "user_id": "u2", "role": "member" }),
            json!({ "family_id": "f2", "user_id": "u1", "role": "member" }),
        ],
    );
    backend.seed(
        tables::PROFILES,
        vec![
            json!({ "id": "u1", "display_name": "Ann" }),
            json!({ "id": "u2", "display_name": "Ben" }),
        ],
    );
}

fn seed_books(backend: &MemoryBackend, family_id: &str, count: usize) {
    backend.seed(
        tables::BOOKS,
        (0..count).map(|i| json!({ "title": format!("Book {}", i), "family_id": family_id })),
    );
}

async fn harness() -> Harness {
    let backend = MemoryBackend::new();
    seed_families(&backend);
    let store = Arc::new(MemoryStore::new());
    let client = SyncClient::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        store.clone(),
        SyncConfig::default(),
    );
    Harness { backend, store, client }
}

async fn go_offline(h: &Harness) {
    h.backend.set_online(false);
    h.client.set_online(false).await;
}

async fn go_online(h: &Harness) -> hearth_core::sync::FlushReport {
    h.backend.set_online(true);
    h.client
        .set_online(true)
        .await
        .expect("transition to online flushes")
}

// ============================================================================
// CACHED FETCH
// ============================================================================

#[tokio::test]
async fn failing_fetch_returns_last_successful_rows() {
    let h = harness().await;
    seed_books(&h.backend, "f1", 3);
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    let live = h.client.state().lists.read().books.clone();
    assert_eq!(live.len(), 3);

    go_offline(&h).await;
    let summary = h.client.load_books(FetchMode::Replace).await.unwrap();

    assert_eq!(summary.source, FetchSource::Cache);
    assert!(summary.error.is_some());
    assert_eq!(h.client.state().lists.read().books, live);
    assert!(h.client.offline_banner());
}

#[tokio::test]
async fn corrupt_or_missing_cache_yields_empty_list() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    h.store
        .set(StorageKey::cache(CacheKind::Books, "f1").as_str(), "{not json")
        .unwrap();

    go_offline(&h).await;
    let books = h.client.load_books(FetchMode::Replace).await.unwrap();
    let notes = h.client.load_notes(FetchMode::Replace).await.unwrap();

    assert_eq!(books.source, FetchSource::Empty);
    assert_eq!(notes.source, FetchSource::Cache);
    assert!(h.client.state().lists.read().books.is_empty());
}

#[tokio::test]
async fn failure_while_online_is_a_notice_not_a_banner() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    let mut events = h.client.subscribe();

    h.backend.set_online(false);
    h.client.load_activities(FetchMode::Replace).await.unwrap();

    assert!(!h.client.offline_banner());
    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        SyncEvent::Notice {
            message: hearth_core::sync::LOAD_FAILED_NOTICE.to_string()
        }
    );
}

#[tokio::test]
async fn members_fall_back_to_cache() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    assert_eq!(h.client.state().lists.read().members.len(), 2);

    go_offline(&h).await;
    let summary = h.client.load_members().await.unwrap();
    assert_eq!(summary.source, FetchSource::Cache);
    assert_eq!(h.client.state().lists.read().members.len(), 2);
}

// ============================================================================
// OUTBOX
// ============================================================================

#[tokio::test]
async fn queued_messages_flush_in_order() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    go_offline(&h).await;

    for i in 1..=4 {
        let outcome = h.client.send_message("u2", &format!("m{}", i)).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Queued(_)));
    }
    assert_eq!(h.client.pending_messages("u2").len(), 4);

    let report = go_online(&h).await;
    assert_eq!(report.delivered.len(), 4);
    assert_eq!(report.remaining, 0);
    assert_eq!(h.client.pending_count(), 0);

    let contents: Vec<String> = h
        .backend
        .rows(tables::MESSAGES)
        .iter()
        .map(|r| r["content"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(contents, vec!["m1", "m2", "m3", "m4"]);
}

#[tokio::test]
async fn flush_stops_at_first_failure_and_keeps_the_rest() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    go_offline(&h).await;
    for i in 1..=5 {
        h.client.send_message("u2", &format!("m{}", i)).await.unwrap();
    }

    h.backend.reject_inserts_where(tables::MESSAGES, "content", "m3");
    let report = go_online(&h).await;

    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.failed.len(), 1);
    let left: Vec<String> = h
        .client
        .pending_messages("u2")
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(left, vec!["m3", "m4", "m5"]);

    h.backend.clear_rejections();
    let report = h.client.flush_outbox().await;
    assert_eq!(report.delivered.len(), 3);
    assert_eq!(h.backend.rows(tables::MESSAGES).len(), 5);
}

#[tokio::test]
async fn outbox_survives_a_new_client() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    go_offline(&h).await;
    h.client.send_message("u2", "later").await.unwrap();

    h.backend.set_online(true);
    let second = SyncClient::new(
        Arc::new(h.backend.clone()),
        Arc::new(h.backend.clone()),
        h.store.clone(),
        SyncConfig::default(),
    );
    second.start_session(Session::new("u1"), Some("f1")).await.unwrap();

    assert_eq!(second.pending_count(), 0);
    assert_eq!(h.backend.rows(tables::MESSAGES).len(), 1);
}

#[tokio::test]
async fn rejected_send_is_queued() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    let mut events = h.client.subscribe();
    h.backend.fail_next_inserts(1);

    let outcome = h.client.send_message("u2", "hello").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Queued(_)));
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::MessageQueued { peer_id: "u2".into(), pending: 1 }
    );
    assert!(h.client.send_message("u2", "   ").await.is_err());
}

/// Backend that stores the first message insert but loses the reply
struct LostReply {
    inner: MemoryBackend,
    lost: AtomicBool,
}

#[async_trait]
impl RemoteStore for LostReply {
    async fn select(&self, query: &Query) -> hearth_core::Result<Vec<Value>> {
        self.inner.select(query).await
    }

    async fn insert(&self, table: &str, row: Value) -> hearth_core::Result<Value> {
        let stored = self.inner.insert(table, row).await?;
        if table == tables::MESSAGES && !self.lost.swap(true, Ordering::SeqCst) {
            return Err(Error::Timeout("insert messages".into()));
        }
        Ok(stored)
    }

    async fn update(&self, query: &Query, patch: Value) -> hearth_core::Result<u64> {
        self.inner.update(query, patch).await
    }

    async fn upsert(&self, table: &str, row: Value, conflict: &[&str]) -> hearth_core::Result<Value> {
        self.inner.upsert(table, row, conflict).await
    }

    async fn delete(&self, query: &Query) -> hearth_core::Result<u64> {
        self.inner.delete(query).await
    }

    async fn count(&self, query: &Query) -> hearth_core::Result<u64> {
        self.inner.count(query).await
    }
}

#[tokio::test]
async fn send_stored_without_reply_is_not_stored_twice() {
    let backend = MemoryBackend::new();
    seed_families(&backend);
    let remote = Arc::new(LostReply {
        inner: backend.clone(),
        lost: AtomicBool::new(false),
    });
    let client = SyncClient::new(
        remote,
        Arc::new(backend.clone()),
        Arc::new(MemoryStore::new()),
        SyncConfig::default(),
    );
    client.start_session(Session::new("u1"), None).await.unwrap();

    let SendOutcome::Queued(pending) = client.send_message("u2", "hello").await.unwrap() else {
        panic!("send without a reply should be queued");
    };
    let report = client.flush_outbox().await;
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(client.pending_count(), 0);

    let rows: Vec<Value> = backend
        .rows(tables::MESSAGES)
        .into_iter()
        .filter(|r| r["content"] == "hello")
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], pending.id.as_str());
}

// ============================================================================
// PAGINATION
// ============================================================================

#[tokio::test]
async fn full_last_page_reports_more_until_empty_page() {
    let h = harness().await;
    seed_books(&h.backend, "f1", 20);
    h.client.start_session(Session::new("u1"), None).await.unwrap();

    assert!(h.client.state().cursors.read().get(ListKind::Books).has_more());

    let next = h.client.load_more(ListKind::Books).await.unwrap().unwrap();
    assert_eq!(next.loaded, 0);
    assert!(!next.has_more);
    assert_eq!(h.client.state().lists.read().books.len(), 20);
    assert!(h.client.load_more(ListKind::Books).await.unwrap().is_none());
}

#[tokio::test]
async fn exact_policy_knows_the_last_page() {
    let backend = MemoryBackend::new();
    seed_families(&backend);
    seed_books(&backend, "f1", 20);
    let config = SyncConfig::from_json_str(r#"{ "has_more_policy": "exact" }"#).unwrap();
    let client = SyncClient::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(MemoryStore::new()),
        config,
    );
    client.start_session(Session::new("u1"), None).await.unwrap();

    assert_eq!(client.state().lists.read().books.len(), 20);
    assert!(!client.state().cursors.read().get(ListKind::Books).has_more());
}

#[tokio::test]
async fn search_is_not_cached() {
    let h = harness().await;
    seed_books(&h.backend, "f1", 5);
    h.client.start_session(Session::new("u1"), None).await.unwrap();

    let found = h.client.search(ListKind::Books, "book 3").await.unwrap();
    assert_eq!(found.loaded, 1);

    let cached = h
        .store
        .get(StorageKey::cache(CacheKind::Books, "f1").as_str())
        .unwrap()
        .unwrap();
    let cached: Vec<serde_json::Value> = serde_json::from_str(&cached).unwrap();
    assert_eq!(cached.len(), 5);
}

#[tokio::test]
async fn failed_append_keeps_page_and_list() {
    let h = harness().await;
    seed_books(&h.backend, "f1", 25);
    h.client.start_session(Session::new("u1"), None).await.unwrap();

    go_offline(&h).await;
    let summary = h.client.load_more(ListKind::Books).await.unwrap().unwrap();
    assert!(summary.error.is_some());
    assert_eq!(h.client.state().lists.read().books.len(), 20);
    assert_eq!(h.client.state().cursors.read().get(ListKind::Books).page(), 0);

    go_online(&h).await;
    let summary = h.client.load_more(ListKind::Books).await.unwrap().unwrap();
    assert_eq!(summary.loaded, 5);
    assert_eq!(h.client.state().lists.read().books.len(), 25);
}

// ============================================================================
// CONVERSATION
// ============================================================================

#[tokio::test]
async fn conversation_is_oldest_first_and_pages_backwards() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    let rows = (0..35).map(|i| {
        let (from, to) = if i % 2 == 0 { ("u1", "u2") } else { ("u2", "u1") };
        json!({ "family_id": "f1", "sender_id": from, "receiver_id": to, "content": format!("c{}", i) })
    });
    h.backend.seed(tables::MESSAGES, rows);
    h.backend.seed(
        tables::MESSAGES,
        vec![json!({ "family_id": "f1", "sender_id": "u1", "receiver_id": "u9", "content": "other" })],
    );

    h.client.open_conversation("u2").await.unwrap();
    {
        let lists = h.client.state().lists.read();
        assert_eq!(lists.conversation.len(), 30);
        assert_eq!(lists.conversation.first().unwrap().content, "c5");
        assert_eq!(lists.conversation.last().unwrap().content, "c34");
    }

    h.client.load_more(ListKind::Conversation).await.unwrap();
    let lists = h.client.state().lists.read();
    assert_eq!(lists.conversation.len(), 35);
    assert_eq!(lists.conversation.first().unwrap().content, "c0");
}

// ============================================================================
// REALTIME
// ============================================================================

#[tokio::test]
async fn switching_family_rebinds_only_the_new_family() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), Some("f1")).await.unwrap();
    assert!(h.client.realtime_channels().iter().all(|c| c.ends_with("-f1")));

    h.client.switch_family("f2").await.unwrap();
    let mut channels = h.backend.subscribed_channels();
    channels.sort();
    assert_eq!(channels.len(), 4);
    assert!(channels.iter().all(|c| c.ends_with("-f2")));

    h.client.set_view(View::Activities);
    h.backend
        .insert(tables::ACTIVITIES, json!({ "family_id": "f1", "title": "old" }))
        .await
        .unwrap();
    let stale = Invalidation {
        family_id: "f1".into(),
        table: WatchedTable::Activities,
        kind: ChangeKind::Insert,
    };
    assert!(!h.client.handle_invalidation(&stale).await.unwrap());
    assert!(h.client.state().lists.read().activities.is_empty());
}

#[tokio::test]
async fn invalidation_refetches_visible_list_only() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    h.client.set_view(View::Activities);

    h.backend
        .insert(
            tables::ACTIVITIES,
            json!({ "family_id": "f1", "title": "Zoo", "datetime": "2026-06-01T10:00:00Z" }),
        )
        .await
        .unwrap();
    let invalidation = tokio::time::timeout(Duration::from_secs(1), h.client.recv_invalidation())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invalidation.table, WatchedTable::Activities);
    assert!(h.client.handle_invalidation(&invalidation).await.unwrap());
    assert_eq!(h.client.state().lists.read().activities.len(), 1);

    h.client.set_view(View::Books);
    assert!(!h.client.handle_invalidation(&invalidation).await.unwrap());
}

#[tokio::test]
async fn invalidation_drops_deeper_pages() {
    let h = harness().await;
    h.backend.seed(
        tables::ACTIVITIES,
        (0..25).map(|i| {
            json!({
                "family_id": "f1",
                "title": format!("Activity {}", i),
                "datetime": format!("2026-06-{:02}T10:00:00Z", i + 1),
            })
        }),
    );
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    h.client.set_view(View::Activities);

    h.client.load_more(ListKind::Activities).await.unwrap().unwrap();
    assert_eq!(h.client.state().lists.read().activities.len(), 25);
    assert_eq!(h.client.state().cursors.read().get(ListKind::Activities).page(), 1);

    let invalidation = Invalidation {
        family_id: "f1".into(),
        table: WatchedTable::Activities,
        kind: ChangeKind::Update,
    };
    assert!(h.client.handle_invalidation(&invalidation).await.unwrap());

    assert_eq!(h.client.state().lists.read().activities.len(), 20);
    let cursors = h.client.state().cursors.read();
    assert_eq!(cursors.get(ListKind::Activities).page(), 0);
    assert!(cursors.get(ListKind::Activities).has_more());
}

#[tokio::test]
async fn pump_applies_invalidations_in_background() {
    let h = harness().await;
    let client = Arc::new(h.client);
    client.start_session(Session::new("u1"), None).await.unwrap();
    client.set_view(View::Notes);
    let pump = client.spawn_invalidation_pump().await.unwrap();
    assert!(client.spawn_invalidation_pump().await.is_none());

    h.backend.seed(
        tables::NOTES,
        vec![json!({ "id": "n1", "title": "Lunch", "book_id": "b1", "family_id": "f1", "created_by": "u1" })],
    );
    h.backend
        .insert(
            tables::PARAGRAPHS,
            json!({ "note_id": "n1", "family_id": "f1", "author_id": "u1", "content_html": "hi" }),
        )
        .await
        .unwrap();

    let mut loaded = false;
    for _ in 0..50 {
        if !client.state().lists.read().notes.is_empty() {
            loaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(loaded);
    pump.abort();
}

#[tokio::test]
async fn refresh_rebinds_dropped_channels() {
    let h = harness().await;
    h.client.start_session(Session::new("u1"), None).await.unwrap();
    h.backend.drop_channels();
    assert!(h.backend.subscribed_channels().is_empty());

    assert_ok!(h.client.refresh().await);
    assert_eq!(h.backend.subscribed_channels().len(), 4);
}
