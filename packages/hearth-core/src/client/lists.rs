//! List loading: every paginated list goes through the same cursor and
//! cached-fetch path.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::SyncClient;
use crate::error::{Error, Result};
use crate::events::{emit, SyncEvent};
use crate::model::{tables, Membership, Profile};
use crate::remote::{parse_rows, Filter, Query};
use crate::state::{ListKind, Lists, Scope, View};
use crate::storage::{CacheKind, StorageKey};
use crate::sync::{FetchMode, FetchOutcome, FetchSource, PageRequest};

/// What a list load produced
#[derive(Debug)]
pub struct LoadSummary {
    /// Where the rows came from
    pub source: FetchSource,
    /// Rows received by this load
    pub loaded: usize,
    /// Whether the list reports more pages
    pub has_more: bool,
    /// Why the load was degraded, if it was
    pub error: Option<Error>,
}

impl LoadSummary {
    fn skipped() -> Self {
        Self {
            source: FetchSource::Empty,
            loaded: 0,
            has_more: false,
            error: None,
        }
    }
}

fn view_of(kind: ListKind) -> View {
    match kind {
        ListKind::Books | ListKind::BookNotes => View::Books,
        ListKind::Notes => View::Notes,
        ListKind::Activities => View::Activities,
        ListKind::Conversation => View::Chat,
    }
}

fn merge<T>(list: &mut Vec<T>, rows: Vec<T>, mode: FetchMode) {
    match mode {
        FetchMode::Replace => *list = rows,
        FetchMode::Append => list.extend(rows),
    }
}

impl SyncClient {
    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    /// Reload books, notes, activities and members of the active family.
    ///
    /// Pagination and search terms are reset first. Without an active family
    /// the lists are cleared.
    pub async fn load_all(&self) -> Result<()> {
        if self.state.family_id.read().is_none() {
            *self.state.lists.write() = Lists::default();
            return Ok(());
        }
        self.state.cursors.write().reset_all();

        let (books, notes, activities, members) = futures::join!(
            self.load_books(FetchMode::Replace),
            self.load_notes(FetchMode::Replace),
            self.load_activities(FetchMode::Replace),
            self.load_members(),
        );
        books?;
        notes?;
        activities?;
        members?;
        Ok(())
    }

    /// Load `kind` in `mode`
    pub async fn load(&self, kind: ListKind, mode: FetchMode) -> Result<LoadSummary> {
        match kind {
            ListKind::Books => self.load_books(mode).await,
            ListKind::Notes => self.load_notes(mode).await,
            ListKind::Activities => self.load_activities(mode).await,
            ListKind::Conversation => self.load_conversation(mode).await,
            ListKind::BookNotes => self.load_book_notes(mode).await,
        }
    }

    /// Append the next page of `kind`, if the cursor says there is one
    pub async fn load_more(&self, kind: ListKind) -> Result<Option<LoadSummary>> {
        if !self.state.cursors.read().get(kind).has_more() {
            return Ok(None);
        }
        self.load(kind, FetchMode::Append).await.map(Some)
    }

    /// Filter `kind` by `term` (blank clears the filter) and reload page 0
    pub async fn search(&self, kind: ListKind, term: &str) -> Result<LoadSummary> {
        self.state.cursors.write().get_mut(kind).set_term(Some(term));
        self.load(kind, FetchMode::Replace).await
    }

    // ========================================================================
    // LISTS
    // ========================================================================

    /// Books, newest first; searchable by title and description
    pub async fn load_books(&self, mode: FetchMode) -> Result<LoadSummary> {
        self.load_page(ListKind::Books, mode, Some(CacheKind::Books), |scope, term| {
            let query = Query::table(tables::BOOKS)
                .eq("family_id", scope.family_id.as_str())
                .order_desc("created_at");
            match term {
                Some(term) => query.search(&["title", "description"], term),
                None => query,
            }
        }, |lists, rows, mode| merge(&mut lists.books, rows, mode))
        .await
    }

    /// Notes, newest first; searchable by title
    pub async fn load_notes(&self, mode: FetchMode) -> Result<LoadSummary> {
        self.load_page(ListKind::Notes, mode, Some(CacheKind::Notes), |scope, term| {
            let query = Query::table(tables::NOTES)
                .eq("family_id", scope.family_id.as_str())
                .order_desc("created_at");
            match term {
                Some(term) => query.contains("title", term),
                None => query,
            }
        }, |lists, rows, mode| merge(&mut lists.notes, rows, mode))
        .await
    }

    /// Activities, latest date first; searchable by title, description and
    /// location
    pub async fn load_activities(&self, mode: FetchMode) -> Result<LoadSummary> {
        self.load_page(ListKind::Activities, mode, Some(CacheKind::Activities), |scope, term| {
            let query = Query::table(tables::ACTIVITIES)
                .eq("family_id", scope.family_id.as_str())
                .order_desc("datetime");
            match term {
                Some(term) => query.search(&["title", "description", "location"], term),
                None => query,
            }
        }, |lists, rows, mode| merge(&mut lists.activities, rows, mode))
        .await
    }

    /// Notes of the open book, newest first. Never cached.
    pub async fn load_book_notes(&self, mode: FetchMode) -> Result<LoadSummary> {
        let Some(book_id) = self.state.open_book.read().clone() else {
            return Ok(LoadSummary::skipped());
        };
        self.load_page(ListKind::BookNotes, mode, None, |scope, _| {
            Query::table(tables::NOTES)
                .eq("family_id", scope.family_id.as_str())
                .eq("book_id", book_id.as_str())
                .order_desc("created_at")
        }, |lists, rows, mode| merge(&mut lists.book_notes, rows, mode))
        .await
    }

    /// Open conversation. The server returns newest first; the list is kept
    /// oldest first, and older pages go in front.
    pub async fn load_conversation(&self, mode: FetchMode) -> Result<LoadSummary> {
        let Some(peer_id) = self.state.open_peer.read().clone() else {
            return Ok(LoadSummary::skipped());
        };
        let scope = self.state.scope()?;
        let key = StorageKey::conversation(&scope.family_id, &peer_id);

        self.load_page_with_key(ListKind::Conversation, mode, Some(key), |scope, _| {
            Query::table(tables::MESSAGES)
                .eq("family_id", scope.family_id.as_str())
                .any(vec![
                    vec![
                        Filter::eq("sender_id", scope.user_id.as_str()),
                        Filter::eq("receiver_id", peer_id.as_str()),
                    ],
                    vec![
                        Filter::eq("sender_id", peer_id.as_str()),
                        Filter::eq("receiver_id", scope.user_id.as_str()),
                    ],
                ])
                .order_desc("created_at")
        }, |lists, mut rows, mode| {
            rows.reverse();
            match mode {
                FetchMode::Replace => lists.conversation = rows,
                FetchMode::Append => {
                    rows.append(&mut lists.conversation);
                    lists.conversation = rows;
                }
            }
        })
        .await
    }

    /// Member profiles of the active family, cached as one entry
    pub async fn load_members(&self) -> Result<LoadSummary> {
        let scope = self.state.scope()?;
        let key = StorageKey::cache(CacheKind::Members, &scope.family_id);

        let outcome: FetchOutcome<Profile> = self
            .fetcher
            .fetch(Some(&key), self.read_members(&scope.family_id))
            .await;

        let loaded = outcome.rows.len();
        self.state.lists.write().members = outcome.rows;
        emit(&self.events, SyncEvent::ViewRefreshed { view: View::Family });
        Ok(LoadSummary {
            source: outcome.source,
            loaded,
            has_more: false,
            error: outcome.error,
        })
    }

    fn read_members<'a>(&'a self, family_id: &'a str) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let memberships: Vec<Membership> = parse_rows(
                self.remote
                    .select(&Query::table(tables::FAMILY_MEMBERS).eq("family_id", family_id))
                    .await?,
            )?;
            if memberships.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<String> = memberships.into_iter().map(|m| m.user_id).collect();
            self.remote
                .select(&Query::table(tables::PROFILES).in_list("id", ids))
                .await
        })
    }

    // ========================================================================
    // SHARED PAGE LOADER
    // ========================================================================

    async fn load_page<T, Q, A>(
        &self,
        kind: ListKind,
        mode: FetchMode,
        cache: Option<CacheKind>,
        query: Q,
        apply: A,
    ) -> Result<LoadSummary>
    where
        T: DeserializeOwned,
        Q: FnOnce(&Scope, Option<&str>) -> Query,
        A: FnOnce(&mut Lists, Vec<T>, FetchMode),
    {
        let family_id = self.state.family_id()?;
        let key = cache.map(|kind| StorageKey::cache(kind, &family_id));
        self.load_page_with_key(kind, mode, key, query, apply).await
    }

    /// Fetch one page of `kind` and merge it into the lists.
    ///
    /// Only unfiltered first pages are mirrored to (and served from) `key`.
    /// A degraded append leaves both the cursor and the list untouched, so
    /// the same page is asked for again next time.
    async fn load_page_with_key<T, Q, A>(
        &self,
        kind: ListKind,
        mode: FetchMode,
        key: Option<StorageKey>,
        query: Q,
        apply: A,
    ) -> Result<LoadSummary>
    where
        T: DeserializeOwned,
        Q: FnOnce(&Scope, Option<&str>) -> Query,
        A: FnOnce(&mut Lists, Vec<T>, FetchMode),
    {
        let scope = self.state.scope()?;
        let (request, key, term): (PageRequest, Option<StorageKey>, Option<String>) = {
            let cursors = self.state.cursors.read();
            let cursor = cursors.get(kind);
            let request = cursor.begin(mode);
            let key = key.filter(|_| cursor.is_cacheable(&request));
            (request, key, cursor.term().map(str::to_string))
        };

        let query = query(&scope, term.as_deref()).range(request.offset, request.limit);
        let outcome: FetchOutcome<T> = self
            .fetcher
            .fetch(key.as_ref(), self.remote.select(&query))
            .await;

        if mode == FetchMode::Append && outcome.is_degraded() {
            tracing::debug!(?kind, page = request.page, "Append failed, keeping current page");
            return Ok(LoadSummary {
                source: outcome.source,
                loaded: 0,
                has_more: self.state.cursors.read().get(kind).has_more(),
                error: outcome.error,
            });
        }

        let FetchOutcome { mut rows, source, error } = outcome;
        let has_more = {
            let mut cursors = self.state.cursors.write();
            let cursor = cursors.get_mut(kind);
            cursor.complete(&request, &mut rows);
            cursor.has_more()
        };
        let loaded = rows.len();
        apply(&mut *self.state.lists.write(), rows, mode);

        tracing::debug!(?kind, page = request.page, loaded, ?source, "List loaded");
        emit(&self.events, SyncEvent::ViewRefreshed { view: view_of(kind) });
        Ok(LoadSummary {
            source,
            loaded,
            has_more,
            error,
        })
    }
}
