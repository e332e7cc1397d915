//! # Content Module
//!
//! Books, notes and paragraphs: the writes, plus the detail reads that are
//! never mirrored locally. List loading lives in the client, behind the
//! cache.
//!
//! ## Ownership Rules
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WHO MAY CHANGE WHAT                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Book       any member of the family                                   │
//! │  Note       creator (created_by) renames and deletes                   │
//! │  Paragraph  author (author_id) edits and deletes                       │
//! │                                                                         │
//! │  Deleting the last paragraph of a note deletes the note as well,       │
//! │  when the same user created it.                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::json;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{tables, Book, Note, Paragraph};
use crate::remote::{parse_row, select_as, Query, RemoteStore};
use crate::state::{AppState, Scope};
use crate::storage::{KeyValueStore, StorageKey};

/// Input for a new note
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    /// Title (required)
    pub title: String,
    /// Book the note goes in (required)
    pub book_id: String,
    /// Optional first paragraph
    pub first_paragraph: Option<String>,
}

/// What a paragraph deletion removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphDeletion {
    /// The note had no paragraphs left and was deleted too
    pub note_deleted: bool,
}

/// Book, note and paragraph operations
pub struct ContentService {
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    state: Arc<AppState>,
    config: Arc<SyncConfig>,
}

impl ContentService {
    /// Create a new content service
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn KeyValueStore>,
        state: Arc<AppState>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            remote,
            store,
            state,
            config,
        }
    }

    fn author_name(&self) -> Option<String> {
        self.state
            .session
            .read()
            .as_ref()
            .and_then(|s| s.display_name.clone().or_else(|| s.email.clone()))
    }

    // ========================================================================
    // BOOKS
    // ========================================================================

    /// Create a book in the active family
    pub async fn create_book(&self, title: &str, description: &str) -> Result<Book> {
        let title = required(title, "title")?;
        let scope = self.state.scope()?;
        let row = self
            .remote
            .insert(
                tables::BOOKS,
                json!({
                    "family_id": scope.family_id,
                    "title": title,
                    "description": description.trim(),
                }),
            )
            .await?;
        parse_row(row)
    }

    /// Change a book's title and description
    pub async fn update_book(&self, book_id: &str, title: &str, description: &str) -> Result<()> {
        let title = required(title, "title")?;
        let scope = self.state.scope()?;
        let updated = self
            .remote
            .update(
                &Query::table(tables::BOOKS)
                    .eq("id", book_id)
                    .eq("family_id", scope.family_id.as_str()),
                json!({ "title": title, "description": description.trim() }),
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound(format!("book {}", book_id)));
        }
        Ok(())
    }

    /// Delete a book of the active family
    pub async fn delete_book(&self, book_id: &str) -> Result<()> {
        let scope = self.state.scope()?;
        let deleted = self
            .remote
            .delete(
                &Query::table(tables::BOOKS)
                    .eq("id", book_id)
                    .eq("family_id", scope.family_id.as_str()),
            )
            .await?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("book {}", book_id)));
        }
        tracing::info!(book_id, "Book deleted");
        Ok(())
    }

    // ========================================================================
    // NOTES
    // ========================================================================

    /// Create a note, with its first paragraph when one is given.
    /// The book must belong to the active family.
    pub async fn create_note(&self, new: NewNote) -> Result<Note> {
        let title = required(&new.title, "title")?;
        let book_id = required(&new.book_id, "book")?;
        let scope = self.state.scope()?;

        let books = self
            .remote
            .count(
                &Query::table(tables::BOOKS)
                    .eq("id", book_id)
                    .eq("family_id", scope.family_id.as_str()),
            )
            .await?;
        if books == 0 {
            return Err(Error::NotFound(format!("book {}", book_id)));
        }

        let row = self
            .remote
            .insert(
                tables::NOTES,
                json!({
                    "family_id": scope.family_id,
                    "book_id": book_id,
                    "title": title,
                    "created_by": scope.user_id,
                }),
            )
            .await?;
        let note: Note = parse_row(row)?;

        if let Some(first) = new.first_paragraph.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            self.insert_paragraph(&scope, &note.id, first).await?;
        }
        tracing::info!(note_id = %note.id, "Note created");
        Ok(note)
    }

    /// Rename a note. Creator only.
    pub async fn rename_note(&self, note_id: &str, title: &str) -> Result<()> {
        let title = required(title, "title")?;
        let scope = self.state.scope()?;
        let updated = self
            .remote
            .update(
                &Query::table(tables::NOTES)
                    .eq("id", note_id)
                    .eq("family_id", scope.family_id.as_str())
                    .eq("created_by", scope.user_id.as_str()),
                json!({ "title": title }),
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotAuthor("note".into()));
        }
        Ok(())
    }

    /// Delete a note. Creator only.
    pub async fn delete_note(&self, note_id: &str) -> Result<()> {
        let scope = self.state.scope()?;
        let deleted = self
            .remote
            .delete(
                &Query::table(tables::NOTES)
                    .eq("id", note_id)
                    .eq("family_id", scope.family_id.as_str())
                    .eq("created_by", scope.user_id.as_str()),
            )
            .await?;
        if deleted == 0 {
            return Err(Error::NotAuthor("note".into()));
        }
        tracing::info!(note_id, "Note deleted");
        Ok(())
    }

    async fn note_in_scope(&self, scope: &Scope, note_id: &str) -> Result<Note> {
        let found: Vec<Note> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::NOTES)
                .eq("id", note_id)
                .eq("family_id", scope.family_id.as_str()),
        )
        .await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("note {}", note_id)))
    }

    // ========================================================================
    // PARAGRAPHS
    // ========================================================================

    /// Every paragraph of a note, oldest first
    pub async fn paragraphs(&self, note_id: &str) -> Result<Vec<Paragraph>> {
        let family_id = self.state.family_id()?;
        select_as(
            self.remote.as_ref(),
            &Query::table(tables::PARAGRAPHS)
                .eq("note_id", note_id)
                .eq("family_id", family_id.as_str())
                .order_asc("created_at"),
        )
        .await
    }

    /// Preview chunk `chunk` (0-based) of a note's paragraphs
    pub async fn preview(&self, note_id: &str, chunk: usize) -> Result<Vec<Paragraph>> {
        let family_id = self.state.family_id()?;
        let size = self.config.preview_chunk_size;
        select_as(
            self.remote.as_ref(),
            &Query::table(tables::PARAGRAPHS)
                .eq("note_id", note_id)
                .eq("family_id", family_id.as_str())
                .order_asc("created_at")
                .range(chunk * size, size),
        )
        .await
    }

    /// Append a paragraph to a note of the active family and drop the local
    /// draft of that note
    pub async fn add_paragraph(&self, note_id: &str, content: &str) -> Result<Paragraph> {
        let content = required(content, "content")?;
        let scope = self.state.scope()?;
        self.note_in_scope(&scope, note_id).await?;
        let paragraph = self.insert_paragraph(&scope, note_id, content).await?;
        if let Err(e) = self.store.remove(StorageKey::note_draft(note_id).as_str()) {
            tracing::warn!(note_id, error = %e, "Failed to clear draft");
        }
        Ok(paragraph)
    }

    async fn insert_paragraph(&self, scope: &Scope, note_id: &str, content: &str) -> Result<Paragraph> {
        let row = self
            .remote
            .insert(
                tables::PARAGRAPHS,
                json!({
                    "note_id": note_id,
                    "family_id": scope.family_id,
                    "author_id": scope.user_id,
                    "author_name": self.author_name(),
                    "content_html": content,
                }),
            )
            .await?;
        parse_row(row)
    }

    /// Replace a paragraph's content. Author only.
    pub async fn edit_paragraph(&self, paragraph_id: &str, content: &str) -> Result<()> {
        let content = required(content, "content")?;
        let scope = self.state.scope()?;
        let updated = self
            .remote
            .update(
                &Query::table(tables::PARAGRAPHS)
                    .eq("id", paragraph_id)
                    .eq("family_id", scope.family_id.as_str())
                    .eq("author_id", scope.user_id.as_str()),
                json!({ "content_html": content }),
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotAuthor("paragraph".into()));
        }
        Ok(())
    }

    /// Delete a paragraph. Author only. Removes the note once it is empty.
    pub async fn delete_paragraph(&self, paragraph_id: &str) -> Result<ParagraphDeletion> {
        let scope = self.state.scope()?;
        let family_id = scope.family_id.as_str();
        let found: Vec<Paragraph> = select_as(
            self.remote.as_ref(),
            &Query::table(tables::PARAGRAPHS)
                .eq("id", paragraph_id)
                .eq("family_id", family_id),
        )
        .await?;
        let paragraph = found
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("paragraph {}", paragraph_id)))?;
        if paragraph.author_id != scope.user_id {
            return Err(Error::NotAuthor("paragraph".into()));
        }

        let deleted = self
            .remote
            .delete(
                &Query::table(tables::PARAGRAPHS)
                    .eq("id", paragraph_id)
                    .eq("family_id", family_id)
                    .eq("author_id", scope.user_id.as_str()),
            )
            .await?;
        if deleted == 0 {
            return Err(Error::NotAuthor("paragraph".into()));
        }

        let left = self
            .remote
            .count(
                &Query::table(tables::PARAGRAPHS)
                    .eq("note_id", paragraph.note_id.as_str())
                    .eq("family_id", family_id),
            )
            .await?;
        if left > 0 {
            return Ok(ParagraphDeletion { note_deleted: false });
        }

        let removed = self
            .remote
            .delete(
                &Query::table(tables::NOTES)
                    .eq("id", paragraph.note_id.as_str())
                    .eq("family_id", family_id)
                    .eq("created_by", scope.user_id.as_str()),
            )
            .await?;
        if removed > 0 {
            tracing::info!(note_id = %paragraph.note_id, "Empty note deleted");
        }
        Ok(ParagraphDeletion {
            note_deleted: removed > 0,
        })
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(Error::InvalidInput(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use crate::state::Session;
    use crate::storage::MemoryStore;

    struct Fixture {
        backend: MemoryBackend,
        store: Arc<MemoryStore>,
        state: Arc<AppState>,
        content: ContentService,
    }

    fn fixture(user: &str) -> Fixture {
        let backend = MemoryBackend::new();
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(SyncConfig::default());
        let state = Arc::new(AppState::new(&config));
        *state.session.write() = Some(Session {
            user_id: user.into(),
            email: None,
            display_name: Some(format!("User {}", user)),
            manager: false,
        });
        *state.family_id.write() = Some("f1".into());
        backend.seed(tables::BOOKS, vec![json!({ "id": "b1", "title": "Trips", "family_id": "f1" })]);
        backend.seed(
            tables::NOTES,
            vec![json!({ "id": "n1", "title": "Packing", "book_id": "b1", "family_id": "f1", "created_by": user })],
        );
        let content = ContentService::new(
            Arc::new(backend.clone()),
            store.clone(),
            state.clone(),
            config,
        );
        Fixture { backend, store, state, content }
    }

    fn switch_user(fx: &Fixture, user: &str) {
        *fx.state.session.write() = Some(Session::new(user));
    }

    #[tokio::test]
    async fn test_note_requires_title_and_book() {
        let fx = fixture("u1");
        let result = fx.content.create_note(NewNote { title: "x".into(), ..Default::default() }).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_note_with_first_paragraph() {
        let fx = fixture("u1");
        let book = fx.content.create_book("Recipes", "").await.unwrap();
        let note = fx
            .content
            .create_note(NewNote {
                title: "Cake".into(),
                book_id: book.id.clone(),
                first_paragraph: Some("<p>flour</p>".into()),
            })
            .await
            .unwrap();

        let paragraphs = fx.content.paragraphs(&note.id).await.unwrap();
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].author_name.as_deref(), Some("User u1"));
        assert_eq!(paragraphs[0].family_id, "f1");
    }

    #[tokio::test]
    async fn test_only_author_edits_paragraph() {
        let fx = fixture("u1");
        let p = fx.content.add_paragraph("n1", "mine").await.unwrap();

        switch_user(&fx, "u2");
        assert!(matches!(
            fx.content.edit_paragraph(&p.id, "theirs").await,
            Err(Error::NotAuthor(_))
        ));
        assert!(matches!(
            fx.content.delete_paragraph(&p.id).await,
            Err(Error::NotAuthor(_))
        ));

        switch_user(&fx, "u1");
        fx.content.edit_paragraph(&p.id, "still mine").await.unwrap();
        assert_eq!(fx.backend.rows(tables::PARAGRAPHS)[0]["content_html"], "still mine");
    }

    #[tokio::test]
    async fn test_deleting_last_paragraph_deletes_note() {
        let fx = fixture("u1");
        let note = fx
            .content
            .create_note(NewNote {
                title: "Trip".into(),
                book_id: "b1".into(),
                first_paragraph: Some("day one".into()),
            })
            .await
            .unwrap();
        let second = fx.content.add_paragraph(&note.id, "day two").await.unwrap();
        let first = fx.content.paragraphs(&note.id).await.unwrap()[0].clone();

        let outcome = fx.content.delete_paragraph(&second.id).await.unwrap();
        assert!(!outcome.note_deleted);

        let outcome = fx.content.delete_paragraph(&first.id).await.unwrap();
        assert!(outcome.note_deleted);
        assert!(fx.backend.rows(tables::NOTES).iter().all(|n| n["id"] != note.id.as_str()));
    }

    #[tokio::test]
    async fn test_add_paragraph_clears_draft() {
        let fx = fixture("u1");
        let key = StorageKey::note_draft("n1");
        fx.store.set(key.as_str(), "half written").unwrap();

        fx.content.add_paragraph("n1", "done").await.unwrap();
        assert_eq!(fx.store.get(key.as_str()).unwrap(), None);
        assert!(matches!(fx.content.add_paragraph("n1", "   ").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_preview_chunks() {
        let fx = fixture("u1");
        for i in 0..12 {
            fx.content.add_paragraph("n1", &format!("p{}", i)).await.unwrap();
        }
        let first = fx.content.preview("n1", 0).await.unwrap();
        let second = fx.content.preview("n1", 1).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].content, "p0");
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].content, "p11");
    }

    #[tokio::test]
    async fn test_note_creator_only_delete() {
        let fx = fixture("u1");
        let note = fx
            .content
            .create_note(NewNote { title: "N".into(), book_id: "b1".into(), first_paragraph: None })
            .await
            .unwrap();

        switch_user(&fx, "u2");
        assert!(matches!(fx.content.delete_note(&note.id).await, Err(Error::NotAuthor(_))));
        assert!(matches!(fx.content.rename_note(&note.id, "Mine").await, Err(Error::NotAuthor(_))));

        switch_user(&fx, "u1");
        fx.content.rename_note(&note.id, "Renamed").await.unwrap();
        fx.content.delete_note(&note.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_book_update_and_delete_scoped_to_family() {
        let fx = fixture("u1");
        let book = fx.content.create_book("Garden", "plans").await.unwrap();
        fx.content.update_book(&book.id, "Garden 2", "").await.unwrap();

        *fx.state.family_id.write() = Some("f2".into());
        assert!(matches!(fx.content.delete_book(&book.id).await, Err(Error::NotFound(_))));

        *fx.state.family_id.write() = Some("f1".into());
        fx.content.delete_book(&book.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_note_needs_book_of_active_family() {
        let fx = fixture("u1");
        fx.backend.seed(tables::BOOKS, vec![json!({ "id": "b9", "title": "Theirs", "family_id": "f9" })]);

        let result = fx
            .content
            .create_note(NewNote { title: "N".into(), book_id: "b9".into(), first_paragraph: None })
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(matches!(fx.content.add_paragraph("n9", "hi").await, Err(Error::NotFound(_))));
        assert_eq!(fx.backend.rows(tables::NOTES).len(), 1);
        assert!(fx.backend.rows(tables::PARAGRAPHS).is_empty());
    }
}
