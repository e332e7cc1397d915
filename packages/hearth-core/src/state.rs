//! # Application State
//!
//! Everything the UI renders from, in one injected container. Each field sits
//! behind its own lock; no lock is ever held across an `.await`, and
//! concurrent loads follow last-writer-wins.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           APP STATE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  session ─────► user id                 ┐                              │
//! │  family_id ───► active family           ┴─► Scope (required by writes) │
//! │  families, role                                                        │
//! │  view, open_peer, open_book             (what is on screen)            │
//! │  lists   books / notes / activities / members / conversation / book    │
//! │  cursors one pagination Cursor per paginated list                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{Activity, Book, Family, Message, Note, Profile, Role};
use crate::sync::Cursor;

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User id
    pub user_id: String,
    /// Email, if known
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, if known
    #[serde(default)]
    pub display_name: Option<String>,
    /// Signed in as a family manager
    #[serde(default)]
    pub manager: bool,
}

impl Session {
    /// Session for `user_id` with no profile details
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            display_name: None,
            manager: false,
        }
    }

    /// Name published on the profile: the display name, else the local part
    /// of the email
    pub fn profile_name(&self) -> Option<String> {
        if let Some(name) = self.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .map(str::to_string)
    }
}

/// Screen currently shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Notes list
    #[default]
    Notes,
    /// Books list (and an open book)
    Books,
    /// Activities list
    Activities,
    /// Chat list and an open conversation
    Chat,
    /// Family members and settings
    Family,
}

/// Paginated lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Books of the family
    Books,
    /// Notes of the family
    Notes,
    /// Activities of the family
    Activities,
    /// Open conversation
    Conversation,
    /// Notes of the open book
    BookNotes,
}

/// Who and where: required by every scoped operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Signed-in user
    pub user_id: String,
    /// Active family
    pub family_id: String,
}

/// Loaded list contents
#[derive(Debug, Clone, Default)]
pub struct Lists {
    /// Books, newest first
    pub books: Vec<Book>,
    /// Notes, newest first
    pub notes: Vec<Note>,
    /// Activities, latest first
    pub activities: Vec<Activity>,
    /// Member profiles
    pub members: Vec<Profile>,
    /// Open conversation, oldest first
    pub conversation: Vec<Message>,
    /// Notes of the open book, newest first
    pub book_notes: Vec<Note>,
}

/// One cursor per paginated list
#[derive(Debug, Clone)]
pub struct Cursors {
    /// Books
    pub books: Cursor,
    /// Notes
    pub notes: Cursor,
    /// Activities
    pub activities: Cursor,
    /// Open conversation
    pub conversation: Cursor,
    /// Notes of the open book
    pub book_notes: Cursor,
}

impl Cursors {
    /// Fresh cursors sized from `config`
    pub fn new(config: &SyncConfig) -> Self {
        let policy = config.has_more_policy;
        Self {
            books: Cursor::new(config.books_page_size, policy),
            notes: Cursor::new(config.notes_page_size, policy),
            activities: Cursor::new(config.activities_page_size, policy),
            conversation: Cursor::new(config.conversation_page_size, policy),
            book_notes: Cursor::new(config.book_notes_page_size, policy),
        }
    }

    /// Cursor of `kind`
    pub fn get(&self, kind: ListKind) -> &Cursor {
        match kind {
            ListKind::Books => &self.books,
            ListKind::Notes => &self.notes,
            ListKind::Activities => &self.activities,
            ListKind::Conversation => &self.conversation,
            ListKind::BookNotes => &self.book_notes,
        }
    }

    /// Mutable cursor of `kind`
    pub fn get_mut(&mut self, kind: ListKind) -> &mut Cursor {
        match kind {
            ListKind::Books => &mut self.books,
            ListKind::Notes => &mut self.notes,
            ListKind::Activities => &mut self.activities,
            ListKind::Conversation => &mut self.conversation,
            ListKind::BookNotes => &mut self.book_notes,
        }
    }

    /// Reset every cursor
    pub fn reset_all(&mut self) {
        self.books.reset();
        self.notes.reset();
        self.activities.reset();
        self.conversation.reset();
        self.book_notes.reset();
    }
}

/// Shared application state
pub struct AppState {
    /// Signed-in user
    pub session: RwLock<Option<Session>>,
    /// Families the user can pick from
    pub families: RwLock<Vec<Family>>,
    /// Active family
    pub family_id: RwLock<Option<String>>,
    /// Role in the active family
    pub role: RwLock<Option<Role>>,
    /// Screen shown
    pub view: RwLock<View>,
    /// Peer of the open conversation
    pub open_peer: RwLock<Option<String>>,
    /// Open book
    pub open_book: RwLock<Option<String>>,
    /// List contents
    pub lists: RwLock<Lists>,
    /// Pagination
    pub cursors: RwLock<Cursors>,
}

impl AppState {
    /// Empty state
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            session: RwLock::new(None),
            families: RwLock::new(Vec::new()),
            family_id: RwLock::new(None),
            role: RwLock::new(None),
            view: RwLock::new(View::default()),
            open_peer: RwLock::new(None),
            open_book: RwLock::new(None),
            lists: RwLock::new(Lists::default()),
            cursors: RwLock::new(Cursors::new(config)),
        }
    }

    /// Signed-in user id
    pub fn user_id(&self) -> Result<String> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or(Error::NotSignedIn)
    }

    /// Active family id
    pub fn family_id(&self) -> Result<String> {
        self.family_id.read().clone().ok_or(Error::NoFamilySelected)
    }

    /// User and family, or the reason there is none
    pub fn scope(&self) -> Result<Scope> {
        Ok(Scope {
            user_id: self.user_id()?,
            family_id: self.family_id()?,
        })
    }

    /// Screen shown
    pub fn view(&self) -> View {
        *self.view.read()
    }

    /// Whether the user owns the active family
    pub fn is_owner(&self) -> bool {
        *self.role.read() == Some(Role::Owner)
    }

    /// Forget everything scoped to the active family
    pub fn clear_family_data(&self) {
        *self.lists.write() = Lists::default();
        self.cursors.write().reset_all();
        *self.role.write() = None;
        *self.open_peer.write() = None;
        *self.open_book.write() = None;
    }

    /// Forget everything
    pub fn clear(&self) {
        self.clear_family_data();
        *self.session.write() = None;
        *self.families.write() = Vec::new();
        *self.family_id.write() = None;
        *self.view.write() = View::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_fallbacks() {
        let mut session = Session::new("u1");
        assert_eq!(session.profile_name(), None);
        session.email = Some("ann@example.com".into());
        assert_eq!(session.profile_name().as_deref(), Some("ann"));
        session.display_name = Some(" Ann Carter ".into());
        assert_eq!(session.profile_name().as_deref(), Some("Ann Carter"));
    }

    #[test]
    fn test_scope_requires_session_and_family() {
        let state = AppState::new(&SyncConfig::default());
        assert!(matches!(state.scope(), Err(Error::NotSignedIn)));

        *state.session.write() = Some(Session::new("u1"));
        assert!(matches!(state.scope(), Err(Error::NoFamilySelected)));

        *state.family_id.write() = Some("f1".into());
        assert_eq!(
            state.scope().unwrap(),
            Scope { user_id: "u1".into(), family_id: "f1".into() }
        );
    }

    #[test]
    fn test_clear_family_data_keeps_session() {
        let state = AppState::new(&SyncConfig::default());
        *state.session.write() = Some(Session::new("u1"));
        *state.role.write() = Some(Role::Owner);
        *state.open_peer.write() = Some("u2".into());
        assert!(state.is_owner());

        state.clear_family_data();
        assert!(!state.is_owner());
        assert!(state.open_peer.read().is_none());
        assert_eq!(state.user_id().unwrap(), "u1");
    }

    #[test]
    fn test_cursor_sizes_follow_config() {
        let cursors = Cursors::new(&SyncConfig::default());
        assert_eq!(cursors.get(ListKind::Conversation).page_size(), 30);
        assert_eq!(cursors.get(ListKind::Books).page_size(), 20);
    }
}
