//! # Profile Module
//!
//! The signed-in user's public profile and the export of what they wrote.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           PROFILE EXPORT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  profile                 the session                                   │
//! │  notes_authored          notes      where created_by = user            │
//! │  paragraphs_authored     paragraphs where author_id  = user            │
//! │  messages_sent           messages   where sender_id  = user            │
//! │  activities_in_family    activities of the active family               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::{tables, Activity, Message, Note, Paragraph, Profile};
use crate::remote::{parse_row, select_as, Query, RemoteStore};
use crate::state::{AppState, Session};

/// Everything a user can take with them
#[derive(Debug, Clone, Serialize)]
pub struct ProfileExport {
    /// The signed-in user
    pub profile: Session,
    /// Notes the user created
    pub notes_authored: Vec<Note>,
    /// Paragraphs the user wrote
    pub paragraphs_authored: Vec<Paragraph>,
    /// Messages the user sent
    pub messages_sent: Vec<Message>,
    /// Activities of the active family
    pub activities_in_family: Vec<Activity>,
}

impl ProfileExport {
    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Profile operations for the signed-in user
pub struct ProfileService {
    remote: Arc<dyn RemoteStore>,
    state: Arc<AppState>,
}

impl ProfileService {
    /// Create a new profile service
    pub fn new(remote: Arc<dyn RemoteStore>, state: Arc<AppState>) -> Self {
        Self { remote, state }
    }

    fn session(&self) -> Result<Session> {
        self.state
            .session
            .read()
            .clone()
            .ok_or(Error::NotSignedIn)
    }

    /// Write the user's profile row so other members can see them.
    /// Without a name in the session the stored name is left alone.
    pub async fn publish(&self) -> Result<Profile> {
        let session = self.session()?;
        let mut row = json!({
            "id": session.user_id,
            "is_manager": session.manager,
        });
        if let Some(name) = session.profile_name() {
            row["display_name"] = json!(name);
        }
        let row = self.remote.upsert(tables::PROFILES, row, &["id"]).await?;
        let profile: Profile = parse_row(row)?;
        tracing::debug!(user_id = %profile.id, "Profile published");
        Ok(profile)
    }

    /// Collect the user's authored content and the family's activities
    pub async fn export(&self) -> Result<ProfileExport> {
        let scope = self.state.scope()?;
        let session = self.session()?;
        let remote = self.remote.as_ref();
        let user_id = scope.user_id.as_str();

        let notes_query = Query::table(tables::NOTES).eq("created_by", user_id);
        let paragraphs_query = Query::table(tables::PARAGRAPHS).eq("author_id", user_id);
        let messages_query = Query::table(tables::MESSAGES).eq("sender_id", user_id);
        let activities_query =
            Query::table(tables::ACTIVITIES).eq("family_id", scope.family_id.as_str());

        let (notes_authored, paragraphs_authored, messages_sent, activities_in_family) = futures::try_join!(
            select_as::<Note>(remote, &notes_query),
            select_as::<Paragraph>(remote, &paragraphs_query),
            select_as::<Message>(remote, &messages_query),
            select_as::<Activity>(remote, &activities_query),
        )?;

        tracing::info!(
            user_id,
            notes = notes_authored.len(),
            paragraphs = paragraphs_authored.len(),
            messages = messages_sent.len(),
            "Profile exported"
        );
        Ok(ProfileExport {
            profile: session,
            notes_authored,
            paragraphs_authored,
            messages_sent,
            activities_in_family,
        })
    }
}
