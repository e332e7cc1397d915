//! # Activities Module
//!
//! Scheduled family activities: creation with links to notes and books,
//! RSVPs, and device-local reminders.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ACTIVITY DATA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Remote                                 Local (this device)            │
//! │  ──────                                 ───────────────────            │
//! │  activities                             hearth.rsvp.<fam>.<activity>   │
//! │  activity_notes  (activity, note)         last RSVP that failed to     │
//! │  activity_books  (activity, book)         reach the backend            │
//! │  activity_rsvps  (activity, user)                                      │
//! │                                         hearth.reminders.activities.   │
//! │                                           <fam> → { id: due time }     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::{tables, Activity, ActivityLinks, Book, Note, Rsvp, RsvpCounts, RsvpStatus};
use crate::remote::{parse_row, select_as, Query, RemoteStore};
use crate::state::AppState;
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageKey};
use crate::time::{parse_rfc3339, to_rfc3339};

/// Input for a new activity
#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    /// Title (required)
    pub title: String,
    /// When it happens, RFC 3339 (required)
    pub datetime: String,
    /// Optional description
    pub description: Option<String>,
    /// Optional location
    pub location: Option<String>,
    /// Notes to link
    pub note_ids: Vec<String>,
    /// Books to link
    pub book_ids: Vec<String>,
}

/// Where an RSVP ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsvpOutcome {
    /// Stored remotely
    Synced,
    /// Remote write failed; kept on this device
    SavedLocally,
}

/// A device-local reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Due time (RFC 3339)
    pub at: String,
    /// Already reported as due
    #[serde(default)]
    pub fired: bool,
}

#[derive(Deserialize)]
struct NoteLink {
    note_id: String,
}

#[derive(Deserialize)]
struct BookLink {
    book_id: String,
}

#[derive(Deserialize)]
struct StatusRow {
    status: RsvpStatus,
}

/// Activity operations
pub struct ActivityService {
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    state: Arc<AppState>,
}

impl ActivityService {
    /// Create a new activity service
    pub fn new(remote: Arc<dyn RemoteStore>, store: Arc<dyn KeyValueStore>, state: Arc<AppState>) -> Self {
        Self { remote, store, state }
    }

    // ========================================================================
    // ACTIVITIES
    // ========================================================================

    /// Create an activity and its links
    pub async fn create_activity(&self, new: NewActivity) -> Result<Activity> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("title is required".into()));
        }
        if parse_rfc3339(&new.datetime).is_none() {
            return Err(Error::InvalidInput("datetime must be RFC 3339".into()));
        }
        let scope = self.state.scope()?;

        let row = self
            .remote
            .insert(
                tables::ACTIVITIES,
                json!({
                    "family_id": scope.family_id,
                    "title": title,
                    "description": new.description,
                    "datetime": new.datetime,
                    "location": new.location,
                }),
            )
            .await?;
        let activity: Activity = parse_row(row)?;

        for note_id in &new.note_ids {
            self.remote
                .insert(
                    tables::ACTIVITY_NOTES,
                    json!({ "activity_id": activity.id, "note_id": note_id }),
                )
                .await?;
        }
        for book_id in &new.book_ids {
            self.remote
                .insert(
                    tables::ACTIVITY_BOOKS,
                    json!({ "activity_id": activity.id, "book_id": book_id }),
                )
                .await?;
        }

        tracing::info!(
            activity_id = %activity.id,
            notes = new.note_ids.len(),
            books = new.book_ids.len(),
            "Activity created"
        );
        Ok(activity)
    }

    /// Notes and books linked to `activity_id`.
    ///
    /// Loaded lists are used first; anything not loaded is read remotely,
    /// limited to the active family.
    pub async fn links(&self, activity_id: &str) -> Result<ActivityLinks> {
        let family_id = self.state.family_id()?;
        let note_ids: Vec<String> = select_as::<NoteLink>(
            self.remote.as_ref(),
            &Query::table(tables::ACTIVITY_NOTES).eq("activity_id", activity_id),
        )
        .await?
        .into_iter()
        .map(|l| l.note_id)
        .collect();
        let book_ids: Vec<String> = select_as::<BookLink>(
            self.remote.as_ref(),
            &Query::table(tables::ACTIVITY_BOOKS).eq("activity_id", activity_id),
        )
        .await?
        .into_iter()
        .map(|l| l.book_id)
        .collect();

        let (mut notes, mut books) = {
            let lists = self.state.lists.read();
            let notes: Vec<Note> = lists
                .notes
                .iter()
                .filter(|n| note_ids.contains(&n.id))
                .cloned()
                .collect();
            let books: Vec<Book> = lists
                .books
                .iter()
                .filter(|b| book_ids.contains(&b.id))
                .cloned()
                .collect();
            (notes, books)
        };

        let missing = missing_ids(&note_ids, notes.iter().map(|n| n.id.as_str()));
        if !missing.is_empty() {
            let fetched: Vec<Note> = select_as(
                self.remote.as_ref(),
                &Query::table(tables::NOTES)
                    .in_list("id", missing)
                    .eq("family_id", family_id.as_str()),
            )
            .await?;
            notes.extend(fetched);
        }
        let missing = missing_ids(&book_ids, books.iter().map(|b| b.id.as_str()));
        if !missing.is_empty() {
            let fetched: Vec<Book> = select_as(
                self.remote.as_ref(),
                &Query::table(tables::BOOKS)
                    .in_list("id", missing)
                    .eq("family_id", family_id.as_str()),
            )
            .await?;
            books.extend(fetched);
        }

        Ok(ActivityLinks { notes, books })
    }

    // ========================================================================
    // RSVP
    // ========================================================================

    /// Answer for `activity_id`. A failed remote write keeps the answer on
    /// this device instead.
    pub async fn rsvp(&self, activity_id: &str, status: RsvpStatus) -> Result<RsvpOutcome> {
        let scope = self.state.scope()?;
        let rsvp = Rsvp {
            activity_id: activity_id.to_string(),
            user_id: scope.user_id.clone(),
            family_id: scope.family_id.clone(),
            status,
        };
        let key = StorageKey::rsvp(&scope.family_id, activity_id);

        let row = serde_json::to_value(&rsvp)?;
        match self
            .remote
            .upsert(tables::ACTIVITY_RSVPS, row, &["activity_id", "user_id"])
            .await
        {
            Ok(_) => {
                if let Err(e) = self.store.remove(key.as_str()) {
                    tracing::warn!(key = %key, error = %e, "Failed to drop local RSVP");
                }
                Ok(RsvpOutcome::Synced)
            }
            Err(e) => {
                tracing::warn!(activity_id, error = %e, "RSVP not synced, keeping it locally");
                self.store.set_json(&key, &rsvp)?;
                Ok(RsvpOutcome::SavedLocally)
            }
        }
    }

    /// RSVP kept on this device for `activity_id`
    pub fn local_rsvp(&self, activity_id: &str) -> Option<Rsvp> {
        let family_id = self.state.family_id().ok()?;
        self.store
            .get_json_or_default::<Option<Rsvp>>(&StorageKey::rsvp(&family_id, activity_id))
    }

    /// Tally of answers. When the backend can't be read, the tally is
    /// whatever this device knows: its own local answer.
    pub async fn rsvp_counts(&self, activity_id: &str) -> RsvpCounts {
        let result: Result<Vec<StatusRow>> = match self.state.family_id() {
            Ok(family_id) => {
                select_as(
                    self.remote.as_ref(),
                    &Query::table(tables::ACTIVITY_RSVPS)
                        .eq("activity_id", activity_id)
                        .eq("family_id", family_id.as_str()),
                )
                .await
            }
            Err(e) => Err(e),
        };

        let mut counts = RsvpCounts::default();
        match result {
            Ok(rows) => {
                for row in rows {
                    counts.add(row.status);
                }
            }
            Err(e) => {
                tracing::debug!(activity_id, error = %e, "RSVP counts from local answer");
                if let Some(local) = self.local_rsvp(activity_id) {
                    counts.add(local.status);
                }
            }
        }
        counts
    }

    // ========================================================================
    // REMINDERS
    // ========================================================================

    fn reminders_key(&self) -> Result<StorageKey> {
        Ok(StorageKey::reminders(&self.state.family_id()?))
    }

    /// Reminders of the active family
    pub fn reminders(&self) -> BTreeMap<String, Reminder> {
        match self.reminders_key() {
            Ok(key) => self.store.get_json_or_default(&key),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Remind about `activity_id` at `at`, replacing any earlier reminder
    pub fn set_reminder(&self, activity_id: &str, at: DateTime<Utc>) -> Result<()> {
        let key = self.reminders_key()?;
        let mut reminders: BTreeMap<String, Reminder> = self.store.get_json_or_default(&key);
        reminders.insert(
            activity_id.to_string(),
            Reminder {
                at: to_rfc3339(at),
                fired: false,
            },
        );
        self.store.set_json(&key, &reminders)
    }

    /// Drop the reminder for `activity_id`. Returns whether there was one.
    pub fn clear_reminder(&self, activity_id: &str) -> Result<bool> {
        let key = self.reminders_key()?;
        let mut reminders: BTreeMap<String, Reminder> = self.store.get_json_or_default(&key);
        let existed = reminders.remove(activity_id).is_some();
        if existed {
            self.store.set_json(&key, &reminders)?;
        }
        Ok(existed)
    }

    /// Activities whose reminder is due at `now` and not yet reported.
    /// Each reminder is reported once.
    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let key = self.reminders_key()?;
        let mut reminders: BTreeMap<String, Reminder> = self.store.get_json_or_default(&key);

        let mut due = Vec::new();
        for (activity_id, reminder) in reminders.iter_mut() {
            if reminder.fired {
                continue;
            }
            match parse_rfc3339(&reminder.at) {
                Some(at) if at <= now => {
                    reminder.fired = true;
                    due.push(activity_id.clone());
                }
                Some(_) => {}
                None => tracing::warn!(activity_id = %activity_id, "Unreadable reminder time"),
            }
        }

        if !due.is_empty() {
            self.store.set_json(&key, &reminders)?;
        }
        Ok(due)
    }
}

fn missing_ids<'a>(wanted: &[String], found: impl Iterator<Item = &'a str>) -> Vec<String> {
    let found: HashSet<&str> = found.collect();
    wanted
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect()
}
