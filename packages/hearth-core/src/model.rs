//! # Data Model
//!
//! Rows mirrored between the remote store and the local cache. Field names
//! match the remote column names so a cached response can be stored verbatim
//! and parsed back into the same types.
//!
//! ```text
//! ┌──────────┐ 1   * ┌────────────┐
//! │  Family  │──────►│ Membership │ (family_id, user_id, role)
//! └────┬─────┘       └────────────┘
//!      │ 1
//!      │ *
//!      ├──────► Book ──1:*──► Note ──1:*──► Paragraph
//!      ├──────► Activity ──*:*──► Note / Book (activity_notes, activity_books)
//!      ├──────► Message (sender_id ──► receiver_id)
//!      └──────► AccessRequest
//! ```
//!
//! Every row except `Family` carries exactly one `family_id`.

use serde::{Deserialize, Serialize};

/// Remote table names
pub mod tables {
    /// Families
    pub const FAMILIES: &str = "families";
    /// Family memberships
    pub const FAMILY_MEMBERS: &str = "family_members";
    /// User profiles
    pub const PROFILES: &str = "profiles";
    /// Books
    pub const BOOKS: &str = "books";
    /// Notes
    pub const NOTES: &str = "notes";
    /// Note paragraphs
    pub const PARAGRAPHS: &str = "paragraphs";
    /// Activities
    pub const ACTIVITIES: &str = "activities";
    /// Activity to note links
    pub const ACTIVITY_NOTES: &str = "activity_notes";
    /// Activity to book links
    pub const ACTIVITY_BOOKS: &str = "activity_books";
    /// RSVPs
    pub const ACTIVITY_RSVPS: &str = "activity_rsvps";
    /// Direct messages
    pub const MESSAGES: &str = "messages";
    /// Join requests
    pub const ACCESS_REQUESTS: &str = "family_access_requests";
}

/// A family: the root scoping unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    /// Family id
    pub id: String,
    /// Display name
    pub name: String,
    /// Code others can use to request access
    #[serde(default)]
    pub join_code: Option<String>,
    /// Creator
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Role of a user inside a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Created the family, manages join codes and requests
    Owner,
    /// Regular member
    Member,
}

/// A user's membership in a family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Family
    pub family_id: String,
    /// User
    pub user_id: String,
    /// Role within the family
    pub role: Role,
}

/// A book groups notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book id
    pub id: String,
    /// Title
    pub title: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Owning family
    pub family_id: String,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A note inside a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note id
    pub id: String,
    /// Title
    pub title: String,
    /// Owning book
    #[serde(default)]
    pub book_id: Option<String>,
    /// Owning family
    pub family_id: String,
    /// Creator
    #[serde(default)]
    pub created_by: Option<String>,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One paragraph of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Paragraph id
    pub id: String,
    /// Owning note
    pub note_id: String,
    /// Owning family
    pub family_id: String,
    /// Author; the only user allowed to change the paragraph
    pub author_id: String,
    /// Author display name at time of writing
    #[serde(default)]
    pub author_name: Option<String>,
    /// Rich text body
    #[serde(rename = "content_html")]
    pub content: String,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A scheduled family activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity id
    pub id: String,
    /// Title
    pub title: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// When it happens (RFC 3339)
    #[serde(default)]
    pub datetime: Option<String>,
    /// Where it happens
    #[serde(default)]
    pub location: Option<String>,
    /// Owning family
    pub family_id: String,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Notes and books linked to an activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityLinks {
    /// Linked notes
    pub notes: Vec<Note>,
    /// Linked books
    pub books: Vec<Book>,
}

/// A direct message between two family members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id
    pub id: String,
    /// Family scope
    pub family_id: String,
    /// Author
    pub sender_id: String,
    /// Recipient
    pub receiver_id: String,
    /// Plain text body
    pub content: String,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Whether the user has the manager flag
    #[serde(default, rename = "is_manager")]
    pub manager: bool,
}

impl Profile {
    /// Name to show, falling back to the id
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Status of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    /// Waiting for the owner
    Pending,
    /// Owner let the user in
    Approved,
    /// Owner declined
    Rejected,
}

impl AccessStatus {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Pending => "pending",
            AccessStatus::Approved => "approved",
            AccessStatus::Rejected => "rejected",
        }
    }
}

/// A request to join a family by code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Request id
    pub id: String,
    /// Family being joined
    pub family_id: String,
    /// User asking to join
    pub requester_id: String,
    /// Requester email, if known
    #[serde(default)]
    pub requester_email: Option<String>,
    /// Requester display name, if known
    #[serde(default)]
    pub requester_name: Option<String>,
    /// Code that was used
    #[serde(default)]
    pub code: Option<String>,
    /// Current status
    pub status: AccessStatus,
    /// Creation time (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Attendance answer for an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    /// Attending
    Going,
    /// Undecided
    Maybe,
    /// Not attending
    Not,
}

/// A user's RSVP for an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rsvp {
    /// Activity
    pub activity_id: String,
    /// User
    pub user_id: String,
    /// Family scope
    pub family_id: String,
    /// Answer
    pub status: RsvpStatus,
}

/// Tally of RSVPs for one activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvpCounts {
    /// Going
    pub going: usize,
    /// Maybe
    pub maybe: usize,
    /// Not going
    pub not: usize,
}

impl RsvpCounts {
    /// Count one answer
    pub fn add(&mut self, status: RsvpStatus) {
        match status {
            RsvpStatus::Going => self.going += 1,
            RsvpStatus::Maybe => self.maybe += 1,
            RsvpStatus::Not => self.not += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paragraph_uses_content_html_column() {
        let p: Paragraph = serde_json::from_value(json!({
            "id": "p1",
            "note_id": "n1",
            "family_id": "f1",
            "author_id": "u1",
            "content_html": "<p>hi</p>"
        }))
        .unwrap();
        assert_eq!(p.content, "<p>hi</p>");
        assert!(p.author_name.is_none());

        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["content_html"], "<p>hi</p>");
    }

    #[test]
    fn test_profile_defaults() {
        let p: Profile = serde_json::from_value(json!({ "id": "u1" })).unwrap();
        assert!(!p.manager);
        assert_eq!(p.label(), "u1");

        let p: Profile = serde_json::from_value(json!({ "id": "u2", "is_manager": true })).unwrap();
        assert!(p.manager);
        assert_eq!(serde_json::to_value(&p).unwrap()["is_manager"], true);
    }

    #[test]
    fn test_rsvp_counts() {
        let mut counts = RsvpCounts::default();
        for status in [RsvpStatus::Going, RsvpStatus::Going, RsvpStatus::Not] {
            counts.add(status);
        }
        assert_eq!(counts, RsvpCounts { going: 2, maybe: 0, not: 1 });
        assert_eq!(serde_json::to_value(RsvpStatus::Not).unwrap(), "not");
    }
}
