//! # Error Handling
//!
//! Error types for Hearth Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Session Errors                                                    │
//! │  │   ├── NotSignedIn           - No user session                       │
//! │  │   └── NoFamilySelected      - No active family scope                │
//! │  │                                                                      │
//! │  ├── Family Errors                                                     │
//! │  │   ├── OwnerOnly             - Operation requires owner role         │
//! │  │   ├── InvalidJoinCode       - Join code matched no family           │
//! │  │   └── FamilyNotFound        - Family id unknown                     │
//! │  │                                                                      │
//! │  ├── Content Errors                                                    │
//! │  │   ├── NotAuthor             - Only the author may change this       │
//! │  │   ├── InvalidInput          - Missing title, empty content, ...     │
//! │  │   └── NotFound              - Row does not exist                    │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── ReadError / WriteError                                        │
//! │  │   ├── Corrupted             - Cache entry failed to parse           │
//! │  │   └── DatabaseError         - SQLite failure                        │
//! │  │                                                                      │
//! │  ├── Remote Errors                                                     │
//! │  │   ├── NotConnected          - Network unavailable                   │
//! │  │   ├── Timeout               - Transport timed out                   │
//! │  │   ├── PermissionDenied      - Remote refused the operation          │
//! │  │   ├── Conflict              - Row already exists                    │
//! │  │   ├── RemoteError           - Any other remote failure              │
//! │  │   └── SubscriptionFailed    - Realtime channel could not bind       │
//! │  │                                                                      │
//! │  └── Queue Errors                                                      │
//! │      └── OutboxUnavailable     - No outbox for the current scope       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recovery Policy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       WHO RECOVERS WHAT                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  is_network()      ──► read path falls back to cache,                  │
//! │                        write path queues in the outbox                 │
//! │                                                                         │
//! │  PermissionDenied  ──► surfaced as a SyncEvent::Notice                 │
//! │  NotAuthor                                                              │
//! │                                                                         │
//! │  Corrupted         ──► treated as an empty cache entry                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for Hearth Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Hearth Core
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Session Errors (100-199)
    // ========================================================================

    /// No user is signed in
    #[error("No user session. Sign in first.")]
    NotSignedIn,

    /// No family has been selected
    #[error("No family selected.")]
    NoFamilySelected,

    // ========================================================================
    // Family Errors (200-299)
    // ========================================================================

    /// Operation requires the owner role
    #[error("Only the family owner can do this.")]
    OwnerOnly,

    /// Join code did not match any family
    #[error("Invalid join code.")]
    InvalidJoinCode,

    /// Family not found
    #[error("Family not found: {0}")]
    FamilyNotFound(String),

    // ========================================================================
    // Content Errors (300-399)
    // ========================================================================

    /// Only the author of a row may change it
    #[error("Only the author can change this {0}.")]
    NotAuthor(String),

    /// Invalid user input (empty content, missing title, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A row that was expected to exist does not
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from local storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to local storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Stored value could not be parsed
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Remote Errors (500-599)
    // ========================================================================

    /// Not connected to the network
    #[error("Not connected to the network.")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Remote store refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Row already exists on the remote
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other remote failure
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// Realtime channel could not be established
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    // ========================================================================
    // Queue Errors (600-699)
    // ========================================================================

    /// No outbox is open for the current user/family
    #[error("Outbox is not available. Sign in and select a family first.")]
    OutboxUnavailable,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Session
    /// - 200-299: Family
    /// - 300-399: Content
    /// - 400-499: Storage
    /// - 500-599: Remote
    /// - 600-699: Queue
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Session (100-199)
            Error::NotSignedIn => 100,
            Error::NoFamilySelected => 101,

            // Family (200-299)
            Error::OwnerOnly => 200,
            Error::InvalidJoinCode => 201,
            Error::FamilyNotFound(_) => 202,

            // Content (300-399)
            Error::NotAuthor(_) => 300,
            Error::InvalidInput(_) => 301,
            Error::NotFound(_) => 302,

            // Storage (400-499)
            Error::StorageReadError(_) => 400,
            Error::StorageWriteError(_) => 401,
            Error::StorageCorrupted(_) => 402,
            Error::DatabaseError(_) => 403,

            // Remote (500-599)
            Error::NotConnected => 500,
            Error::Timeout(_) => 501,
            Error::PermissionDenied(_) => 502,
            Error::Conflict(_) => 503,
            Error::RemoteError(_) => 504,
            Error::SubscriptionFailed(_) => 505,

            // Queue (600-699)
            Error::OutboxUnavailable => 600,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
            Error::InvalidConfig(_) => 903,
        }
    }

    /// Check if this is a network/availability failure
    ///
    /// These are the failures the sync layer recovers from locally:
    /// reads fall back to the cache, message sends go to the outbox.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::Timeout(_) | Error::RemoteError(_)
        )
    }

    /// Check if this error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        self.is_network() || matches!(self, Error::SubscriptionFailed(_))
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::NotSignedIn
                | Error::NoFamilySelected
                | Error::InvalidJoinCode
                | Error::InvalidInput(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotSignedIn.code(), 100);
        assert_eq!(Error::OwnerOnly.code(), 200);
        assert_eq!(Error::NotAuthor("paragraph".into()).code(), 300);
        assert_eq!(Error::StorageReadError("x".into()).code(), 400);
        assert_eq!(Error::NotConnected.code(), 500);
        assert_eq!(Error::OutboxUnavailable.code(), 600);
        assert_eq!(Error::Internal("x".into()).code(), 900);
    }

    #[test]
    fn test_network_errors() {
        assert!(Error::NotConnected.is_network());
        assert!(Error::Timeout("fetch".into()).is_network());
        assert!(!Error::PermissionDenied("rls".into()).is_network());
        assert!(!Error::StorageCorrupted("bad json".into()).is_network());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::NotConnected.is_recoverable());
        assert!(Error::SubscriptionFailed("rt".into()).is_recoverable());
        assert!(!Error::NotAuthor("note".into()).is_recoverable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<Vec<u8>>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), 901);
    }
}
