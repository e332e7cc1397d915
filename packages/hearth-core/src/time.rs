//! Time helpers.
//!
//! Remote rows carry RFC 3339 timestamps; local bookkeeping (storage rows,
//! reminders) uses Unix timestamps.

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Returns the current time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Formats a timestamp the way remote rows are stamped.
pub fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 string, returning `None` when it is malformed.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "Timestamp {} is too old", ts);
        // Should be before 2100-01-01 (4102444800)
        assert!(ts < 4102444800, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_now_timestamp_millis_is_reasonable() {
        let ts = now_timestamp_millis();
        assert!(ts > 1704067200_000, "Timestamp {} is too old", ts);
    }

    #[test]
    fn test_rfc3339_roundtrip() {
        let now = now_rfc3339();
        let parsed = parse_rfc3339(&now).unwrap();
        assert_eq!(to_rfc3339(parsed), now);
        assert!(parse_rfc3339("yesterday").is_none());
    }
}
