//! Repository layer — entity-scoped database operations.
//!
//! Each sub-module owns one table. Timestamps are stored as RFC 3339 text
//! and ids as hyphenated UUID strings.

mod assessment;
mod audit;
mod chat_turn;
mod knowledge;
mod report;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::DatabaseError;

// Re-export all public items from sub-modules
pub use assessment::*;
pub use audit::*;
pub use chat_turn::*;
pub use knowledge::*;
pub use report::*;

/// Fixed-width UTC form so lexical order matches chronological order.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidValue {
            field: field.into(),
            reason: format!("{value:?}: {e}"),
        })
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::InvalidValue {
        field: field.into(),
        reason: format!("{value:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trips_through_rfc3339() {
        let now = Utc::now();
        let parsed = parse_timestamp("created_at", &format_timestamp(&now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn malformed_uuid_is_reported_with_field() {
        match parse_uuid("id", "not-a-uuid") {
            Err(DatabaseError::InvalidValue { field, .. }) => assert_eq!(field, "id"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }
}
