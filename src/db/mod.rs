//! Database module: row models and SQL repositories.
//!
//! - `model`: rows as read from SQLite, converted into domain types.
//! - `repo`: pool setup, watchlist members and scope settings.
//! - `posts`: the post store (set-union insert, purges, translation queue).
//! - `oplog`: the append-only operation log.
//!
//! Callers import from `x_watchbot::db`; the repository API is re-exported
//! here.

use chrono::{DateTime, Utc};

pub mod model;
pub mod oplog;
pub mod posts;
pub mod repo;

pub use model::QueueItem;
pub use oplog::*;
pub use posts::*;
pub use repo::*;

/// Timestamps are stored as Unix milliseconds so SQL comparisons are exact.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp {ms} ms is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_and_reject_out_of_range() {
        let now = Utc::now();
        let ms = to_millis(now);
        assert_eq!(to_millis(from_millis(ms).unwrap()), ms);
        assert!(from_millis(i64::MAX).is_err());
    }

    #[test]
    fn corrupt_member_timestamp_is_an_error() {
        let row = model::MemberRow {
            id: 4,
            scope_id: 1,
            handle: "alice".into(),
            note: None,
            created_at: i64::MAX,
        };
        let err = crate::model::WatchlistMember::try_from(row).unwrap_err();
        assert!(format!("{err:#}").contains("member 4"), "{err:#}");
    }
}
