//! Resumable sync cursor.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position in a per-entity-type change stream.
///
/// A page request returns every record with `(UpdatedAtUtc, UpdatedSeq)`
/// strictly greater than the cursor, ascending. Ordering is lexicographic
/// on the `(ts, seq)` pair; this is the sole total order guaranteeing that
/// no record is skipped or duplicated across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncCursor {
    /// Timestamp component.
    pub ts: DateTime<Utc>,
    /// Monotonic sequence component breaking timestamp ties.
    pub seq: i64,
}

impl SyncCursor {
    /// The full-history origin: pulls from here return everything.
    pub const MIN: SyncCursor = SyncCursor {
        ts: DateTime::<Utc>::MIN_UTC,
        seq: 0,
    };

    /// Creates a cursor from its components.
    pub fn new(ts: DateTime<Utc>, seq: i64) -> Self {
        Self { ts, seq }
    }

    /// Creates a cursor from a unix timestamp in seconds, for tests and
    /// fixtures.
    pub fn at_unix(secs: i64, seq: i64) -> Self {
        Self {
            ts: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
            seq,
        }
    }

    /// Returns true if a record stamped `(ts, seq)` lies strictly after
    /// this cursor.
    pub fn admits(&self, ts: DateTime<Utc>, seq: i64) -> bool {
        (ts, seq) > (self.ts, self.seq)
    }
}

impl PartialOrd for SyncCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SyncCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ts, self.seq).cmp(&(other.ts, other.seq))
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ts.to_rfc3339(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = SyncCursor::at_unix(100, 5);
        let b = SyncCursor::at_unix(100, 6);
        let c = SyncCursor::at_unix(101, 0);

        assert!(a < b);
        assert!(b < c);
        assert!(SyncCursor::MIN < a);
    }

    #[test]
    fn admits_strictly_after() {
        let cursor = SyncCursor::at_unix(100, 5);

        assert!(!cursor.admits(cursor.ts, 5));
        assert!(!cursor.admits(cursor.ts, 4));
        assert!(cursor.admits(cursor.ts, 6));
        assert!(cursor.admits(SyncCursor::at_unix(101, 0).ts, 0));
    }

    #[test]
    fn serde_roundtrip() {
        let cursor = SyncCursor::at_unix(1_700_000_000, 42);
        let json = serde_json::to_string(&cursor).unwrap();
        assert!(json.contains("\"Ts\""));
        assert!(json.contains("\"Seq\":42"));

        let back: SyncCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
