//! Pull pages, push batches, and push receipts.

use crate::{SyncCursor, SyncEnvelope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a per-kind pull response, as it appears on the wire.
///
/// `next` is the cursor to request the following page with; `None` marks
/// the final page of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPage<T> {
    /// Server clock at response time.
    pub server_time: DateTime<Utc>,
    /// Cursor for the next page, absent on the last page.
    #[serde(default = "none_cursor")]
    pub next: Option<SyncCursor>,
    /// Records strictly after the requested cursor, ascending.
    pub items: Vec<T>,
}

fn none_cursor() -> Option<SyncCursor> {
    None
}

impl<T> RawPage<T> {
    /// Maps the items of this page, keeping server time and next cursor.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> RawPage<U> {
        RawPage {
            server_time: self.server_time,
            next: self.next,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// A pull page widened to the tagged envelope union.
///
/// Transports parse the per-kind wire payloads and widen them so the rest
/// of the engine is kind-agnostic.
pub type PullPage = RawPage<SyncEnvelope>;

/// A batch of outbox payloads pushed to the server.
///
/// Items are the raw JSON snapshots captured at commit time; the server
/// dispatches on their embedded `"Type"` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushBatch {
    /// Client clock at send time.
    pub client_time: DateTime<Utc>,
    /// Outbox payload snapshots, oldest first.
    pub items: Vec<serde_json::Value>,
}

/// Per-item outcome of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushVerdict {
    /// Applied as an insert or update.
    Upserted,
    /// Applied as a delete.
    Deleted,
    /// Already applied by an earlier push; safe to discard.
    SkippedDuplicate,
    /// Target no longer exists server-side; nothing left to do.
    NotFound,
    /// Lost a concurrent write race; retry later.
    Conflict,
    /// Server could not process the item; retry later.
    Failed,
}

impl PushVerdict {
    /// True when the item is settled and its outbox row may be marked sent.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PushVerdict::Conflict | PushVerdict::Failed)
    }
}

/// Receipt for a single pushed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushItemReceipt {
    /// Stable id of the pushed entity.
    pub id: liftlog_domain::StableId,
    /// Outcome for this item.
    pub status: PushVerdict,
    /// Optional server-side detail, present on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Receipt for a whole push batch, one entry per item in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushReceipt {
    /// Server clock at response time.
    pub server_time: DateTime<Utc>,
    /// Number of settled items.
    pub accepted: usize,
    /// Number of items left for retry.
    pub failed: usize,
    /// Per-item verdicts, in batch order.
    pub items: Vec<PushItemReceipt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use liftlog_domain::StableId;

    #[test]
    fn last_page_omits_next() {
        let json = r#"{
            "ServerTime": "2024-01-01T00:00:00Z",
            "Items": []
        }"#;
        let page: RawPage<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(page.next.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn verdicts_partition_into_settled_and_retry() {
        assert!(PushVerdict::Upserted.is_settled());
        assert!(PushVerdict::Deleted.is_settled());
        assert!(PushVerdict::SkippedDuplicate.is_settled());
        assert!(PushVerdict::NotFound.is_settled());
        assert!(!PushVerdict::Conflict.is_settled());
        assert!(!PushVerdict::Failed.is_settled());
    }

    #[test]
    fn receipt_roundtrip_preserves_order() {
        let receipt = PushReceipt {
            server_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            accepted: 1,
            failed: 1,
            items: vec![
                PushItemReceipt {
                    id: StableId::from_bytes([1; 16]),
                    status: PushVerdict::Upserted,
                    message: None,
                },
                PushItemReceipt {
                    id: StableId::from_bytes([2; 16]),
                    status: PushVerdict::Failed,
                    message: Some("schema mismatch".into()),
                },
            ],
        };

        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains("\"Status\":\"Upserted\""));
        let back: PushReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, receipt);
    }
}
