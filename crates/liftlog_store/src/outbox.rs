//! Outbox table rows.

use chrono::{DateTime, Utc};
use liftlog_domain::{EntityKind, StableId};

/// The kind of local mutation an outbox row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A new entity was created.
    Insert,
    /// An existing entity was modified.
    Update,
    /// An entity was tombstoned.
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        })
    }
}

/// One pending (or sent) local mutation awaiting delivery to the server.
///
/// The payload is a full JSON snapshot of the entity taken at commit
/// time, self-describing via its `"Type"` discriminator, so the row stays
/// shippable even if the entity changes again afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRow {
    /// Local row id.
    pub id: u64,
    /// Kind of the changed entity.
    pub entity_kind: EntityKind,
    /// Stable id of the changed entity.
    pub entity_id: StableId,
    /// Kind of mutation.
    pub change: ChangeKind,
    /// Entity snapshot at commit time.
    pub payload: serde_json::Value,
    /// Commit timestamp; delivery order follows this.
    pub occurred_at: DateTime<Utc>,
    /// Set once the server settled the item.
    pub sent: bool,
}
