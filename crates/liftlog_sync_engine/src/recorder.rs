//! Commit-time outbox recorder.

use crate::snapshot::snapshot_envelope;
use liftlog_domain::{EntityKind, StableId};
use liftlog_store::{ChangeKind, ChangeState, CommitObserver, StoreError, Transaction};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Records every local entity mutation into the outbox before its
/// transaction commits.
///
/// Registered on the store as a [`CommitObserver`]; sync-actor
/// transactions never reach it, so remotely applied changes do not echo
/// back to the server. One commit yields at most one outbox row per
/// `(kind, id, change)` triple, however many times the closure touched
/// the row.
#[derive(Default)]
pub struct OutboxRecorder {
    active: Mutex<HashSet<u64>>,
}

impl OutboxRecorder {
    /// Creates a recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, txn: &mut Transaction<'_>) -> Result<(), StoreError> {
        let changes: Vec<_> = txn.tracked_changes().to_vec();
        let mut emitted: HashSet<(EntityKind, StableId, ChangeKind)> = HashSet::new();

        for change in changes {
            if change.kind == EntityKind::Unidentified {
                tracing::warn!(id = %change.stable_id, "skipping change of unidentified kind");
                continue;
            }
            let change_kind = match change.state {
                ChangeState::Added => ChangeKind::Insert,
                ChangeState::Modified => ChangeKind::Update,
                ChangeState::Deleted => ChangeKind::Delete,
            };
            if !emitted.insert((change.kind, change.stable_id, change_kind)) {
                continue;
            }

            let Some(envelope) = snapshot_envelope(txn, change.kind, change.stable_id) else {
                tracing::warn!(kind = %change.kind, id = %change.stable_id,
                    "changed row vanished before snapshot, nothing recorded");
                continue;
            };
            let payload = serde_json::to_value(&envelope)?;
            txn.append_outbox(change.kind, change.stable_id, change_kind, payload);
            tracing::debug!(kind = %change.kind, id = %change.stable_id,
                change = %change_kind, "outbox row recorded");
        }
        Ok(())
    }
}

impl CommitObserver for OutboxRecorder {
    fn before_commit(&self, txn: &mut Transaction<'_>) -> Result<(), StoreError> {
        let commit = txn.commit_id();
        // Re-entrancy guard: a commit already being recorded is left alone.
        if !self.active.lock().insert(commit) {
            return Ok(());
        }
        let result = self.record(txn);
        self.active.lock().remove(&commit);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftlog_domain::{Authority, BodySection, FixedClock};
    use liftlog_store::{Audit, MuscleRow, Store, SYNC_ACTOR};
    use std::sync::Arc;

    fn store_with_recorder() -> Arc<Store> {
        let store = Arc::new(Store::with_clock(Arc::new(FixedClock::at_unix(
            1_700_000_000,
        ))));
        store.register_observer(Arc::new(OutboxRecorder::new()));
        store
    }

    fn insert_muscle(txn: &mut Transaction<'_>, name: &str) -> StableId {
        let guid = StableId::new();
        let id = txn.next_row_id();
        let audit = txn.stamp();
        txn.put_muscle(MuscleRow {
            id,
            guid,
            name: name.into(),
            descriptor_id: None,
            body_section: BodySection::UpperBody,
            audit,
        });
        guid
    }

    #[test]
    fn local_insert_lands_in_outbox_with_snapshot() {
        let store = store_with_recorder();
        let guid = store
            .transaction("app", |txn| Ok(insert_muscle(txn, "Biceps")))
            .unwrap();

        let rows = store.unsent_outbox(10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, guid);
        assert_eq!(rows[0].change, ChangeKind::Insert);
        assert_eq!(rows[0].payload["Type"], "Muscle");
        assert_eq!(rows[0].payload["Name"], "Biceps");
    }

    #[test]
    fn repeated_writes_in_one_commit_dedup() {
        let store = store_with_recorder();
        store
            .transaction("app", |txn| {
                let guid = insert_muscle(txn, "Biceps");
                // Touch the same row again within the commit.
                let mut row = txn.muscle_by_guid(guid).unwrap().clone();
                row.name = "Biceps Brachii".into();
                row.audit = Audit {
                    authority: Authority::Bidirectional,
                    ..txn.stamp()
                };
                txn.put_muscle(row);
                Ok(())
            })
            .unwrap();

        // One Insert and one Update row; the second Modified write of the
        // same entity would collapse, but Insert and Update are distinct
        // triples.
        let rows = store.unsent_outbox(10);
        assert_eq!(rows.len(), 2);
        // Both snapshots reflect the final state of the commit.
        assert!(rows.iter().all(|r| r.payload["Name"] == "Biceps Brachii"));
    }

    #[test]
    fn delete_records_tombstone_snapshot() {
        let store = store_with_recorder();
        let guid = store
            .transaction("app", |txn| Ok(insert_muscle(txn, "Biceps")))
            .unwrap();
        store.mark_outbox_sent(&[store.unsent_outbox(10)[0].id]);

        store
            .transaction("app", |txn| txn.soft_delete_muscle(guid))
            .unwrap();

        let rows = store.unsent_outbox(10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].change, ChangeKind::Delete);
        assert_eq!(rows[0].payload["IsDeleted"], true);
    }

    #[test]
    fn sync_actor_writes_are_not_recorded() {
        let store = store_with_recorder();
        store
            .transaction(SYNC_ACTOR, |txn| {
                insert_muscle(txn, "Biceps");
                Ok(())
            })
            .unwrap();
        assert_eq!(store.pending_outbox(), 0);
    }
}
