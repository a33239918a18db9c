//! Outbox dispatcher.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use chrono::{DateTime, Utc};
use liftlog_domain::{EntityKind, StableId};
use liftlog_store::{OutboxRow, Store};
use liftlog_sync_protocol::{PushBatch, PushItemReceipt};
use std::collections::{BTreeMap, HashMap};

/// Counters from one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Unsent rows taken from the outbox.
    pub taken: usize,
    /// Rows the server settled; marked sent.
    pub settled: usize,
    /// Rows the server asked to retry; left unsent.
    pub retried: usize,
    /// Rows whose payload kind could not be resolved; left unsent.
    pub unresolved: usize,
    /// Kinds whose push failed in transit; their rows stay unsent.
    pub failed_kinds: Vec<EntityKind>,
}

/// Delivers unsent outbox rows to the server, one push batch per entity
/// kind.
///
/// Rows are taken oldest first and grouped by the `"Type"` discriminator
/// of their payload snapshot; groups go out in dependency-rank order so a
/// referenced entity is never pushed after its referrer. Settled rows are
/// marked sent; the rest stay for the next run. A push failure for one
/// kind keeps that group unsent and moves on to the next kind.
pub struct OutboxDispatcher<'a, T: RemoteTransport> {
    store: &'a Store,
    transport: &'a T,
    batch_size: usize,
}

impl<'a, T: RemoteTransport> OutboxDispatcher<'a, T> {
    /// Creates a dispatcher over the given store and transport.
    pub fn new(store: &'a Store, transport: &'a T, batch_size: usize) -> Self {
        Self {
            store,
            transport,
            batch_size,
        }
    }

    /// Runs one dispatch pass. Errors with [`SyncError::Offline`] without
    /// touching the outbox when the remote is unreachable.
    pub fn dispatch(&self, client_time: DateTime<Utc>) -> SyncResult<DispatchOutcome> {
        if !self.transport.is_online() {
            return Err(SyncError::Offline);
        }

        let rows = self.store.unsent_outbox(self.batch_size);
        let mut outcome = DispatchOutcome {
            taken: rows.len(),
            ..DispatchOutcome::default()
        };
        if rows.is_empty() {
            return Ok(outcome);
        }

        // Group by the payload's own discriminator; the row column is a
        // fallback index, the snapshot is authoritative.
        let mut groups: BTreeMap<u32, (EntityKind, Vec<OutboxRow>)> = BTreeMap::new();
        for row in rows {
            let kind = row
                .payload
                .get("Type")
                .and_then(|v| v.as_str())
                .map(|s| s.parse().unwrap_or(EntityKind::Unidentified))
                .unwrap_or(EntityKind::Unidentified);
            if kind == EntityKind::Unidentified {
                tracing::warn!(outbox_id = row.id, entity = %row.entity_id,
                    "outbox payload has no resolvable kind, leaving unsent");
                outcome.unresolved += 1;
                continue;
            }
            groups.entry(kind.rank()).or_insert_with(|| (kind, Vec::new())).1.push(row);
        }

        for (kind, rows) in groups.into_values() {
            let batch = PushBatch {
                client_time,
                items: rows.iter().map(|r| r.payload.clone()).collect(),
            };
            let receipt = match self.transport.push(kind, &batch) {
                Ok(receipt) => receipt,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e,
                        "push failed, keeping rows for retry and continuing with next kind");
                    outcome.failed_kinds.push(kind);
                    continue;
                }
            };
            if receipt.items.len() != rows.len() {
                tracing::warn!(kind = %kind, sent = rows.len(), received = receipt.items.len(),
                    "push receipt length mismatch, settling only matched items");
            }

            // The receipt may come back in any order; verdicts are keyed
            // by stable id, never by position.
            let verdicts: HashMap<StableId, &PushItemReceipt> =
                receipt.items.iter().map(|i| (i.id, i)).collect();
            let mut settled_ids = Vec::new();
            for row in &rows {
                match verdicts.get(&row.entity_id) {
                    Some(item) if item.status.is_settled() => {
                        settled_ids.push(row.id);
                        outcome.settled += 1;
                    }
                    Some(item) => {
                        outcome.retried += 1;
                        tracing::warn!(kind = %kind, entity = %row.entity_id,
                            status = ?item.status,
                            message = item.message.as_deref().unwrap_or(""),
                            "push item not settled, will retry");
                    }
                    None => {
                        outcome.retried += 1;
                        tracing::warn!(kind = %kind, entity = %row.entity_id,
                            "push receipt carries no verdict for this row, will retry");
                    }
                }
            }
            self.store.mark_outbox_sent(&settled_ids);
        }

        tracing::info!(taken = outcome.taken, settled = outcome.settled,
            retried = outcome.retried, "outbox dispatch complete");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::OutboxRecorder;
    use crate::transport::MockTransport;
    use liftlog_domain::{BodySection, FixedClock, StableId};
    use liftlog_store::{EquipmentRow, MuscleRow};
    use liftlog_sync_protocol::{PushItemReceipt, PushReceipt, PushVerdict};
    use std::sync::Arc;

    fn store_with_recorder() -> Arc<Store> {
        let store = Arc::new(Store::with_clock(Arc::new(FixedClock::at_unix(
            1_700_000_000,
        ))));
        store.register_observer(Arc::new(OutboxRecorder::new()));
        store
    }

    fn insert_muscles(store: &Store, names: &[&str]) -> Vec<StableId> {
        store
            .transaction("app", |txn| {
                let mut guids = Vec::new();
                for name in names {
                    let guid = StableId::new();
                    let id = txn.next_row_id();
                    let audit = txn.stamp();
                    txn.put_muscle(MuscleRow {
                        id,
                        guid,
                        name: (*name).into(),
                        descriptor_id: None,
                        body_section: BodySection::UpperBody,
                        audit,
                    });
                    guids.push(guid);
                }
                Ok(guids)
            })
            .unwrap()
    }

    fn receipt(statuses: &[(StableId, PushVerdict)]) -> PushReceipt {
        PushReceipt {
            server_time: chrono::Utc::now(),
            accepted: statuses.iter().filter(|(_, s)| s.is_settled()).count(),
            failed: statuses.iter().filter(|(_, s)| !s.is_settled()).count(),
            items: statuses
                .iter()
                .map(|(id, status)| PushItemReceipt {
                    id: *id,
                    status: *status,
                    message: None,
                })
                .collect(),
        }
    }

    #[test]
    fn settled_verdicts_mark_rows_sent() {
        let store = store_with_recorder();
        let guids = insert_muscles(&store, &["Biceps", "Triceps"]);
        let transport = MockTransport::new();
        transport.enqueue_push(receipt(&[
            (guids[0], PushVerdict::Upserted),
            (guids[1], PushVerdict::Conflict),
        ]));

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        let outcome = dispatcher.dispatch(chrono::Utc::now()).unwrap();

        assert_eq!(outcome.taken, 2);
        assert_eq!(outcome.settled, 1);
        assert_eq!(outcome.retried, 1);
        assert_eq!(store.pending_outbox(), 1);
        assert_eq!(store.unsent_outbox(10)[0].entity_id, guids[1]);
    }

    #[test]
    fn offline_leaves_outbox_untouched() {
        let store = store_with_recorder();
        insert_muscles(&store, &["Biceps"]);
        let transport = MockTransport::new();
        transport.set_online(false);

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        assert!(matches!(
            dispatcher.dispatch(chrono::Utc::now()),
            Err(SyncError::Offline)
        ));
        assert_eq!(store.pending_outbox(), 1);
        assert!(transport.pushes().is_empty());
    }

    #[test]
    fn transport_failure_keeps_rows_for_retry() {
        let store = store_with_recorder();
        insert_muscles(&store, &["Biceps"]);
        let transport = MockTransport::new();
        transport.fail_next_with(SyncError::transport_retryable("connection reset"));

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        let outcome = dispatcher.dispatch(chrono::Utc::now()).unwrap();

        assert_eq!(outcome.failed_kinds, vec![EntityKind::Muscle]);
        assert_eq!(store.pending_outbox(), 1);
    }

    #[test]
    fn failed_group_does_not_block_later_groups() {
        let store = store_with_recorder();
        insert_muscles(&store, &["Biceps"]);
        let barbell = store
            .transaction("app", |txn| {
                let guid = StableId::new();
                let id = txn.next_row_id();
                let audit = txn.stamp();
                txn.put_equipment(EquipmentRow {
                    id,
                    guid,
                    name: "Barbell".into(),
                    descriptor_id: None,
                    audit,
                });
                Ok(guid)
            })
            .unwrap();

        // Muscles rank before equipment, so the scripted failure hits the
        // muscle group and the equipment group must still go out.
        let transport = MockTransport::new();
        transport.fail_next_with(SyncError::transport_retryable("connection reset"));
        transport.enqueue_push(receipt(&[(barbell, PushVerdict::Upserted)]));

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        let outcome = dispatcher.dispatch(chrono::Utc::now()).unwrap();

        assert_eq!(outcome.failed_kinds, vec![EntityKind::Muscle]);
        assert_eq!(outcome.settled, 1);
        assert_eq!(store.pending_outbox(), 1);
        assert_eq!(store.unsent_outbox(10)[0].entity_kind, EntityKind::Muscle);
    }

    #[test]
    fn receipt_order_does_not_decide_verdicts() {
        let store = store_with_recorder();
        let guids = insert_muscles(&store, &["Biceps", "Triceps"]);
        let transport = MockTransport::new();
        // Verdicts listed in the reverse of the pushed order; the
        // conflicted first row must stay unsent.
        transport.enqueue_push(receipt(&[
            (guids[1], PushVerdict::Upserted),
            (guids[0], PushVerdict::Conflict),
        ]));

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        let outcome = dispatcher.dispatch(chrono::Utc::now()).unwrap();

        assert_eq!(outcome.settled, 1);
        assert_eq!(outcome.retried, 1);
        assert_eq!(store.unsent_outbox(10)[0].entity_id, guids[0]);
    }

    #[test]
    fn short_receipt_settles_only_matched_items() {
        let store = store_with_recorder();
        let guids = insert_muscles(&store, &["Biceps", "Triceps"]);
        let transport = MockTransport::new();
        transport.enqueue_push(receipt(&[(guids[0], PushVerdict::Upserted)]));

        let dispatcher = OutboxDispatcher::new(&store, &transport, 100);
        let outcome = dispatcher.dispatch(chrono::Utc::now()).unwrap();

        assert_eq!(outcome.settled, 1);
        assert_eq!(outcome.retried, 1);
        assert_eq!(store.pending_outbox(), 1);
        assert_eq!(store.unsent_outbox(10)[0].entity_id, guids[1]);
    }
}
