//! Descriptor apply.

use super::{audit_from, should_apply, ApplyOutcome, EntityProcessor, PLACEHOLDER_CONTENT};
use liftlog_domain::EntityKind;
use liftlog_store::{DescriptorRow, StoreError, Transaction};
use liftlog_sync_protocol::SyncEnvelope;

/// Applies descriptor envelopes.
pub struct DescriptorProcessor;

impl EntityProcessor for DescriptorProcessor {
    fn kind(&self) -> EntityKind {
        EntityKind::Descriptor
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError> {
        let SyncEnvelope::Descriptor(env) = envelope else {
            tracing::warn!(kind = %envelope.kind(), "descriptor processor given wrong kind");
            return Ok(ApplyOutcome::skipped());
        };

        let existing = txn.descriptor_by_guid(env.guid).cloned();
        // A placeholder yields to the first real envelope regardless of
        // stamps.
        let placeholder = existing
            .as_ref()
            .is_some_and(|row| row.content == PLACEHOLDER_CONTENT);
        if !placeholder && !should_apply(existing.as_ref().map(|r| &r.audit), env) {
            return Ok(ApplyOutcome::skipped());
        }

        let id = match &existing {
            Some(row) => row.id,
            None => txn.next_row_id(),
        };
        txn.put_descriptor(DescriptorRow {
            id,
            guid: env.guid,
            content: env.content.clone(),
            audit: audit_from(env),
        });
        Ok(ApplyOutcome::applied(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use liftlog_domain::{Authority, FixedClock, StableId};
    use liftlog_store::{Store, SYNC_ACTOR};
    use liftlog_sync_protocol::DescriptorEnvelope;
    use std::sync::Arc;

    fn env(guid: StableId, content: &str, secs: i64, seq: i64) -> SyncEnvelope {
        SyncEnvelope::Descriptor(DescriptorEnvelope {
            guid,
            content: content.into(),
            updated_at_utc: Utc.timestamp_opt(secs, 0).unwrap(),
            updated_seq: seq,
            is_deleted: false,
            authority: Authority::Bidirectional,
        })
    }

    #[test]
    fn placeholder_yields_to_real_envelope() {
        let store = Store::with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)));
        let guid = StableId::new();

        store
            .transaction(SYNC_ACTOR, |txn| {
                // Dangling reference creates the placeholder first.
                super::super::resolve_descriptor(txn, Some(guid));
                // Real envelope arrives with an old stamp.
                DescriptorProcessor.apply(txn, &env(guid, "Adjustable bench", 10, 1))?;
                Ok(())
            })
            .unwrap();

        store.read(|snap| {
            let row = snap.descriptor_by_guid(guid).unwrap();
            assert_eq!(row.content, "Adjustable bench");
        });
    }

    #[test]
    fn stale_envelope_is_skipped() {
        let store = Store::with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)));
        let guid = StableId::new();

        store
            .transaction(SYNC_ACTOR, |txn| {
                let fresh = DescriptorProcessor.apply(txn, &env(guid, "new", 100, 5))?;
                assert!(fresh.applied);
                let stale = DescriptorProcessor.apply(txn, &env(guid, "old", 100, 4))?;
                assert!(!stale.applied);
                Ok(())
            })
            .unwrap();

        store.read(|snap| {
            assert_eq!(snap.descriptor_by_guid(guid).unwrap().content, "new");
        });
    }
}
