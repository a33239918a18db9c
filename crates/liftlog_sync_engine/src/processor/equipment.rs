//! Equipment apply.

use super::{audit_from, resolve_descriptor, should_apply, ApplyOutcome, EntityProcessor};
use liftlog_domain::EntityKind;
use liftlog_store::{EquipmentRow, StoreError, Transaction};
use liftlog_sync_protocol::SyncEnvelope;

/// Applies equipment envelopes.
pub struct EquipmentProcessor;

impl EntityProcessor for EquipmentProcessor {
    fn kind(&self) -> EntityKind {
        EntityKind::Equipment
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError> {
        let SyncEnvelope::Equipment(env) = envelope else {
            tracing::warn!(kind = %envelope.kind(), "equipment processor given wrong kind");
            return Ok(ApplyOutcome::skipped());
        };

        let existing = txn.equipment_by_guid(env.guid).cloned();
        if !should_apply(existing.as_ref().map(|r| &r.audit), env) {
            return Ok(ApplyOutcome::skipped());
        }

        let id = match &existing {
            Some(row) => row.id,
            None => txn.next_row_id(),
        };
        let descriptor_id = resolve_descriptor(txn, env.descriptor_guid);
        txn.put_equipment(EquipmentRow {
            id,
            guid: env.guid,
            name: env.name.clone(),
            descriptor_id,
            audit: audit_from(env),
        });
        Ok(ApplyOutcome::applied(0))
    }
}
