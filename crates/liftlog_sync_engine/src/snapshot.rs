//! Row-to-envelope snapshots.
//!
//! Builds a full sync envelope for an entity from its row and join
//! tables, resolving local-id references back to stable ids. Used by the
//! outbox recorder at commit time.

use liftlog_domain::{EntityKind, MuscleRole, StableId};
use liftlog_store::Transaction;
use liftlog_sync_protocol::{
    DescriptorEnvelope, EquipmentEnvelope, MovementCategoryEnvelope, MovementEnvelope,
    MuscleEnvelope, SyncEnvelope,
};

/// Builds the envelope for an entity as it stands in the transaction.
/// Returns `None` when no row with that stable id exists.
pub(crate) fn snapshot_envelope(
    txn: &Transaction<'_>,
    kind: EntityKind,
    guid: StableId,
) -> Option<SyncEnvelope> {
    match kind {
        EntityKind::Descriptor => {
            let row = txn.descriptor_by_guid(guid)?;
            Some(SyncEnvelope::Descriptor(DescriptorEnvelope {
                guid: row.guid,
                content: row.content.clone(),
                updated_at_utc: row.audit.updated_at_utc,
                updated_seq: row.audit.updated_seq,
                is_deleted: row.audit.is_deleted,
                authority: row.audit.authority,
            }))
        }
        EntityKind::Equipment => {
            let row = txn.equipment_by_guid(guid)?;
            Some(SyncEnvelope::Equipment(EquipmentEnvelope {
                guid: row.guid,
                name: row.name.clone(),
                descriptor_guid: descriptor_guid(txn, row.descriptor_id),
                updated_at_utc: row.audit.updated_at_utc,
                updated_seq: row.audit.updated_seq,
                is_deleted: row.audit.is_deleted,
                authority: row.audit.authority,
            }))
        }
        EntityKind::Muscle => {
            let row = txn.muscle_by_guid(guid)?;
            let antagonists: Vec<StableId> = txn
                .antagonists_of(row.id)
                .into_iter()
                .filter_map(|id| txn.muscle(id).map(|m| m.guid))
                .collect();
            Some(SyncEnvelope::Muscle(MuscleEnvelope {
                guid: row.guid,
                name: row.name.clone(),
                descriptor_guid: descriptor_guid(txn, row.descriptor_id),
                body_section: row.body_section,
                antagonist_guids: Some(antagonists),
                updated_at_utc: row.audit.updated_at_utc,
                updated_seq: row.audit.updated_seq,
                is_deleted: row.audit.is_deleted,
                authority: row.audit.authority,
            }))
        }
        EntityKind::MovementCategory => {
            let row = txn.category_by_guid(guid)?;
            Some(SyncEnvelope::MovementCategory(MovementCategoryEnvelope {
                guid: row.guid,
                name: row.name.clone(),
                descriptor_guid: descriptor_guid(txn, row.descriptor_id),
                parent_category_guid: row
                    .parent_category_id
                    .and_then(|id| txn.category(id))
                    .map(|c| c.guid),
                base_categories: txn.bases_of_category(row.id),
                updated_at_utc: row.audit.updated_at_utc,
                updated_seq: row.audit.updated_seq,
                is_deleted: row.audit.is_deleted,
                authority: row.audit.authority,
            }))
        }
        EntityKind::Movement => {
            let row = txn.movement_by_guid(guid)?;
            let mut primary = Vec::new();
            let mut secondary = Vec::new();
            for (muscle_id, role) in txn.muscles_of_movement(row.id) {
                if let Some(muscle) = txn.muscle(muscle_id) {
                    match role {
                        MuscleRole::Primary => primary.push(muscle.guid),
                        MuscleRole::Secondary => secondary.push(muscle.guid),
                    }
                }
            }
            let equipment: Vec<StableId> = txn
                .equipment_of_movement(row.id)
                .into_iter()
                .filter_map(|id| txn.equipment(id).map(|e| e.guid))
                .collect();
            Some(SyncEnvelope::Movement(MovementEnvelope {
                guid: row.guid,
                name: row.name.clone(),
                descriptor_guid: descriptor_guid(txn, row.descriptor_id),
                primary_muscles: Some(primary),
                secondary_muscles: Some(secondary),
                equipment: Some(equipment),
                category: row.category_id.and_then(|id| txn.category(id)).map(|c| c.guid),
                variant_of: row
                    .variant_of_id
                    .and_then(|id| txn.movement(id))
                    .map(|m| m.guid),
                updated_at_utc: row.audit.updated_at_utc,
                updated_seq: row.audit.updated_seq,
                is_deleted: row.audit.is_deleted,
                authority: row.audit.authority,
            }))
        }
        EntityKind::Unidentified => None,
    }
}

fn descriptor_guid(txn: &Transaction<'_>, descriptor_id: Option<u64>) -> Option<StableId> {
    descriptor_id.and_then(|id| txn.descriptor(id)).map(|d| d.guid)
}
