//! Movement apply, including muscle and equipment reconciliation.

use super::{audit_from, resolve_descriptor, should_apply, ApplyOutcome, EntityProcessor};
use liftlog_domain::{EntityKind, MuscleRole, StableId};
use liftlog_store::{MovementRow, StoreError, Transaction};
use liftlog_sync_protocol::SyncEnvelope;

/// Applies movement envelopes.
pub struct MovementProcessor;

impl EntityProcessor for MovementProcessor {
    fn kind(&self) -> EntityKind {
        EntityKind::Movement
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError> {
        let SyncEnvelope::Movement(env) = envelope else {
            tracing::warn!(kind = %envelope.kind(), "movement processor given wrong kind");
            return Ok(ApplyOutcome::skipped());
        };

        let existing = txn.movement_by_guid(env.guid).cloned();
        if !should_apply(existing.as_ref().map(|r| &r.audit), env) {
            return Ok(ApplyOutcome::skipped());
        }

        let id = match &existing {
            Some(row) => row.id,
            None => txn.next_row_id(),
        };
        let descriptor_id = resolve_descriptor(txn, env.descriptor_guid);

        let mut deferred = 0;
        let category_id = match env.category.filter(|g| !g.is_nil()) {
            None => None,
            Some(category) => match txn.category_by_guid(category).map(|c| c.id) {
                Some(category_id) => Some(category_id),
                None => {
                    deferred += 1;
                    tracing::warn!(movement = %env.guid, category = %category,
                        "category not present locally, deferring link");
                    None
                }
            },
        };
        let variant_of_id = match env.variant_of.filter(|g| *g != env.guid && !g.is_nil()) {
            None => None,
            Some(variant) => match txn.movement_by_guid(variant).map(|m| m.id) {
                Some(variant_id) => Some(variant_id),
                None => {
                    deferred += 1;
                    tracing::warn!(movement = %env.guid, variant_of = %variant,
                        "variant target not present locally, deferring link");
                    None
                }
            },
        };

        txn.put_movement(MovementRow {
            id,
            guid: env.guid,
            name: env.name.clone(),
            descriptor_id,
            category_id,
            variant_of_id,
            audit: audit_from(env),
        });

        deferred += reconcile_muscles(
            txn,
            id,
            env.guid,
            env.desired_primary_muscles(),
            env.desired_secondary_muscles(),
        );
        deferred += reconcile_equipment(txn, id, env.guid, env.desired_equipment());
        Ok(ApplyOutcome::applied(deferred))
    }
}

/// Diffs movement-muscle join rows against the desired primary and
/// secondary sets. Role changes update in place; missing targets defer.
fn reconcile_muscles(
    txn: &mut Transaction<'_>,
    movement_id: u64,
    movement_guid: StableId,
    primary: Vec<StableId>,
    secondary: Vec<StableId>,
) -> usize {
    let mut desired: Vec<(u64, MuscleRole)> = Vec::new();
    let mut deferred = 0;
    let wanted = primary
        .into_iter()
        .map(|g| (g, MuscleRole::Primary))
        .chain(secondary.into_iter().map(|g| (g, MuscleRole::Secondary)));
    for (guid, role) in wanted {
        match txn.muscle_by_guid(guid).map(|m| m.id) {
            Some(id) => desired.push((id, role)),
            None => {
                deferred += 1;
                tracing::warn!(movement = %movement_guid, muscle = %guid,
                    "muscle not present locally, deferring link");
            }
        }
    }

    for (id, _) in txn.muscles_of_movement(movement_id) {
        if !desired.iter().any(|(d, _)| *d == id) {
            txn.unlink_movement_muscle(movement_id, id);
        }
    }
    for (id, role) in desired {
        txn.link_movement_muscle(movement_id, id, role);
    }
    deferred
}

/// Diffs movement-equipment join rows against the desired set.
fn reconcile_equipment(
    txn: &mut Transaction<'_>,
    movement_id: u64,
    movement_guid: StableId,
    desired_guids: Vec<StableId>,
) -> usize {
    let mut desired_ids = Vec::new();
    let mut deferred = 0;
    for guid in desired_guids {
        match txn.equipment_by_guid(guid).map(|e| e.id) {
            Some(id) => desired_ids.push(id),
            None => {
                deferred += 1;
                tracing::warn!(movement = %movement_guid, equipment = %guid,
                    "equipment not present locally, deferring link");
            }
        }
    }

    for id in txn.equipment_of_movement(movement_id) {
        if !desired_ids.contains(&id) {
            txn.unlink_movement_equipment(movement_id, id);
        }
    }
    for id in desired_ids {
        txn.link_movement_equipment(movement_id, id);
    }
    deferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use liftlog_domain::{Authority, BodySection, FixedClock};
    use liftlog_store::{Audit, MuscleRow, Store, SYNC_ACTOR};
    use liftlog_sync_protocol::MovementEnvelope;
    use std::sync::Arc;

    fn env(
        guid: StableId,
        primary: Vec<StableId>,
        secondary: Vec<StableId>,
        seq: i64,
    ) -> SyncEnvelope {
        SyncEnvelope::Movement(MovementEnvelope {
            guid,
            name: "Bench Press".into(),
            descriptor_guid: None,
            primary_muscles: Some(primary),
            secondary_muscles: Some(secondary),
            equipment: None,
            category: None,
            variant_of: None,
            updated_at_utc: Utc.timestamp_opt(100, 0).unwrap(),
            updated_seq: seq,
            is_deleted: false,
            authority: Authority::Bidirectional,
        })
    }

    fn seed_muscle(txn: &mut Transaction<'_>, guid: StableId) -> u64 {
        let id = txn.next_row_id();
        txn.put_muscle(MuscleRow {
            id,
            guid,
            name: "Muscle".into(),
            descriptor_id: None,
            body_section: BodySection::UpperBody,
            audit: Audit {
                updated_at_utc: Utc.timestamp_opt(50, 0).unwrap(),
                updated_seq: 0,
                is_deleted: false,
                authority: Authority::Bidirectional,
            },
        });
        id
    }

    #[test]
    fn muscle_role_change_updates_link() {
        let store = Store::with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)));
        let movement = StableId::from_bytes([1; 16]);
        let pecs = StableId::from_bytes([2; 16]);

        store
            .transaction(SYNC_ACTOR, |txn| {
                let pecs_id = seed_muscle(txn, pecs);
                MovementProcessor.apply(txn, &env(movement, vec![pecs], vec![], 1))?;
                let movement_id = txn.movement_by_guid(movement).unwrap().id;
                assert_eq!(
                    txn.muscles_of_movement(movement_id),
                    vec![(pecs_id, MuscleRole::Primary)]
                );

                // Newer envelope demotes pecs to secondary.
                MovementProcessor.apply(txn, &env(movement, vec![], vec![pecs], 2))?;
                assert_eq!(
                    txn.muscles_of_movement(movement_id),
                    vec![(pecs_id, MuscleRole::Secondary)]
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn missing_muscle_defers_then_heals_on_reapply() {
        let store = Store::with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)));
        let movement = StableId::from_bytes([1; 16]);
        let delts = StableId::from_bytes([2; 16]);

        store
            .transaction(SYNC_ACTOR, |txn| {
                let outcome = MovementProcessor.apply(txn, &env(movement, vec![delts], vec![], 1))?;
                assert_eq!(outcome.deferred_refs, 1);

                seed_muscle(txn, delts);
                let healed = MovementProcessor.apply(txn, &env(movement, vec![delts], vec![], 1))?;
                assert_eq!(healed.deferred_refs, 0);

                let movement_id = txn.movement_by_guid(movement).unwrap().id;
                assert_eq!(txn.muscles_of_movement(movement_id).len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn tombstone_clears_relationships() {
        let store = Store::with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)));
        let movement = StableId::from_bytes([1; 16]);
        let pecs = StableId::from_bytes([2; 16]);

        store
            .transaction(SYNC_ACTOR, |txn| {
                seed_muscle(txn, pecs);
                MovementProcessor.apply(txn, &env(movement, vec![pecs], vec![], 1))?;

                let mut tombstone = match env(movement, vec![pecs], vec![], 2) {
                    SyncEnvelope::Movement(e) => e,
                    _ => unreachable!(),
                };
                tombstone.is_deleted = true;
                MovementProcessor.apply(txn, &SyncEnvelope::Movement(tombstone))?;

                let row = txn.movement_by_guid(movement).unwrap();
                assert!(row.audit.is_deleted);
                assert!(txn.muscles_of_movement(row.id).is_empty());
                Ok(())
            })
            .unwrap();
    }
}
