//! Muscle apply, including antagonist reconciliation.

use super::{audit_from, resolve_descriptor, should_apply, ApplyOutcome, EntityProcessor};
use liftlog_domain::{EntityKind, StableId};
use liftlog_store::{MuscleRow, StoreError, Transaction};
use liftlog_sync_protocol::SyncEnvelope;

/// Applies muscle envelopes.
pub struct MuscleProcessor;

impl EntityProcessor for MuscleProcessor {
    fn kind(&self) -> EntityKind {
        EntityKind::Muscle
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError> {
        let SyncEnvelope::Muscle(env) = envelope else {
            tracing::warn!(kind = %envelope.kind(), "muscle processor given wrong kind");
            return Ok(ApplyOutcome::skipped());
        };

        let existing = txn.muscle_by_guid(env.guid).cloned();
        if !should_apply(existing.as_ref().map(|r| &r.audit), env) {
            return Ok(ApplyOutcome::skipped());
        }

        let id = match &existing {
            Some(row) => row.id,
            None => txn.next_row_id(),
        };
        let descriptor_id = resolve_descriptor(txn, env.descriptor_guid);
        txn.put_muscle(MuscleRow {
            id,
            guid: env.guid,
            name: env.name.clone(),
            descriptor_id,
            body_section: env.body_section,
            audit: audit_from(env),
        });

        let deferred = reconcile_antagonists(txn, id, env.guid, env.desired_antagonists());
        Ok(ApplyOutcome::applied(deferred))
    }
}

/// Diffs the antagonist join rows against the desired set. Targets not
/// yet present locally are deferred with a warning; a later re-apply of
/// the same envelope picks them up.
fn reconcile_antagonists(
    txn: &mut Transaction<'_>,
    muscle_id: u64,
    muscle_guid: StableId,
    desired_guids: Vec<StableId>,
) -> usize {
    let mut desired_ids = Vec::new();
    let mut deferred = 0;
    for guid in desired_guids {
        if guid == muscle_guid {
            continue;
        }
        match txn.muscle_by_guid(guid).map(|m| m.id) {
            Some(id) => desired_ids.push(id),
            None => {
                deferred += 1;
                tracing::warn!(muscle = %muscle_guid, antagonist = %guid,
                    "antagonist not present locally, deferring link");
            }
        }
    }

    for id in txn.antagonists_of(muscle_id) {
        if !desired_ids.contains(&id) {
            txn.unlink_antagonist(muscle_id, id);
        }
    }
    for id in desired_ids {
        txn.link_antagonist(muscle_id, id);
    }
    deferred
}
