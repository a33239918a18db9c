//! Movement category apply.

use super::{audit_from, resolve_descriptor, should_apply, ApplyOutcome, EntityProcessor};
use liftlog_domain::EntityKind;
use liftlog_store::{MovementCategoryRow, StoreError, Transaction};
use liftlog_sync_protocol::SyncEnvelope;

/// Applies movement category envelopes.
pub struct MovementCategoryProcessor;

impl EntityProcessor for MovementCategoryProcessor {
    fn kind(&self) -> EntityKind {
        EntityKind::MovementCategory
    }

    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError> {
        let SyncEnvelope::MovementCategory(env) = envelope else {
            tracing::warn!(kind = %envelope.kind(), "category processor given wrong kind");
            return Ok(ApplyOutcome::skipped());
        };

        let existing = txn.category_by_guid(env.guid).cloned();
        if !should_apply(existing.as_ref().map(|r| &r.audit), env) {
            return Ok(ApplyOutcome::skipped());
        }

        let id = match &existing {
            Some(row) => row.id,
            None => txn.next_row_id(),
        };
        let descriptor_id = resolve_descriptor(txn, env.descriptor_guid);

        let mut deferred = 0;
        let parent_category_id = match env.parent_category_guid.filter(|g| *g != env.guid) {
            None => None,
            Some(parent) => match txn.category_by_guid(parent).map(|c| c.id) {
                Some(parent_id) => Some(parent_id),
                None => {
                    deferred += 1;
                    tracing::warn!(category = %env.guid, parent = %parent,
                        "parent category not present locally, deferring link");
                    None
                }
            },
        };

        txn.put_category(MovementCategoryRow {
            id,
            guid: env.guid,
            name: env.name.clone(),
            descriptor_id,
            parent_category_id,
            audit: audit_from(env),
        });
        txn.set_category_bases(id, env.desired_base_categories());
        Ok(ApplyOutcome::applied(deferred))
    }
}
