//! Per-kind entity processors.
//!
//! A processor applies one pulled envelope to the local store inside a
//! sync-actor transaction. Apply is idempotent: re-delivering an already
//! applied envelope changes nothing, and re-delivery is also how deferred
//! relationship references self-heal once their targets exist.

mod descriptor;
mod equipment;
mod movement;
mod movement_category;
mod muscle;

pub use descriptor::DescriptorProcessor;
pub use equipment::EquipmentProcessor;
pub use movement::MovementProcessor;
pub use movement_category::MovementCategoryProcessor;
pub use muscle::MuscleProcessor;

use chrono::{DateTime, Utc};
use liftlog_domain::{Authority, EntityKind, StableId};
use liftlog_store::{Audit, DescriptorRow, StoreError, Transaction};
use liftlog_sync_protocol::{Envelope, SyncEnvelope};
use std::collections::HashMap;

/// Content of a placeholder descriptor created for a dangling reference.
pub const PLACEHOLDER_CONTENT: &str = "none";

/// Result of applying one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Whether the envelope changed local state.
    pub applied: bool,
    /// Relationship references whose targets were missing locally.
    pub deferred_refs: usize,
}

impl ApplyOutcome {
    /// An apply that was skipped entirely.
    pub fn skipped() -> Self {
        Self::default()
    }

    /// An apply that landed, with the given number of deferred references.
    pub fn applied(deferred_refs: usize) -> Self {
        Self {
            applied: true,
            deferred_refs,
        }
    }
}

/// Applies pulled envelopes of one entity kind.
pub trait EntityProcessor: Send + Sync {
    /// The kind this processor handles.
    fn kind(&self) -> EntityKind;

    /// Applies one envelope. Called inside a sync-actor transaction; an
    /// error aborts the whole page.
    fn apply(
        &self,
        txn: &mut Transaction<'_>,
        envelope: &SyncEnvelope,
    ) -> Result<ApplyOutcome, StoreError>;
}

/// Dispatch table from entity kind to its processor.
///
/// Registration is first-wins: a second processor for an already covered
/// kind is dropped with a warning rather than silently replacing the
/// first.
#[derive(Default)]
pub struct ProcessorSet {
    map: HashMap<EntityKind, Box<dyn EntityProcessor>>,
}

impl ProcessorSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard set covering every syncable kind.
    pub fn defaults() -> Self {
        let mut set = Self::new();
        set.register(Box::new(DescriptorProcessor));
        set.register(Box::new(MovementCategoryProcessor));
        set.register(Box::new(MuscleProcessor));
        set.register(Box::new(EquipmentProcessor));
        set.register(Box::new(MovementProcessor));
        set
    }

    /// Registers a processor for its kind, first registration wins.
    pub fn register(&mut self, processor: Box<dyn EntityProcessor>) {
        let kind = processor.kind();
        if self.map.contains_key(&kind) {
            tracing::warn!(kind = %kind, "duplicate processor registration ignored");
            return;
        }
        self.map.insert(kind, processor);
    }

    /// Looks up the processor for a kind.
    pub fn get(&self, kind: EntityKind) -> Option<&dyn EntityProcessor> {
        self.map.get(&kind).map(|p| p.as_ref())
    }
}

/// Decides whether an incoming envelope overwrites the local row.
///
/// Client-owned rows never yield to the server; server-owned rows always
/// do. Bidirectional rows follow last-writer-wins on `(ts, seq)`, with
/// ties applying so that re-delivered envelopes still reconcile their
/// relationships.
pub(crate) fn should_apply(local: Option<&Audit>, envelope: &impl Envelope) -> bool {
    match local {
        None => true,
        Some(audit) => match audit.authority {
            Authority::ClientOwned => false,
            Authority::ServerOwned => true,
            Authority::Bidirectional => {
                (envelope.updated_at(), envelope.updated_seq())
                    >= (audit.updated_at_utc, audit.updated_seq)
            }
        },
    }
}

/// Audit columns copied verbatim from an envelope.
pub(crate) fn audit_from(envelope: &impl Envelope) -> Audit {
    Audit {
        updated_at_utc: envelope.updated_at(),
        updated_seq: envelope.updated_seq(),
        is_deleted: envelope.is_deleted(),
        authority: envelope.authority(),
    }
}

/// Resolves a descriptor reference to a local id, creating a placeholder
/// row when the descriptor has not arrived yet.
///
/// The placeholder is stamped at the epoch floor so the real descriptor
/// envelope wins the moment it shows up.
pub(crate) fn resolve_descriptor(
    txn: &mut Transaction<'_>,
    guid: Option<StableId>,
) -> Option<u64> {
    let guid = guid.filter(|g| !g.is_nil())?;
    if let Some(existing) = txn.descriptor_by_guid(guid) {
        return Some(existing.id);
    }
    let id = txn.next_row_id();
    tracing::debug!(descriptor = %guid, "creating placeholder descriptor");
    txn.put_descriptor(DescriptorRow {
        id,
        guid,
        content: PLACEHOLDER_CONTENT.to_string(),
        audit: Audit {
            updated_at_utc: DateTime::<Utc>::MIN_UTC,
            updated_seq: 0,
            is_deleted: false,
            authority: Authority::Bidirectional,
        },
    });
    Some(id)
}
