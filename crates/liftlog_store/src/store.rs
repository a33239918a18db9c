//! The embedded store.
//!
//! All tables live in memory behind one lock. Writes go through
//! [`Store::transaction`]: the closure works on a snapshot clone of the
//! tables, and on success the snapshot replaces the live state after any
//! registered [`CommitObserver`]s have run. An error from the closure or
//! an observer discards the snapshot, so a commit is all-or-nothing.
//!
//! Transactions opened by the sync actor bypass observers; applying a
//! remote change must not record it back into the outbox.

use crate::error::{StoreError, StoreResult};
use crate::outbox::{ChangeKind, OutboxRow};
use crate::rows::*;
use chrono::{DateTime, Utc};
use liftlog_domain::{BaseCategory, Clock, EntityKind, MuscleRole, StableId, SystemClock};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Actor name whose transactions bypass commit observers.
pub const SYNC_ACTOR: &str = "sync";

/// Lifecycle state of a tracked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    /// Row did not exist before this transaction.
    Added,
    /// Row existed and was overwritten.
    Modified,
    /// Row was tombstoned in this transaction.
    Deleted,
}

/// One entity-level change recorded during a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedChange {
    /// Kind of the changed entity.
    pub kind: EntityKind,
    /// Stable id of the changed entity.
    pub stable_id: StableId,
    /// What happened to the row.
    pub state: ChangeState,
}

/// Hook invoked before a non-sync transaction commits.
///
/// Observers see the finished working snapshot and may append further
/// writes to it (the outbox recorder does). Returning an error aborts
/// the commit.
pub trait CommitObserver: Send + Sync {
    /// Runs against the about-to-commit transaction.
    fn before_commit(&self, txn: &mut Transaction<'_>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct Tables {
    descriptors: BTreeMap<u64, DescriptorRow>,
    equipment: BTreeMap<u64, EquipmentRow>,
    muscles: BTreeMap<u64, MuscleRow>,
    categories: BTreeMap<u64, MovementCategoryRow>,
    movements: BTreeMap<u64, MovementRow>,
    muscle_antagonists: Vec<MuscleAntagonistRow>,
    movement_muscles: Vec<MovementMuscleRow>,
    movement_equipment: Vec<MovementEquipmentRow>,
    category_bases: Vec<CategoryBaseRow>,
    outbox: Vec<OutboxRow>,
    next_row_id: u64,
    next_outbox_id: u64,
    next_seq: i64,
    next_commit: u64,
}

/// The embedded LiftLog store.
pub struct Store {
    state: RwLock<Tables>,
    observers: RwLock<Vec<Arc<dyn CommitObserver>>>,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(Tables {
                next_row_id: 1,
                next_outbox_id: 1,
                next_seq: 1,
                next_commit: 1,
                ..Tables::default()
            }),
            observers: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Registers a commit observer. Observers run in registration order
    /// for every non-sync transaction.
    pub fn register_observer(&self, observer: Arc<dyn CommitObserver>) {
        self.observers.write().push(observer);
    }

    /// Runs `f` inside a transaction attributed to `actor`.
    ///
    /// The closure mutates a snapshot; the snapshot becomes the live state
    /// only if the closure and every observer succeed. Observers are
    /// skipped when `actor` is [`SYNC_ACTOR`].
    pub fn transaction<R>(
        &self,
        actor: &str,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.state.write();
        let mut txn = Transaction {
            tables: guard.clone(),
            actor,
            now: self.clock.now(),
            commit_id: guard.next_commit,
            changes: Vec::new(),
        };

        let out = f(&mut txn)?;

        if actor != SYNC_ACTOR {
            let observers = self.observers.read().clone();
            for observer in &observers {
                observer.before_commit(&mut txn)?;
            }
        }

        txn.tables.next_commit += 1;
        tracing::debug!(
            actor,
            commit = txn.commit_id,
            changes = txn.changes.len(),
            "commit"
        );
        *guard = txn.tables;
        Ok(out)
    }

    /// Runs a read-only closure against the live state.
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot<'_>) -> R) -> R {
        let guard = self.state.read();
        f(&Snapshot { tables: &*guard })
    }

    /// Returns up to `limit` unsent outbox rows, oldest first.
    pub fn unsent_outbox(&self, limit: usize) -> Vec<OutboxRow> {
        let guard = self.state.read();
        let mut rows: Vec<OutboxRow> = guard.outbox.iter().filter(|r| !r.sent).cloned().collect();
        rows.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        rows
    }

    /// Marks the given outbox rows as sent.
    pub fn mark_outbox_sent(&self, ids: &[u64]) {
        let mut guard = self.state.write();
        for row in guard.outbox.iter_mut() {
            if ids.contains(&row.id) {
                row.sent = true;
            }
        }
    }

    /// Count of outbox rows still awaiting delivery.
    pub fn pending_outbox(&self) -> usize {
        self.state.read().outbox.iter().filter(|r| !r.sent).count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of committed state.
pub struct Snapshot<'a> {
    tables: &'a Tables,
}

macro_rules! by_guid {
    ($fn_name:ident, $table:ident, $row:ty) => {
        /// Looks up a row by stable id, tombstones included.
        pub fn $fn_name(&self, guid: StableId) -> Option<&$row> {
            self.tables.$table.values().find(|r| r.guid == guid)
        }
    };
}

macro_rules! snapshot_reads {
    () => {
        by_guid!(descriptor_by_guid, descriptors, DescriptorRow);
        by_guid!(equipment_by_guid, equipment, EquipmentRow);
        by_guid!(muscle_by_guid, muscles, MuscleRow);
        by_guid!(category_by_guid, categories, MovementCategoryRow);
        by_guid!(movement_by_guid, movements, MovementRow);

        /// Looks up a descriptor row by local id.
        pub fn descriptor(&self, id: u64) -> Option<&DescriptorRow> {
            self.tables.descriptors.get(&id)
        }

        /// Looks up an equipment row by local id.
        pub fn equipment(&self, id: u64) -> Option<&EquipmentRow> {
            self.tables.equipment.get(&id)
        }

        /// Looks up a muscle row by local id.
        pub fn muscle(&self, id: u64) -> Option<&MuscleRow> {
            self.tables.muscles.get(&id)
        }

        /// Looks up a category row by local id.
        pub fn category(&self, id: u64) -> Option<&MovementCategoryRow> {
            self.tables.categories.get(&id)
        }

        /// Looks up a movement row by local id.
        pub fn movement(&self, id: u64) -> Option<&MovementRow> {
            self.tables.movements.get(&id)
        }

        /// Antagonist local ids of a muscle, in insertion order.
        pub fn antagonists_of(&self, muscle_id: u64) -> Vec<u64> {
            self.tables
                .muscle_antagonists
                .iter()
                .filter(|r| r.muscle_id == muscle_id)
                .map(|r| r.antagonist_id)
                .collect()
        }

        /// Muscles worked by a movement with their roles.
        pub fn muscles_of_movement(&self, movement_id: u64) -> Vec<(u64, MuscleRole)> {
            self.tables
                .movement_muscles
                .iter()
                .filter(|r| r.movement_id == movement_id)
                .map(|r| (r.muscle_id, r.role))
                .collect()
        }

        /// Equipment local ids required by a movement.
        pub fn equipment_of_movement(&self, movement_id: u64) -> Vec<u64> {
            self.tables
                .movement_equipment
                .iter()
                .filter(|r| r.movement_id == movement_id)
                .map(|r| r.equipment_id)
                .collect()
        }

        /// Base categories of a category.
        pub fn bases_of_category(&self, category_id: u64) -> Vec<BaseCategory> {
            self.tables
                .category_bases
                .iter()
                .filter(|r| r.category_id == category_id)
                .map(|r| r.base)
                .collect()
        }
    };
}

impl<'a> Snapshot<'a> {
    snapshot_reads!();
}

macro_rules! soft_delete {
    ($fn_name:ident, $table:ident, $kind:expr) => {
        /// Tombstones the row in place, keeping it for sync and history.
        pub fn $fn_name(&mut self, guid: StableId) -> StoreResult<()> {
            let audit = self.stamp();
            let row = self
                .tables
                .$table
                .values_mut()
                .find(|r| r.guid == guid)
                .ok_or(StoreError::NotFound {
                    kind: $kind,
                    id: guid,
                })?;
            row.audit = Audit {
                is_deleted: true,
                authority: row.audit.authority,
                ..audit
            };
            self.changes.push(TrackedChange {
                kind: $kind,
                stable_id: guid,
                state: ChangeState::Deleted,
            });
            Ok(())
        }
    };
}

/// An in-flight transaction over a snapshot of the tables.
pub struct Transaction<'a> {
    tables: Tables,
    actor: &'a str,
    now: DateTime<Utc>,
    commit_id: u64,
    changes: Vec<TrackedChange>,
}

impl<'a> Transaction<'a> {
    /// The actor this transaction is attributed to.
    pub fn actor(&self) -> &str {
        self.actor
    }

    /// Transaction wall-clock time; every stamp in this transaction uses
    /// it.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Identifier of the pending commit.
    pub fn commit_id(&self) -> u64 {
        self.commit_id
    }

    /// Entity-level changes recorded so far, in write order.
    pub fn tracked_changes(&self) -> &[TrackedChange] {
        &self.changes
    }

    /// Allocates a fresh local row id.
    pub fn next_row_id(&mut self) -> u64 {
        let id = self.tables.next_row_id;
        self.tables.next_row_id += 1;
        id
    }

    /// Produces audit columns stamped with the transaction clock and the
    /// next write sequence.
    pub fn stamp(&mut self) -> Audit {
        let seq = self.tables.next_seq;
        self.tables.next_seq += 1;
        Audit {
            updated_at_utc: self.now,
            updated_seq: seq,
            is_deleted: false,
            authority: Default::default(),
        }
    }

    fn record(&mut self, kind: EntityKind, stable_id: StableId, existed: bool, deleted: bool) {
        let state = if deleted {
            ChangeState::Deleted
        } else if existed {
            ChangeState::Modified
        } else {
            ChangeState::Added
        };
        self.changes.push(TrackedChange {
            kind,
            stable_id,
            state,
        });
    }

    /// Inserts or overwrites a descriptor row, keyed by stable id.
    pub fn put_descriptor(&mut self, row: DescriptorRow) {
        let existed = self
            .tables
            .descriptors
            .values()
            .any(|r| r.guid == row.guid);
        self.record(
            EntityKind::Descriptor,
            row.guid,
            existed,
            row.audit.is_deleted,
        );
        self.tables.descriptors.insert(row.id, row);
    }

    /// Inserts or overwrites an equipment row, keyed by stable id.
    pub fn put_equipment(&mut self, row: EquipmentRow) {
        let existed = self.tables.equipment.values().any(|r| r.guid == row.guid);
        self.record(
            EntityKind::Equipment,
            row.guid,
            existed,
            row.audit.is_deleted,
        );
        self.tables.equipment.insert(row.id, row);
    }

    /// Inserts or overwrites a muscle row, keyed by stable id.
    pub fn put_muscle(&mut self, row: MuscleRow) {
        let existed = self.tables.muscles.values().any(|r| r.guid == row.guid);
        self.record(EntityKind::Muscle, row.guid, existed, row.audit.is_deleted);
        self.tables.muscles.insert(row.id, row);
    }

    /// Inserts or overwrites a category row, keyed by stable id.
    pub fn put_category(&mut self, row: MovementCategoryRow) {
        let existed = self.tables.categories.values().any(|r| r.guid == row.guid);
        self.record(
            EntityKind::MovementCategory,
            row.guid,
            existed,
            row.audit.is_deleted,
        );
        self.tables.categories.insert(row.id, row);
    }

    /// Inserts or overwrites a movement row, keyed by stable id.
    pub fn put_movement(&mut self, row: MovementRow) {
        let existed = self.tables.movements.values().any(|r| r.guid == row.guid);
        self.record(
            EntityKind::Movement,
            row.guid,
            existed,
            row.audit.is_deleted,
        );
        self.tables.movements.insert(row.id, row);
    }

    soft_delete!(soft_delete_descriptor, descriptors, EntityKind::Descriptor);
    soft_delete!(soft_delete_equipment, equipment, EntityKind::Equipment);
    soft_delete!(soft_delete_muscle, muscles, EntityKind::Muscle);
    soft_delete!(soft_delete_category, categories, EntityKind::MovementCategory);
    soft_delete!(soft_delete_movement, movements, EntityKind::Movement);

    /// Adds an antagonist link if not already present.
    pub fn link_antagonist(&mut self, muscle_id: u64, antagonist_id: u64) {
        let row = MuscleAntagonistRow {
            muscle_id,
            antagonist_id,
        };
        if !self.tables.muscle_antagonists.contains(&row) {
            self.tables.muscle_antagonists.push(row);
        }
    }

    /// Removes an antagonist link.
    pub fn unlink_antagonist(&mut self, muscle_id: u64, antagonist_id: u64) {
        self.tables
            .muscle_antagonists
            .retain(|r| !(r.muscle_id == muscle_id && r.antagonist_id == antagonist_id));
    }

    /// Adds a movement-muscle link if not already present, updating the
    /// role when the pair already exists under a different role.
    pub fn link_movement_muscle(&mut self, movement_id: u64, muscle_id: u64, role: MuscleRole) {
        if let Some(existing) = self
            .tables
            .movement_muscles
            .iter_mut()
            .find(|r| r.movement_id == movement_id && r.muscle_id == muscle_id)
        {
            existing.role = role;
            return;
        }
        self.tables.movement_muscles.push(MovementMuscleRow {
            movement_id,
            muscle_id,
            role,
        });
    }

    /// Removes a movement-muscle link.
    pub fn unlink_movement_muscle(&mut self, movement_id: u64, muscle_id: u64) {
        self.tables
            .movement_muscles
            .retain(|r| !(r.movement_id == movement_id && r.muscle_id == muscle_id));
    }

    /// Adds a movement-equipment link if not already present.
    pub fn link_movement_equipment(&mut self, movement_id: u64, equipment_id: u64) {
        let row = MovementEquipmentRow {
            movement_id,
            equipment_id,
        };
        if !self.tables.movement_equipment.contains(&row) {
            self.tables.movement_equipment.push(row);
        }
    }

    /// Removes a movement-equipment link.
    pub fn unlink_movement_equipment(&mut self, movement_id: u64, equipment_id: u64) {
        self.tables
            .movement_equipment
            .retain(|r| !(r.movement_id == movement_id && r.equipment_id == equipment_id));
    }

    /// Replaces the base-category set of a category.
    pub fn set_category_bases(&mut self, category_id: u64, bases: Vec<BaseCategory>) {
        self.tables
            .category_bases
            .retain(|r| r.category_id != category_id);
        for base in bases {
            let row = CategoryBaseRow { category_id, base };
            if !self.tables.category_bases.contains(&row) {
                self.tables.category_bases.push(row);
            }
        }
    }

    /// Appends an outbox row with the transaction timestamp.
    pub fn append_outbox(
        &mut self,
        entity_kind: EntityKind,
        entity_id: StableId,
        change: ChangeKind,
        payload: serde_json::Value,
    ) {
        let id = self.tables.next_outbox_id;
        self.tables.next_outbox_id += 1;
        let occurred_at = self.now;
        self.tables.outbox.push(OutboxRow {
            id,
            entity_kind,
            entity_id,
            change,
            payload,
            occurred_at,
            sent: false,
        });
    }
}

impl<'a> Transaction<'a> {
    snapshot_reads!();
}
