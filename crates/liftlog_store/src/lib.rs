//! # LiftLog Store
//!
//! Embedded local store for the LiftLog client.
//!
//! This crate provides:
//! - Typed in-memory tables with local row ids and stable-id lookups
//! - Snapshot transactions with all-or-nothing commit
//! - [`CommitObserver`] hooks that run before non-sync commits
//! - The outbox table feeding the sync engine
//!
//! Writes are attributed to an actor name; transactions opened by
//! [`SYNC_ACTOR`] skip observers so remotely applied changes never echo
//! back into the outbox.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod outbox;
mod rows;
mod store;

pub use error::{StoreError, StoreResult};
pub use outbox::{ChangeKind, OutboxRow};
pub use rows::{
    Audit, CategoryBaseRow, DescriptorRow, EquipmentRow, MovementCategoryRow,
    MovementEquipmentRow, MovementMuscleRow, MovementRow, MuscleAntagonistRow, MuscleRow,
};
pub use store::{
    ChangeState, CommitObserver, Snapshot, Store, TrackedChange, Transaction, SYNC_ACTOR,
};
