//! # LiftLog Sync Protocol
//!
//! Wire types for the LiftLog sync API.
//!
//! This crate provides:
//! - Per-entity sync envelopes and the tagged [`SyncEnvelope`] union
//! - The `(ts, seq)` [`SyncCursor`] used for resumable pagination
//! - Pull pages, push batches, and per-item push receipts
//!
//! This is a pure protocol crate with no I/O. Wire bodies are JSON with
//! PascalCase field names.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod envelope;
mod page;

pub use cursor::SyncCursor;
pub use envelope::{
    DescriptorEnvelope, Envelope, EquipmentEnvelope, MovementCategoryEnvelope, MovementEnvelope,
    MuscleEnvelope, SyncEnvelope,
};
pub use page::{PullPage, PushBatch, PushItemReceipt, PushReceipt, PushVerdict, RawPage};
