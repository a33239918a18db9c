//! # LiftLog Domain
//!
//! Shared domain types for the LiftLog offline-first fitness platform.
//!
//! This crate provides:
//! - `EntityKind` — the closed set of synchronizable entity kinds and their
//!   dependency ranks
//! - `StableId` — the 128-bit identifier shared between client and server
//! - Authority, body-section, category, and muscle-role enumerations
//! - A `Clock` abstraction so components never read ambient wall-clock time
//!
//! This is a pure type crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod id;
mod kind;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id::StableId;
pub use kind::{EntityKind, SYNC_ORDER};
pub use types::{Authority, BaseCategory, BodySection, MuscleRole};
