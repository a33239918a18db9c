//! # LiftLog Sync Engine
//!
//! Bidirectional synchronization between the local LiftLog store and a
//! remote server.
//!
//! This crate provides:
//! - [`OutboxRecorder`]: captures local mutations into the outbox at
//!   commit time
//! - [`OutboxDispatcher`]: delivers outbox rows and settles them against
//!   per-item server verdicts
//! - [`RemoteTransport`] with an HTTP implementation over a pluggable
//!   [`HttpClient`]
//! - Per-kind [`processor`]s that apply pulled envelopes idempotently
//! - [`SyncOrchestrator`]: seed and incremental sync in dependency-rank
//!   order with durable per-kind cursors
//!
//! The engine is synchronous and single-threaded per run; long
//! operations poll a [`CancelToken`] at page and batch boundaries.
//! Callers wanting background sync run it on their own thread.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod cursor_store;
mod dispatcher;
mod error;
mod http;
mod orchestrator;
pub mod processor;
mod recorder;
mod snapshot;
mod transport;

pub use cancel::CancelToken;
pub use config::{SyncConfig, MAX_PAGE_SIZE};
pub use cursor_store::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use dispatcher::{DispatchOutcome, OutboxDispatcher};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use orchestrator::{DeltaOutcome, KindStats, SeedOutcome, SyncOrchestrator, SyncOutcome};
pub use recorder::OutboxRecorder;
pub use transport::{MockTransport, RemoteTransport};
