//! Store error type.

use liftlog_domain::{EntityKind, StableId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Stable id of the missing entity.
        id: StableId,
    },

    /// A commit observer rejected the transaction.
    #[error("commit rejected: {0}")]
    CommitRejected(String),

    /// An outbox payload snapshot could not be serialized.
    #[error("outbox payload: {0}")]
    Payload(#[from] serde_json::Error),
}
