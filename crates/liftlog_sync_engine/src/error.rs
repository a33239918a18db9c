//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote endpoint is unreachable.
    #[error("remote endpoint unreachable")]
    Offline,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("http {status} from {url}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// A wire body could not be serialized or parsed.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Local store error during apply or dispatch.
    #[error("store error: {0}")]
    Store(#[from] liftlog_store::StoreError),

    /// The remote violated the sync protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Cursor file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline => true,
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
