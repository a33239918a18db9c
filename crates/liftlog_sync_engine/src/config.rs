//! Configuration for the sync engine.

use std::time::Duration;

/// Largest page size the server will honor.
pub const MAX_PAGE_SIZE: usize = 500;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL, without a trailing slash.
    pub server_url: String,
    /// Requested pull page size; clamped to `1..=MAX_PAGE_SIZE` at use.
    pub page_size: usize,
    /// Maximum outbox rows taken per dispatch run.
    pub dispatch_batch_size: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> Self {
        let mut server_url = server_url.into();
        while server_url.ends_with('/') {
            server_url.pop();
        }
        Self {
            server_url,
            page_size: 200,
            dispatch_batch_size: 100,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the pull page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the outbox dispatch batch size.
    pub fn with_dispatch_batch_size(mut self, size: usize) -> Self {
        self.dispatch_batch_size = size;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Effective pull page size, clamped to the server's accepted range.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
