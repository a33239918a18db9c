//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, ureq, platform webviews, etc.). Wire bodies
//! are JSON; each entity kind has its own route under `/sync/`.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use chrono::SecondsFormat;
use liftlog_domain::EntityKind;
use liftlog_sync_protocol::{
    DescriptorEnvelope, EquipmentEnvelope, MovementCategoryEnvelope, MovementEnvelope,
    MuscleEnvelope, PullPage, PushBatch, PushReceipt, RawPage, SyncCursor, SyncEnvelope,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// An HTTP response reduced to what the transport needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP stack. Errors are
/// connection-level failures; non-success statuses come back as normal
/// responses.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: String) -> Result<HttpResponse, String>;
}

/// HTTP-based remote transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    reachable: AtomicBool,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against the given base URL.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client,
            reachable: AtomicBool::new(true),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json(&self, url: &str) -> SyncResult<String> {
        let response = self.client.get(url).map_err(|e| {
            self.reachable.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;
        self.reachable.store(true, Ordering::SeqCst);
        if !(200..300).contains(&response.status) {
            return Err(SyncError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response.body)
    }

    fn post_json(&self, url: &str, body: String) -> SyncResult<String> {
        let response = self.client.post(url, body).map_err(|e| {
            self.reachable.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;
        self.reachable.store(true, Ordering::SeqCst);
        if !(200..300).contains(&response.status) {
            return Err(SyncError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response.body)
    }

    fn pull_url(&self, kind: EntityKind, cursor: SyncCursor, take: usize) -> String {
        format!(
            "{}/sync/{}?ts={}&seq={}&take={}",
            self.base_url,
            kind.route_segment(),
            encode_ts(cursor),
            cursor.seq,
            take
        )
    }
}

/// Encodes the cursor timestamp for a query string. RFC 3339 with a `Z`
/// suffix, colons percent-encoded.
fn encode_ts(cursor: SyncCursor) -> String {
    cursor
        .ts
        .to_rfc3339_opts(SecondsFormat::Micros, true)
        .replace(':', "%3A")
        .replace('+', "%2B")
}

fn widen_page(kind: EntityKind, body: &str) -> SyncResult<PullPage> {
    let page = match kind {
        EntityKind::Descriptor => {
            serde_json::from_str::<RawPage<DescriptorEnvelope>>(body)?.map(SyncEnvelope::Descriptor)
        }
        EntityKind::MovementCategory => {
            serde_json::from_str::<RawPage<MovementCategoryEnvelope>>(body)?
                .map(SyncEnvelope::MovementCategory)
        }
        EntityKind::Muscle => {
            serde_json::from_str::<RawPage<MuscleEnvelope>>(body)?.map(SyncEnvelope::Muscle)
        }
        EntityKind::Equipment => {
            serde_json::from_str::<RawPage<EquipmentEnvelope>>(body)?.map(SyncEnvelope::Equipment)
        }
        EntityKind::Movement => {
            serde_json::from_str::<RawPage<MovementEnvelope>>(body)?.map(SyncEnvelope::Movement)
        }
        EntityKind::Unidentified => {
            return Err(SyncError::Protocol("cannot pull unidentified kind".into()));
        }
    };
    Ok(page)
}

impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    fn is_online(&self) -> bool {
        match self.client.get(&format!("{}/sync/health", self.base_url)) {
            Ok(response) => {
                let ok = (200..300).contains(&response.status);
                self.reachable.store(ok, Ordering::SeqCst);
                ok
            }
            Err(_) => {
                self.reachable.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn pull(&self, kind: EntityKind, cursor: SyncCursor, take: usize) -> SyncResult<PullPage> {
        let url = self.pull_url(kind, cursor, take);
        let body = self.get_json(&url)?;
        widen_page(kind, &body)
    }

    fn push(&self, kind: EntityKind, batch: &PushBatch) -> SyncResult<PushReceipt> {
        let url = format!("{}/sync/{}", self.base_url, kind.route_segment());
        let body = serde_json::to_string(batch)?;
        let response = self.post_json(&url, body)?;
        Ok(serde_json::from_str(&response)?)
    }
}
