//! Remote transport abstraction.

use crate::error::{SyncError, SyncResult};
use liftlog_domain::EntityKind;
use liftlog_sync_protocol::{PullPage, PushBatch, PushReceipt};

/// The sync engine's view of the remote endpoint.
///
/// Pull and push are both per entity kind; the server exposes one route
/// per kind and the engine walks kinds in dependency order.
pub trait RemoteTransport: Send + Sync {
    /// Returns true when the remote endpoint is reachable. A cheap probe;
    /// callers short-circuit work while offline.
    fn is_online(&self) -> bool;

    /// Fetches one page of records strictly after `cursor`, ascending,
    /// at most `take` items.
    fn pull(
        &self,
        kind: EntityKind,
        cursor: liftlog_sync_protocol::SyncCursor,
        take: usize,
    ) -> SyncResult<PullPage>;

    /// Pushes a batch of outbox snapshots for one kind and returns the
    /// per-item receipt.
    fn push(&self, kind: EntityKind, batch: &PushBatch) -> SyncResult<PushReceipt>;
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for std::sync::Arc<T> {
    fn is_online(&self) -> bool {
        self.as_ref().is_online()
    }

    fn pull(
        &self,
        kind: EntityKind,
        cursor: liftlog_sync_protocol::SyncCursor,
        take: usize,
    ) -> SyncResult<PullPage> {
        self.as_ref().pull(kind, cursor, take)
    }

    fn push(&self, kind: EntityKind, batch: &PushBatch) -> SyncResult<PushReceipt> {
        self.as_ref().push(kind, batch)
    }
}

/// Scripted transport for tests.
#[derive(Default)]
pub struct MockTransport {
    online: std::sync::atomic::AtomicBool,
    pull_queues: parking_lot::Mutex<std::collections::HashMap<EntityKind, std::collections::VecDeque<PullPage>>>,
    push_queue: parking_lot::Mutex<std::collections::VecDeque<PushReceipt>>,
    fail_next: parking_lot::Mutex<Option<SyncError>>,
    pulls: parking_lot::Mutex<Vec<(EntityKind, liftlog_sync_protocol::SyncCursor, usize)>>,
    pushes: parking_lot::Mutex<Vec<(EntityKind, PushBatch)>>,
}

impl MockTransport {
    /// Creates an online mock with no scripted responses.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.set_online(true);
        mock
    }

    /// Sets the reachability probe result.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, std::sync::atomic::Ordering::SeqCst);
    }

    /// Queues a pull page for the given kind. Unqueued kinds serve an
    /// empty final page.
    pub fn enqueue_pull(&self, kind: EntityKind, page: PullPage) {
        self.pull_queues.lock().entry(kind).or_default().push_back(page);
    }

    /// Queues a push receipt.
    pub fn enqueue_push(&self, receipt: PushReceipt) {
        self.push_queue.lock().push_back(receipt);
    }

    /// Makes the next pull or push fail with the given error.
    pub fn fail_next_with(&self, err: SyncError) {
        *self.fail_next.lock() = Some(err);
    }

    /// Pull requests observed so far.
    pub fn pulls(&self) -> Vec<(EntityKind, liftlog_sync_protocol::SyncCursor, usize)> {
        self.pulls.lock().clone()
    }

    /// Push batches observed so far.
    pub fn pushes(&self) -> Vec<(EntityKind, PushBatch)> {
        self.pushes.lock().clone()
    }

    fn take_failure(&self) -> Option<SyncError> {
        self.fail_next.lock().take()
    }
}

impl RemoteTransport for MockTransport {
    fn is_online(&self) -> bool {
        self.online.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn pull(
        &self,
        kind: EntityKind,
        cursor: liftlog_sync_protocol::SyncCursor,
        take: usize,
    ) -> SyncResult<PullPage> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.pulls.lock().push((kind, cursor, take));
        let page = self
            .pull_queues
            .lock()
            .get_mut(&kind)
            .and_then(|q| q.pop_front());
        Ok(page.unwrap_or(PullPage {
            server_time: chrono::Utc::now(),
            next: None,
            items: Vec::new(),
        }))
    }

    fn push(&self, kind: EntityKind, batch: &PushBatch) -> SyncResult<PushReceipt> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.pushes.lock().push((kind, batch.clone()));
        self.push_queue
            .lock()
            .pop_front()
            .ok_or_else(|| SyncError::Protocol("no scripted push receipt".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftlog_sync_protocol::SyncCursor;

    #[test]
    fn unqueued_pull_serves_final_empty_page() {
        let mock = MockTransport::new();
        let page = mock
            .pull(EntityKind::Muscle, SyncCursor::MIN, 100)
            .unwrap();
        assert!(page.next.is_none());
        assert!(page.items.is_empty());
        assert_eq!(mock.pulls().len(), 1);
    }

    #[test]
    fn scripted_failure_fires_once() {
        let mock = MockTransport::new();
        mock.fail_next_with(SyncError::Offline);
        assert!(matches!(
            mock.pull(EntityKind::Muscle, SyncCursor::MIN, 100),
            Err(SyncError::Offline)
        ));
        assert!(mock.pull(EntityKind::Muscle, SyncCursor::MIN, 100).is_ok());
    }
}
