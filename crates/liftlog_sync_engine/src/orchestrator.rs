//! Sync orchestrator.
//!
//! Walks entity kinds in dependency-rank order, pulling pages and
//! applying them through the processor table, and drives outbox delivery
//! the other way. The per-kind cursor is saved only after its page has
//! been applied, so a crash mid-run resumes by re-pulling at most one
//! page, which the idempotent apply path absorbs.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::cursor_store::CursorStore;
use crate::dispatcher::{DispatchOutcome, OutboxDispatcher};
use crate::error::{SyncError, SyncResult};
use crate::processor::ProcessorSet;
use crate::transport::RemoteTransport;
use liftlog_domain::{Clock, EntityKind, SystemClock, SYNC_ORDER};
use liftlog_store::{Store, SYNC_ACTOR};
use liftlog_sync_protocol::{Envelope, SyncCursor, SyncEnvelope};
use std::sync::Arc;

/// Per-kind counters from a pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Pages fetched.
    pub pages: usize,
    /// Envelopes received.
    pub pulled: usize,
    /// Envelopes that changed local state.
    pub applied: usize,
    /// Relationship references deferred for a later re-apply.
    pub deferred: usize,
}

impl KindStats {
    fn absorb(&mut self, other: KindStats) {
        self.pages += other.pages;
        self.pulled += other.pulled;
        self.applied += other.applied;
        self.deferred += other.deferred;
    }
}

/// Outcome of an initial seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    /// Aggregate pull counters.
    pub stats: KindStats,
    /// Kinds skipped because they already had a cursor.
    pub already_seeded: usize,
    /// Kinds whose pull failed this run; the rest still completed.
    pub failed_kinds: Vec<EntityKind>,
}

/// Outcome of an incremental pull across all kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// Aggregate pull counters.
    pub stats: KindStats,
    /// Kinds whose pull failed this run; the rest still completed.
    pub failed_kinds: Vec<EntityKind>,
}

/// Outcome of a full bidirectional sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Outbox delivery counters.
    pub up: DispatchOutcome,
    /// Pull counters.
    pub down: DeltaOutcome,
}

/// Drives bidirectional sync against one remote endpoint.
pub struct SyncOrchestrator<T: RemoteTransport, S: CursorStore> {
    store: Arc<Store>,
    transport: T,
    cursors: S,
    processors: ProcessorSet,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl<T: RemoteTransport, S: CursorStore> SyncOrchestrator<T, S> {
    /// Creates an orchestrator with the default processor table and the
    /// system clock.
    pub fn new(store: Arc<Store>, transport: T, cursors: S, config: SyncConfig) -> Self {
        Self {
            store,
            transport,
            cursors,
            processors: ProcessorSet::defaults(),
            config,
            clock: Arc::new(SystemClock),
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the processor table.
    pub fn with_processors(mut self, processors: ProcessorSet) -> Self {
        self.processors = processors;
        self
    }

    /// Token for cancelling an in-flight run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The local store this orchestrator syncs.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The cursor store backing resumable pulls.
    pub fn cursors(&self) -> &S {
        &self.cursors
    }

    /// Initial full pull. Kinds that already have a cursor are left
    /// alone, so an interrupted seed can simply be called again. A kind
    /// whose pull fails is logged and skipped like in
    /// [`pull_deltas`](Self::pull_deltas); placeholder descriptors and
    /// deferred links keep an out-of-order seed safe.
    pub fn seed(&self) -> SyncResult<SeedOutcome> {
        let mut outcome = SeedOutcome::default();
        for &kind in &SYNC_ORDER {
            if self.cursors.load(kind)?.is_some() {
                tracing::debug!(kind = %kind, "already seeded, skipping");
                outcome.already_seeded += 1;
                continue;
            }
            match self.pull_kind(kind) {
                Ok(stats) => outcome.stats.absorb(stats),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "seed pull failed, continuing with next kind");
                    outcome.failed_kinds.push(kind);
                }
            }
        }
        tracing::info!(pulled = outcome.stats.pulled, applied = outcome.stats.applied,
            "seed complete");
        Ok(outcome)
    }

    /// Incremental pull across all kinds in dependency order. A failing
    /// kind is logged and skipped so one bad endpoint does not starve the
    /// rest; cancellation still aborts the whole run.
    pub fn pull_deltas(&self) -> SyncResult<DeltaOutcome> {
        let mut outcome = DeltaOutcome::default();
        for &kind in &SYNC_ORDER {
            match self.pull_kind(kind) {
                Ok(stats) => outcome.stats.absorb(stats),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "pull failed, continuing with next kind");
                    outcome.failed_kinds.push(kind);
                }
            }
        }
        Ok(outcome)
    }

    /// Incremental pull; the downstream half of [`sync`](Self::sync).
    pub fn sync_down(&self) -> SyncResult<DeltaOutcome> {
        self.pull_deltas()
    }

    /// Delivers pending outbox rows.
    pub fn sync_up(&self) -> SyncResult<DispatchOutcome> {
        OutboxDispatcher::new(&self.store, &self.transport, self.config.dispatch_batch_size)
            .dispatch(self.clock.now())
    }

    /// Full bidirectional sync: push local changes, then pull remote
    /// ones.
    pub fn sync(&self) -> SyncResult<SyncOutcome> {
        let up = self.sync_up()?;
        let down = self.pull_deltas()?;
        Ok(SyncOutcome { up, down })
    }

    fn pull_kind(&self, kind: EntityKind) -> SyncResult<KindStats> {
        let mut stats = KindStats::default();
        let mut cursor = self.cursors.load(kind)?.unwrap_or(SyncCursor::MIN);

        loop {
            self.cancel.checkpoint()?;
            let page = self
                .transport
                .pull(kind, cursor, self.config.effective_page_size())?;
            stats.pages += 1;
            stats.pulled += page.items.len();

            let (applied, deferred) = self.apply_page(kind, &page.items)?;
            stats.applied += applied;
            stats.deferred += deferred;

            // Advance past this page: the server's next cursor, or the
            // stamp of the last item on a final page. Never regress.
            let advanced = page.next.or_else(|| {
                page.items
                    .iter()
                    .map(|e| SyncCursor::new(e.updated_at(), e.updated_seq()))
                    .max()
            });
            let mut moved = false;
            if let Some(next) = advanced {
                if next > cursor {
                    self.cursors.save(kind, next)?;
                    cursor = next;
                    moved = true;
                }
            }

            if page.next.is_none() {
                break;
            }
            if !moved {
                // A continuation that does not move the cursor would
                // re-fetch the same page forever.
                tracing::warn!(kind = %kind, cursor = %cursor,
                    "server continuation did not advance the cursor, stopping pull");
                break;
            }
        }

        tracing::debug!(kind = %kind, pages = stats.pages, pulled = stats.pulled,
            applied = stats.applied, deferred = stats.deferred, "pull complete");
        Ok(stats)
    }

    fn apply_page(&self, kind: EntityKind, items: &[SyncEnvelope]) -> SyncResult<(usize, usize)> {
        if items.is_empty() {
            return Ok((0, 0));
        }
        let result = self.store.transaction(SYNC_ACTOR, |txn| {
            let mut applied = 0;
            let mut deferred = 0;
            for envelope in items {
                if envelope.kind() != kind {
                    tracing::warn!(expected = %kind, got = %envelope.kind(),
                        "page item of unexpected kind, skipping");
                    continue;
                }
                let Some(processor) = self.processors.get(envelope.kind()) else {
                    tracing::warn!(kind = %envelope.kind(), "no processor registered, skipping");
                    continue;
                };
                let outcome = processor.apply(txn, envelope)?;
                if outcome.applied {
                    applied += 1;
                }
                deferred += outcome.deferred_refs;
            }
            Ok((applied, deferred))
        })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_store::MemoryCursorStore;
    use crate::transport::MockTransport;
    use chrono::{TimeZone, Utc};
    use liftlog_domain::{Authority, BodySection, FixedClock, StableId};
    use liftlog_sync_protocol::{MuscleEnvelope, PullPage};

    fn muscle_env(guid: StableId, secs: i64, seq: i64) -> SyncEnvelope {
        SyncEnvelope::Muscle(MuscleEnvelope {
            guid,
            name: "Muscle".into(),
            descriptor_guid: None,
            body_section: BodySection::UpperBody,
            antagonist_guids: None,
            updated_at_utc: Utc.timestamp_opt(secs, 0).unwrap(),
            updated_seq: seq,
            is_deleted: false,
            authority: Authority::Bidirectional,
        })
    }

    fn page(items: Vec<SyncEnvelope>, next: Option<SyncCursor>) -> PullPage {
        PullPage {
            server_time: Utc::now(),
            next,
            items,
        }
    }

    fn orchestrator(
        transport: MockTransport,
    ) -> SyncOrchestrator<MockTransport, MemoryCursorStore> {
        SyncOrchestrator::new(
            Arc::new(Store::with_clock(Arc::new(FixedClock::at_unix(
                1_700_000_000,
            )))),
            transport,
            MemoryCursorStore::new(),
            SyncConfig::new("http://server"),
        )
        .with_clock(Arc::new(FixedClock::at_unix(1_700_000_000)))
    }

    #[test]
    fn pull_paginates_and_saves_cursor_per_page() {
        let transport = MockTransport::new();
        let a = StableId::from_bytes([1; 16]);
        let b = StableId::from_bytes([2; 16]);
        let mid = SyncCursor::at_unix(100, 1);
        transport.enqueue_pull(
            EntityKind::Muscle,
            page(vec![muscle_env(a, 100, 1)], Some(mid)),
        );
        transport.enqueue_pull(EntityKind::Muscle, page(vec![muscle_env(b, 100, 2)], None));

        let orch = orchestrator(transport);
        let stats = orch.pull_kind(EntityKind::Muscle).unwrap();

        assert_eq!(stats.pages, 2);
        assert_eq!(stats.pulled, 2);
        assert_eq!(stats.applied, 2);
        assert_eq!(
            orch.cursors.load(EntityKind::Muscle).unwrap(),
            Some(SyncCursor::at_unix(100, 2))
        );
        // Second request resumed from the first page's cursor.
        assert_eq!(orch.transport.pulls()[1].1, mid);
    }

    #[test]
    fn cursor_never_regresses() {
        let transport = MockTransport::new();
        let orch = orchestrator(transport);
        let saved = SyncCursor::at_unix(200, 5);
        orch.cursors.save(EntityKind::Muscle, saved).unwrap();

        // Final page carrying only older items must not move the cursor
        // backwards.
        orch.transport.enqueue_pull(
            EntityKind::Muscle,
            page(vec![muscle_env(StableId::new(), 100, 1)], None),
        );
        orch.pull_kind(EntityKind::Muscle).unwrap();

        assert_eq!(orch.cursors.load(EntityKind::Muscle).unwrap(), Some(saved));
    }

    #[test]
    fn seed_skips_kinds_with_cursors() {
        let transport = MockTransport::new();
        let orch = orchestrator(transport);
        orch.cursors
            .save(EntityKind::Descriptor, SyncCursor::at_unix(100, 1))
            .unwrap();

        let outcome = orch.seed().unwrap();
        assert_eq!(outcome.already_seeded, 1);
        // The other four kinds were pulled.
        assert_eq!(orch.transport.pulls().len(), 4);
    }

    #[test]
    fn seed_continues_past_a_failing_kind() {
        let transport = MockTransport::new();
        transport.fail_next_with(SyncError::transport_retryable("connection reset"));
        transport.enqueue_pull(
            EntityKind::Muscle,
            page(vec![muscle_env(StableId::new(), 100, 1)], None),
        );

        let orch = orchestrator(transport);
        let outcome = orch.seed().unwrap();

        assert_eq!(outcome.failed_kinds, vec![EntityKind::Descriptor]);
        assert_eq!(outcome.stats.applied, 1);
        assert_eq!(orch.transport.pulls().len(), 4);
    }

    #[test]
    fn non_advancing_continuation_stops_the_pull() {
        let transport = MockTransport::new();
        let stamp = SyncCursor::at_unix(100, 1);
        // A broken server handing back the same continuation cursor on
        // every page must not keep the pull spinning.
        transport.enqueue_pull(
            EntityKind::Muscle,
            page(vec![muscle_env(StableId::new(), 100, 1)], Some(stamp)),
        );
        transport.enqueue_pull(
            EntityKind::Muscle,
            page(vec![muscle_env(StableId::new(), 100, 1)], Some(stamp)),
        );

        let orch = orchestrator(transport);
        let stats = orch.pull_kind(EntityKind::Muscle).unwrap();

        assert_eq!(stats.pages, 2);
        assert_eq!(orch.transport.pulls().len(), 2);
        assert_eq!(orch.cursors.load(EntityKind::Muscle).unwrap(), Some(stamp));
    }

    #[test]
    fn kinds_pull_in_dependency_order() {
        let transport = MockTransport::new();
        let orch = orchestrator(transport);
        orch.pull_deltas().unwrap();

        let kinds: Vec<EntityKind> = orch.transport.pulls().iter().map(|(k, _, _)| *k).collect();
        assert_eq!(kinds, SYNC_ORDER.to_vec());
    }

    #[test]
    fn failing_kind_does_not_starve_the_rest() {
        let transport = MockTransport::new();
        transport.fail_next_with(SyncError::transport_retryable("connection reset"));

        let orch = orchestrator(transport);
        let outcome = orch.pull_deltas().unwrap();

        assert_eq!(outcome.failed_kinds, vec![EntityKind::Descriptor]);
        assert_eq!(orch.transport.pulls().len(), 4);
    }

    #[test]
    fn cancellation_aborts_the_run() {
        let transport = MockTransport::new();
        let orch = orchestrator(transport);
        orch.cancel_token().cancel();

        assert!(matches!(orch.pull_deltas(), Err(SyncError::Cancelled)));
        assert!(orch.transport.pulls().is_empty());
    }
}
