//! The notification session tying store, counter, backend and watchers together.

use crate::backend::Backend;
use crate::error::{Result, SyncError};
use crate::feed::{millis, EventOp, NotificationEvent, ReconnectPolicy};
use crate::records::{unread_delta, RecordStore, UnreadCounter};
use crate::types::{MutationKind, NotificationId, NotificationRecord, OwnerId, SyncStats};
use crate::watch::{WatchConfig, WatchHandle, WatchId, WatchManager};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default page size for bootstrap and resync fetches.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// The user whose notifications are mirrored.
    pub owner: OwnerId,

    /// Max records fetched by bootstrap and resync.
    pub page_size: usize,

    /// How long one pipeline poll waits for a feed message.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Backoff between failed subscribe attempts.
    pub reconnect: ReconnectPolicy,

    /// Refetch after every reconnect of the pipeline.
    pub resync_on_reconnect: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            owner: OwnerId::default(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: Duration::from_millis(100),
            reconnect: ReconnectPolicy::default(),
            resync_on_reconnect: true,
        }
    }
}

impl SyncConfig {
    pub fn for_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: OwnerId::new(owner),
            ..Default::default()
        }
    }
}

/// Local effect of one ingested event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// A new record entered the mirror.
    Inserted { id: NotificationId, delta: i64 },
    /// An existing record was replaced (a change, or a duplicate create).
    Replaced { id: NotificationId, delta: i64 },
    Removed { id: NotificationId, delta: i64 },
    /// The event had no effect.
    Ignored {
        id: NotificationId,
        reason: IgnoreReason,
    },
}

impl Applied {
    /// Counter change caused by this event.
    pub fn delta(&self) -> i64 {
        match self {
            Applied::Inserted { delta, .. }
            | Applied::Replaced { delta, .. }
            | Applied::Removed { delta, .. } => *delta,
            Applied::Ignored { .. } => 0,
        }
    }
}

/// Why an event was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `changed` for an id never seen.
    UnknownIdentity,
    /// `removed` for an id not (or no longer) present.
    AlreadyRemoved,
    /// The record belongs to another owner.
    ForeignOwner,
}

/// Local effect of a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The local phase changed the mirror and the backend accepted the write.
    Applied { delta: i64 },
    /// Nothing to do locally; no backend call was made.
    Noop,
}

/// Result of a bootstrap or resync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResyncSummary {
    pub records: usize,
    pub unread: u64,
    /// Fetched records rejected for a foreign owner or a repeated id.
    pub rejected: usize,
    /// Transitions applied during the fetch and re-applied on the snapshot.
    pub replayed: usize,
}

/// Consistent snapshot of the projection.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationView {
    pub records: Vec<NotificationRecord>,
    pub unread_count: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_applied: u64,
    events_ignored: u64,
    mutations_applied: u64,
    failed_writes: u64,
    resyncs: u64,
}

/// A transition as recorded for replay over a fetched snapshot.
#[derive(Clone, Debug)]
enum Transition {
    Event(NotificationEvent),
    MarkRead(NotificationId),
    MarkAllRead,
    Delete(NotificationId),
}

/// Everything a transition touches. Guarded by one lock.
struct Session {
    owner: OwnerId,
    /// Bumped on every owner switch or reset.
    epoch: u64,
    /// Bumped on every ingested event and applied mutation.
    seq: u64,
    store: RecordStore,
    counter: UnreadCounter,
    /// A backend write failed since the last resync.
    divergent: bool,
    counters: Counters,
    /// Fetches currently in flight.
    refetches: usize,
    /// Transitions recorded while `refetches > 0`, tagged with their `seq`.
    journal: Vec<(u64, Transition)>,
}

impl Session {
    fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            epoch: 1,
            seq: 0,
            store: RecordStore::new(),
            counter: UnreadCounter::new(),
            divergent: false,
            counters: Counters::default(),
            refetches: 0,
            journal: Vec::new(),
        }
    }

    fn journaling(&self) -> bool {
        self.refetches > 0
    }

    /// Count one transition, keeping it for replay if a fetch is in flight.
    fn record(&mut self, transition: Option<Transition>) {
        self.seq += 1;
        if let (true, Some(transition)) = (self.journaling(), transition) {
            self.journal.push((self.seq, transition));
        }
    }

    /// Register a fetch. Returns the `seq` it starts from.
    fn begin_refetch(&mut self) -> u64 {
        self.refetches += 1;
        self.seq
    }

    /// Unregister a fetch started at `since` and take the transitions
    /// applied after it.
    fn end_refetch(&mut self, since: u64) -> Vec<Transition> {
        self.refetches = self.refetches.saturating_sub(1);
        let replay = self
            .journal
            .iter()
            .filter(|(seq, _)| *seq > since)
            .map(|(_, transition)| transition.clone())
            .collect();
        if self.refetches == 0 {
            self.journal.clear();
        }
        replay
    }

    /// Local phase of mark-read. `None` if absent or already read.
    fn mark_read(&mut self, id: &NotificationId) -> Option<i64> {
        if self.store.get(id).map(|r| r.read) != Some(false) {
            return None;
        }
        let prior = self.store.set_read(id, true);
        let delta = unread_delta(prior, Some(true));
        self.counter.apply(delta);
        Some(delta)
    }

    /// Local phase of mark-all-read. Returns the flipped ids and the
    /// counter value before zeroing.
    fn mark_all_read(&mut self) -> (Vec<NotificationId>, u64) {
        let flipped = self.store.mark_all_read();
        let before = self.counter.get();
        if before != flipped.len() as u64 {
            self.counter.report_drift(flipped.len() as u64);
        }
        self.counter.reset(0);
        (flipped, before)
    }

    /// Local phase of delete. `None` if absent.
    fn delete(&mut self, id: &NotificationId) -> Option<i64> {
        let removed = self.store.remove(id)?;
        let delta = unread_delta(Some(removed.read), None);
        self.counter.apply(delta);
        Some(delta)
    }

    fn replay(&mut self, transition: Transition) {
        match transition {
            Transition::Event(event) => {
                self.ingest(event);
            }
            Transition::MarkRead(id) => {
                self.mark_read(&id);
            }
            Transition::MarkAllRead => {
                self.mark_all_read();
            }
            Transition::Delete(id) => {
                self.delete(&id);
            }
        }
    }

    fn ingest(&mut self, event: NotificationEvent) -> Applied {
        let NotificationEvent { op, record } = event;
        let id = record.id.clone();

        if record.owner_id != self.owner {
            warn!(id = %id, owner = %record.owner_id, "ignoring event for foreign owner");
            return Applied::Ignored {
                id,
                reason: IgnoreReason::ForeignOwner,
            };
        }

        let prior = self.store.get(&id).map(|r| r.read);

        match op {
            EventOp::Created => {
                let delta = unread_delta(prior, Some(record.read));
                self.store.upsert(record);
                self.counter.apply(delta);
                if prior.is_some() {
                    debug!(id = %id, delta, "duplicate create applied as replace");
                    Applied::Replaced { id, delta }
                } else {
                    Applied::Inserted { id, delta }
                }
            }
            EventOp::Changed => {
                if prior.is_none() {
                    warn!(id = %id, "ignoring change for unknown notification");
                    return Applied::Ignored {
                        id,
                        reason: IgnoreReason::UnknownIdentity,
                    };
                }
                let delta = unread_delta(prior, Some(record.read));
                self.store.upsert(record);
                self.counter.apply(delta);
                Applied::Replaced { id, delta }
            }
            EventOp::Removed => match self.store.remove(&id) {
                Some(removed) => {
                    let delta = unread_delta(Some(removed.read), None);
                    self.counter.apply(delta);
                    Applied::Removed { id, delta }
                }
                None => {
                    debug!(id = %id, "ignoring removal of absent notification");
                    Applied::Ignored {
                        id,
                        reason: IgnoreReason::AlreadyRemoved,
                    }
                }
            },
        }
    }

    /// Replace the whole store with a fetched page, recount by scan, then
    /// re-apply the transitions that raced the fetch.
    fn replace_all(
        &mut self,
        fetched: Vec<NotificationRecord>,
        replay: Vec<Transition>,
    ) -> ResyncSummary {
        self.store.clear();
        let mut rejected = 0;

        for record in fetched {
            if record.owner_id != self.owner {
                warn!(id = %record.id, owner = %record.owner_id, "fetch returned foreign record");
                rejected += 1;
            } else if self.store.get(&record.id).is_some() {
                warn!(id = %record.id, "fetch returned duplicate id");
                rejected += 1;
            } else {
                self.store.upsert(record);
            }
        }

        self.counter.reset(self.store.unread_scan());

        let replayed = replay.len();
        for transition in replay {
            self.replay(transition);
        }
        self.counters.resyncs += 1;

        ResyncSummary {
            records: self.store.len(),
            unread: self.counter.get(),
            rejected,
            replayed,
        }
    }

    fn clear(&mut self, owner: OwnerId) {
        self.store.clear();
        self.counter.reset(0);
        self.owner = owner;
        self.epoch += 1;
        self.divergent = false;
        self.journal.clear();
    }
}

/// A client-local mirror of one owner's notification log.
///
/// Shared as `Arc<NotificationSync<B>>` between the ingestion pipeline and
/// callers. Every transition, whether from the feed or a local mutation,
/// runs under one lock, so transitions apply whole and in the order they
/// acquire it. Backend calls are made with the lock released.
pub struct NotificationSync<B: Backend> {
    config: SyncConfig,
    backend: B,
    session: Mutex<Session>,
    watches: WatchManager,
}

impl<B: Backend> NotificationSync<B> {
    /// Create an empty session for `config.owner`. Call [`bootstrap`](Self::bootstrap) next.
    pub fn new(backend: B, config: SyncConfig) -> Self {
        let session = Session::new(config.owner.clone());
        Self {
            config,
            backend,
            session: Mutex::new(session),
            watches: WatchManager::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn owner(&self) -> OwnerId {
        self.session.lock().owner.clone()
    }

    pub(crate) fn owner_and_epoch(&self) -> (OwnerId, u64) {
        let session = self.session.lock();
        (session.owner.clone(), session.epoch)
    }

    /// True once any bootstrap or resync has completed.
    pub(crate) fn has_synced(&self) -> bool {
        self.session.lock().counters.resyncs > 0
    }

    // --- Projection ---

    /// Records in presentation order.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.session.lock().store.all().cloned().collect()
    }

    pub fn unread_count(&self) -> u64 {
        self.session.lock().counter.get()
    }

    /// Records and count read under the same lock.
    pub fn view(&self) -> NotificationView {
        let session = self.session.lock();
        NotificationView {
            records: session.store.all().cloned().collect(),
            unread_count: session.counter.get(),
        }
    }

    pub fn get(&self, id: &NotificationId) -> Option<NotificationRecord> {
        self.session.lock().store.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.session.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.lock().store.is_empty()
    }

    /// True if a backend write failed since the last resync.
    pub fn is_divergent(&self) -> bool {
        self.session.lock().divergent
    }

    pub fn stats(&self) -> SyncStats {
        let session = self.session.lock();
        SyncStats {
            record_count: session.store.len() as u64,
            unread_count: session.counter.get(),
            events_applied: session.counters.events_applied,
            events_ignored: session.counters.events_ignored,
            mutations_applied: session.counters.mutations_applied,
            failed_writes: session.counters.failed_writes,
            resyncs: session.counters.resyncs,
            counter_breaches: session.counter.breaches(),
        }
    }

    /// Compare the incremental counter with a full scan.
    pub fn verify_counter(&self) -> Result<u64> {
        let session = self.session.lock();
        let counter = session.counter.get();
        let scanned = session.store.unread_scan();
        if counter != scanned {
            return Err(SyncError::CounterDrift { counter, scanned });
        }
        Ok(counter)
    }

    // --- Watches ---

    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        self.watches.watch(config)
    }

    pub fn unwatch(&self, id: WatchId) {
        self.watches.unwatch(id);
    }

    // --- Ingestion ---

    /// Apply one feed event as a single transition.
    pub fn ingest(&self, event: NotificationEvent) -> Applied {
        let mut session = self.session.lock();
        let replay = session.journaling().then(|| Transition::Event(event.clone()));
        let applied = session.ingest(event);
        session.record(replay);

        match &applied {
            Applied::Inserted { id, .. } | Applied::Replaced { id, .. } => {
                session.counters.events_applied += 1;
                if let Some(record) = session.store.get(id) {
                    self.watches.broadcast_upserted(record);
                }
            }
            Applied::Removed { id, .. } => {
                session.counters.events_applied += 1;
                self.watches.broadcast_removed(id);
            }
            Applied::Ignored { .. } => session.counters.events_ignored += 1,
        }

        if applied.delta() != 0 {
            self.watches.broadcast_unread(session.counter.get());
        }

        applied
    }

    // --- Mutations ---

    /// Mark one notification read.
    ///
    /// Absent or already-read records are a no-op and no backend call is made.
    pub fn mark_read(&self, id: &NotificationId) -> Result<MutationOutcome> {
        let delta = {
            let mut session = self.session.lock();
            let Some(delta) = session.mark_read(id) else {
                return Ok(MutationOutcome::Noop);
            };
            session.record(Some(Transition::MarkRead(id.clone())));
            session.counters.mutations_applied += 1;
            let count = session.counter.get();

            if let Some(record) = session.store.get(id) {
                self.watches.broadcast_upserted(record);
            }
            self.watches.broadcast_unread(count);
            delta
        };

        self.authoritative(MutationKind::MarkRead, || self.backend.apply_read(id))?;
        Ok(MutationOutcome::Applied { delta })
    }

    /// Mark every mirrored notification read and zero the counter.
    ///
    /// The bulk backend call is always issued, since the authoritative log
    /// may hold unread records beyond the fetched page. If it fails, the
    /// local "all read" state stays until the next resync.
    pub fn mark_all_read(&self) -> Result<MutationOutcome> {
        let (owner, delta) = {
            let mut session = self.session.lock();
            let (flipped, before) = session.mark_all_read();
            session.record(Some(Transition::MarkAllRead));
            session.counters.mutations_applied += 1;

            for id in &flipped {
                if let Some(record) = session.store.get(id) {
                    self.watches.broadcast_upserted(record);
                }
            }
            if before != 0 {
                self.watches.broadcast_unread(0);
            }
            (session.owner.clone(), -(before as i64))
        };

        self.authoritative(MutationKind::MarkAllRead, || {
            self.backend.apply_read_all(&owner)
        })?;
        Ok(MutationOutcome::Applied { delta })
    }

    /// Delete one notification. Absent ids are a no-op.
    pub fn delete(&self, id: &NotificationId) -> Result<MutationOutcome> {
        let delta = {
            let mut session = self.session.lock();
            let Some(delta) = session.delete(id) else {
                return Ok(MutationOutcome::Noop);
            };
            session.record(Some(Transition::Delete(id.clone())));
            session.counters.mutations_applied += 1;
            let count = session.counter.get();

            self.watches.broadcast_removed(id);
            if delta != 0 {
                self.watches.broadcast_unread(count);
            }
            delta
        };

        self.authoritative(MutationKind::Delete, || self.backend.apply_delete(id))?;
        Ok(MutationOutcome::Applied { delta })
    }

    /// Run the authoritative phase of a mutation. Failure leaves the local
    /// phase in place and marks the session divergent.
    fn authoritative<F>(&self, operation: MutationKind, write: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<(), crate::error::BackendError>,
    {
        write().map_err(|source| {
            let mut session = self.session.lock();
            session.divergent = true;
            session.counters.failed_writes += 1;
            warn!(%operation, error = %source, "authoritative write failed, local state kept until resync");
            SyncError::AuthoritativeWrite { operation, source }
        })
    }

    // --- Bootstrap / Resync ---

    /// Seed the mirror from the backend of record.
    pub fn bootstrap(&self) -> Result<ResyncSummary> {
        info!(owner = %self.owner(), "bootstrapping notifications");
        self.refetch()
    }

    /// Replace the mirror with a fresh authoritative fetch and recount by scan.
    ///
    /// Events and mutations applied while the fetch is in flight are
    /// re-applied on top of the fetched page. On failure the store is left
    /// untouched.
    pub fn refetch(&self) -> Result<ResyncSummary> {
        let (owner, epoch, since, failed_before) = {
            let mut session = self.session.lock();
            let since = session.begin_refetch();
            (
                session.owner.clone(),
                session.epoch,
                since,
                session.counters.failed_writes,
            )
        };

        let fetched = self
            .backend
            .fetch_notifications(&owner, self.config.page_size);

        let mut session = self.session.lock();
        let replay = session.end_refetch(since);

        let fetched = fetched.map_err(|e| {
            warn!(owner = %owner, error = %e, "notification fetch failed");
            SyncError::Fetch(e)
        })?;
        if session.epoch != epoch {
            return Err(SyncError::SessionChanged(owner));
        }

        let summary = session.replace_all(fetched, replay);
        // A write that failed during the fetch is not covered by it.
        let failed_during = session.counters.failed_writes != failed_before;
        session.divergent = failed_during;
        debug!(
            owner = %owner,
            records = summary.records,
            unread = summary.unread,
            rejected = summary.rejected,
            replayed = summary.replayed,
            "resync complete"
        );

        self.watches
            .broadcast_resynced(summary.records, summary.unread);
        self.watches.broadcast_unread(summary.unread);
        Ok(summary)
    }

    // --- Session Lifecycle ---

    /// Tear down the session and start an empty one for `owner`.
    ///
    /// A running pipeline resubscribes for the new owner; in-flight fetches
    /// for the old owner are discarded.
    pub fn switch_owner(&self, owner: OwnerId) {
        let mut session = self.session.lock();
        info!(from = %session.owner, to = %owner, "switching notification owner");
        session.clear(owner.clone());
        self.watches.broadcast_reset(&owner);
        self.watches.broadcast_unread(0);
    }

    /// Clear the store and counter, keeping the owner.
    pub fn reset(&self) {
        let mut session = self.session.lock();
        let owner = session.owner.clone();
        session.clear(owner.clone());
        self.watches.broadcast_reset(&owner);
        self.watches.broadcast_unread(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, MemoryBackend};
    use crate::error::BackendError;
    use crate::types::{NotificationKind, Timestamp};
    use crate::watch::{SyncEvent, WatchFilter};
    use std::sync::Arc;

    fn rec(id: &str, at: i64, read: bool) -> NotificationRecord {
        NotificationRecord::new(id, OwnerId::new("u1"), NotificationKind::VaultShared, id, Timestamp(at))
            .with_read(read)
    }

    fn nid(id: &str) -> NotificationId {
        NotificationId::new(id)
    }

    fn session() -> (Arc<MemoryBackend>, NotificationSync<Arc<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());
        let sync = NotificationSync::new(Arc::clone(&backend), SyncConfig::for_owner("u1"));
        (backend, sync)
    }

    #[test]
    fn test_created_counts_unread_only() {
        let (_, sync) = session();
        let a = sync.ingest(NotificationEvent::created(rec("a", 1, false)));
        let b = sync.ingest(NotificationEvent::created(rec("b", 2, true)));

        assert_eq!(a, Applied::Inserted { id: nid("a"), delta: 1 });
        assert_eq!(b, Applied::Inserted { id: nid("b"), delta: 0 });
        assert_eq!(sync.unread_count(), 1);
    }

    #[test]
    fn test_duplicate_create_does_not_double_count() {
        let (_, sync) = session();
        sync.ingest(NotificationEvent::created(rec("a", 1, false)));
        let again = sync.ingest(NotificationEvent::created(rec("a", 1, false)));

        assert_eq!(again, Applied::Replaced { id: nid("a"), delta: 0 });
        assert_eq!(sync.unread_count(), 1);
        assert_eq!(sync.len(), 1);
    }

    #[test]
    fn test_changed_unknown_is_ignored() {
        let (_, sync) = session();
        let applied = sync.ingest(NotificationEvent::changed(rec("b", 1, true)));

        assert_eq!(
            applied,
            Applied::Ignored {
                id: nid("b"),
                reason: IgnoreReason::UnknownIdentity
            }
        );
        assert_eq!(sync.unread_count(), 0);
        assert!(sync.is_empty());
    }

    #[test]
    fn test_changed_flips_both_ways() {
        let (_, sync) = session();
        sync.ingest(NotificationEvent::created(rec("a", 1, false)));

        assert_eq!(sync.ingest(NotificationEvent::changed(rec("a", 1, true))).delta(), -1);
        assert_eq!(sync.unread_count(), 0);
        assert_eq!(sync.ingest(NotificationEvent::changed(rec("a", 1, false))).delta(), 1);
        assert_eq!(sync.unread_count(), 1);
        assert_eq!(sync.ingest(NotificationEvent::changed(rec("a", 1, false))).delta(), 0);
        assert_eq!(sync.unread_count(), 1);
    }

    #[test]
    fn test_foreign_owner_never_enters() {
        let (_, sync) = session();
        let foreign = NotificationRecord::new("x", OwnerId::new("u2"), NotificationKind::VaultForked, "", Timestamp(1));
        let applied = sync.ingest(NotificationEvent::created(foreign));

        assert!(matches!(
            applied,
            Applied::Ignored {
                reason: IgnoreReason::ForeignOwner,
                ..
            }
        ));
        assert!(sync.is_empty());
    }

    #[test]
    fn test_mark_read_noop_paths_skip_backend() {
        let (backend, sync) = session();
        backend.fail_always(BackendOp::ApplyRead, BackendError::Unavailable);
        sync.ingest(NotificationEvent::created(rec("a", 1, true)));

        assert_eq!(sync.mark_read(&nid("a")).unwrap(), MutationOutcome::Noop);
        assert_eq!(sync.mark_read(&nid("missing")).unwrap(), MutationOutcome::Noop);
        assert!(!sync.is_divergent());
    }

    #[test]
    fn test_failed_write_marks_divergent_until_resync() {
        let (backend, sync) = session();
        backend.publish(rec("a", 1, false));
        sync.bootstrap().unwrap();

        backend.fail_next(BackendOp::ApplyDelete, BackendError::Network("reset".into()));
        let err = sync.delete(&nid("a")).unwrap_err();
        assert!(matches!(
            err,
            SyncError::AuthoritativeWrite {
                operation: MutationKind::Delete,
                ..
            }
        ));
        assert!(sync.is_divergent());
        assert!(sync.get(&nid("a")).is_none());
        assert_eq!(sync.unread_count(), 0);

        sync.refetch().unwrap();
        assert!(!sync.is_divergent());
        assert_eq!(sync.unread_count(), 1);
        assert_eq!(sync.stats().failed_writes, 1);
    }

    #[test]
    fn test_mark_all_read_drift_counts_breach() {
        let (_, sync) = session();
        sync.ingest(NotificationEvent::created(rec("a", 1, false)));
        sync.session.lock().counter.reset(3);

        sync.mark_all_read().unwrap();
        assert_eq!(sync.unread_count(), 0);
        assert_eq!(sync.stats().counter_breaches, 1);
    }

    #[test]
    fn test_journal_only_while_fetching() {
        let (_, sync) = session();
        sync.ingest(NotificationEvent::created(rec("a", 1, false)));
        assert!(sync.session.lock().journal.is_empty());

        let since = sync.session.lock().begin_refetch();
        sync.ingest(NotificationEvent::created(rec("b", 2, false)));
        sync.mark_read(&nid("a")).unwrap();
        sync.mark_read(&nid("missing")).unwrap();

        let replay = sync.session.lock().end_refetch(since);
        assert_eq!(replay.len(), 2);
        assert!(matches!(replay[1], Transition::MarkRead(ref id) if id == &nid("a")));
        assert!(sync.session.lock().journal.is_empty());
    }

    #[test]
    fn test_refetch_rejects_duplicates() {
        struct Dupes;
        impl Backend for Dupes {
            fn fetch_notifications(&self, _: &OwnerId, _: usize) -> std::result::Result<Vec<NotificationRecord>, BackendError> {
                Ok(vec![rec("a", 2, false), rec("a", 1, true), rec("b", 1, false)])
            }
            fn subscribe(&self, _: &OwnerId) -> std::result::Result<crate::feed::FeedReceiver, BackendError> {
                Err(BackendError::Unavailable)
            }
            fn apply_read(&self, _: &NotificationId) -> std::result::Result<(), BackendError> {
                Ok(())
            }
            fn apply_read_all(&self, _: &OwnerId) -> std::result::Result<(), BackendError> {
                Ok(())
            }
            fn apply_delete(&self, _: &NotificationId) -> std::result::Result<(), BackendError> {
                Ok(())
            }
        }

        let sync = NotificationSync::new(Dupes, SyncConfig::for_owner("u1"));
        let summary = sync.bootstrap().unwrap();

        assert_eq!(summary, ResyncSummary { records: 2, unread: 2, rejected: 1, replayed: 0 });
        assert!(!sync.get(&nid("a")).unwrap().read);
        assert_eq!(sync.verify_counter().unwrap(), 2);
    }

    #[test]
    fn test_fetch_failure_leaves_store() {
        let (backend, sync) = session();
        backend.publish(rec("a", 1, false));
        sync.bootstrap().unwrap();

        backend.fail_next(BackendOp::Fetch, BackendError::Unauthorized);
        assert!(matches!(sync.refetch(), Err(SyncError::Fetch(BackendError::Unauthorized))));
        assert_eq!(sync.len(), 1);
        assert_eq!(sync.unread_count(), 1);
    }

    #[test]
    fn test_switch_owner_clears() {
        let (backend, sync) = session();
        backend.publish(rec("a", 1, false));
        sync.bootstrap().unwrap();
        let (_, epoch) = sync.owner_and_epoch();

        sync.switch_owner(OwnerId::new("u2"));

        assert!(sync.is_empty());
        assert_eq!(sync.unread_count(), 0);
        assert_eq!(sync.owner(), OwnerId::new("u2"));
        assert_eq!(sync.owner_and_epoch().1, epoch + 1);
    }

    #[test]
    fn test_watch_sees_transitions_in_order() {
        let (_, sync) = session();
        let handle = sync.watch(WatchConfig {
            filter: WatchFilter::counter(),
            ..Default::default()
        });

        sync.ingest(NotificationEvent::created(rec("a", 1, false)));
        sync.ingest(NotificationEvent::created(rec("b", 2, false)));
        sync.mark_read(&nid("a")).unwrap();

        assert_eq!(
            handle.drain(),
            vec![
                SyncEvent::UnreadCount { count: 1 },
                SyncEvent::UnreadCount { count: 2 },
                SyncEvent::UnreadCount { count: 1 },
            ]
        );
    }

    #[test]
    fn test_config_from_json() {
        let config: SyncConfig = serde_json::from_str(
            r#"{"owner": "u7", "page_size": 20, "reconnect": {"initial_delay": 10, "max_delay": 100, "multiplier": 3}}"#,
        )
        .unwrap();

        assert_eq!(config.owner, OwnerId::new("u7"));
        assert_eq!(config.page_size, 20);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.reconnect.delay_for(1), Duration::from_millis(30));
        assert!(config.resync_on_reconnect);
    }
}
