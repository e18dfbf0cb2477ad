//! In-process authoritative backend.
//!
//! Holds every owner's notifications and fans out feed events to
//! owner-filtered subscribers over bounded channels. Slow subscribers are
//! dropped rather than blocking writers. Failures can be injected per
//! operation, and subscribers can be disconnected on demand, which is what
//! the tests and benchmarks use it for.

use crate::error::BackendError;
use crate::feed::{DropReason, FeedMessage, FeedReceiver, NotificationEvent};
use crate::types::{NotificationId, NotificationRecord, OwnerId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use super::Backend;

/// Default feed buffer per subscriber.
const DEFAULT_FEED_BUFFER: usize = 1024;

/// Backend call, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Fetch,
    Subscribe,
    ApplyRead,
    ApplyReadAll,
    ApplyDelete,
}

struct Feed {
    owner: OwnerId,
    sender: Sender<FeedMessage>,
}

impl Feed {
    /// Returns false if the subscriber is gone or its buffer is full.
    fn try_send(&self, message: FeedMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[derive(Default)]
struct Failures {
    /// Consumed one per call, front first.
    queued: HashMap<BackendOp, VecDeque<BackendError>>,
    /// Returned on every call until cleared.
    sticky: HashMap<BackendOp, BackendError>,
}

/// Authoritative notification log held in memory.
pub struct MemoryBackend {
    /// Records by owner, then id.
    records: RwLock<HashMap<OwnerId, BTreeMap<NotificationId, NotificationRecord>>>,
    feeds: RwLock<HashMap<u64, Feed>>,
    next_feed: AtomicU64,
    buffer_size: usize,
    failures: Mutex<Failures>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_FEED_BUFFER)
    }

    /// Create a backend whose feeds buffer at most `buffer_size` messages.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            next_feed: AtomicU64::new(1),
            buffer_size,
            failures: Mutex::new(Failures::default()),
        }
    }

    // --- Failure Injection ---

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: BackendOp, error: BackendError) {
        self.failures
            .lock()
            .queued
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `op` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: BackendOp, error: BackendError) {
        self.failures.lock().sticky.insert(op, error);
    }

    pub fn clear_failures(&self) {
        let mut failures = self.failures.lock();
        failures.queued.clear();
        failures.sticky.clear();
    }

    fn check(&self, op: BackendOp) -> Result<(), BackendError> {
        let mut failures = self.failures.lock();
        if let Some(error) = failures.queued.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        match failures.sticky.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    // --- Server-side Writes ---
    //
    // These model other actors (sharing, forking, access requests) changing
    // the log. They bypass failure injection. Every write broadcasts while
    // still holding the `records` lock, so feeds see each row's events in
    // the order they were applied. Lock order is `records` then `feeds`.

    /// Insert a new notification and broadcast `created`.
    pub fn publish(&self, record: NotificationRecord) {
        let mut records = self.records.write();
        records
            .entry(record.owner_id.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        self.broadcast(NotificationEvent::created(record));
    }

    /// Replace an existing notification and broadcast `changed`.
    /// Returns false if the id is unknown.
    pub fn update(&self, record: NotificationRecord) -> bool {
        let mut records = self.records.write();
        match records.get_mut(&record.owner_id) {
            Some(owned) if owned.contains_key(&record.id) => {
                owned.insert(record.id.clone(), record.clone());
                self.broadcast(NotificationEvent::changed(record));
                true
            }
            _ => false,
        }
    }

    /// Remove a notification and broadcast `removed`.
    pub fn retract(&self, id: &NotificationId) -> Option<NotificationRecord> {
        let mut records = self.records.write();
        let removed = records.values_mut().find_map(|owned| owned.remove(id))?;
        self.broadcast(NotificationEvent::removed(removed.clone()));
        Some(removed)
    }

    /// Send a raw message to every feed of `owner`, bypassing the log.
    ///
    /// Simulates duplicate or out-of-order delivery.
    pub fn inject(&self, owner: &OwnerId, message: FeedMessage) {
        let feeds = self.feeds.read();
        for feed in feeds.values().filter(|f| &f.owner == owner) {
            feed.try_send(message.clone());
        }
    }

    /// Close every feed of `owner`, as a dropped connection would.
    pub fn disconnect_owner(&self, owner: &OwnerId, reason: DropReason) {
        let mut feeds = self.feeds.write();
        feeds.retain(|_, feed| {
            if &feed.owner != owner {
                return true;
            }
            let _ = feed.sender.try_send(FeedMessage::Dropped {
                reason: reason.clone(),
            });
            false
        });
    }

    /// Authoritative records for `owner`, most recent first.
    pub fn authoritative(&self, owner: &OwnerId) -> Vec<NotificationRecord> {
        let mut all: Vec<NotificationRecord> = self
            .records
            .read()
            .get(owner)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(NotificationRecord::order_key);
        all
    }

    pub fn authoritative_unread(&self, owner: &OwnerId) -> u64 {
        self.records
            .read()
            .get(owner)
            .map(|owned| owned.values().filter(|r| !r.read).count() as u64)
            .unwrap_or(0)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.read().len()
    }

    /// Broadcast to the record owner's feeds. Drops feeds that fail to receive.
    fn broadcast(&self, event: NotificationEvent) {
        let owner = event.record.owner_id.clone();
        let message = FeedMessage::Event(event);
        let mut to_remove = Vec::new();

        {
            let feeds = self.feeds.read();
            for (id, feed) in feeds.iter().filter(|(_, f)| f.owner == owner) {
                if !feed.try_send(message.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut feeds = self.feeds.write();
            for id in to_remove {
                if let Some(feed) = feeds.remove(&id) {
                    let _ = feed.sender.try_send(FeedMessage::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }

}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn fetch_notifications(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError> {
        self.check(BackendOp::Fetch)?;
        let mut page = self.authoritative(owner);
        page.truncate(limit);
        Ok(page)
    }

    fn subscribe(&self, owner: &OwnerId) -> Result<FeedReceiver, BackendError> {
        self.check(BackendOp::Subscribe)?;
        let id = self.next_feed.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = bounded(self.buffer_size);
        self.feeds.write().insert(
            id,
            Feed {
                owner: owner.clone(),
                sender,
            },
        );
        Ok(receiver)
    }

    fn apply_read(&self, id: &NotificationId) -> Result<(), BackendError> {
        self.check(BackendOp::ApplyRead)?;
        let mut records = self.records.write();
        if let Some(record) = records.values_mut().find_map(|owned| owned.get_mut(id)) {
            if !record.read {
                record.read = true;
                self.broadcast(NotificationEvent::changed(record.clone()));
            }
        }
        Ok(())
    }

    fn apply_read_all(&self, owner: &OwnerId) -> Result<(), BackendError> {
        self.check(BackendOp::ApplyReadAll)?;
        let mut records = self.records.write();
        if let Some(owned) = records.get_mut(owner) {
            for record in owned.values_mut().filter(|r| !r.read) {
                record.read = true;
                self.broadcast(NotificationEvent::changed(record.clone()));
            }
        }
        Ok(())
    }

    fn apply_delete(&self, id: &NotificationId) -> Result<(), BackendError> {
        self.check(BackendOp::ApplyDelete)?;
        self.retract(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::EventOp;
    use crate::types::{NotificationKind, Timestamp};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn rec(id: &str, owner: &str, at: i64) -> NotificationRecord {
        NotificationRecord::new(id, OwnerId::new(owner), NotificationKind::VaultShared, id, Timestamp(at))
    }

    fn next_event(rx: &FeedReceiver) -> NotificationEvent {
        match rx.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedMessage::Event(event) => event,
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_is_ordered_and_paged() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend.publish(rec(&format!("n{}", i), "u1", i));
        }
        backend.publish(rec("other", "u2", 100));

        let page = backend.fetch_notifications(&OwnerId::new("u1"), 3).unwrap();
        let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["n4", "n3", "n2"]);
    }

    #[test]
    fn test_feed_is_owner_filtered() {
        let backend = MemoryBackend::new();
        let rx = backend.subscribe(&OwnerId::new("u1")).unwrap();

        backend.publish(rec("theirs", "u2", 1));
        backend.publish(rec("mine", "u1", 2));

        let event = next_event(&rx);
        assert_eq!(event.op, EventOp::Created);
        assert_eq!(event.record.id.as_str(), "mine");
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_apply_read_echoes_changed() {
        let backend = MemoryBackend::new();
        backend.publish(rec("a", "u1", 1));
        let rx = backend.subscribe(&OwnerId::new("u1")).unwrap();

        backend.apply_read(&NotificationId::new("a")).unwrap();
        let event = next_event(&rx);
        assert_eq!(event.op, EventOp::Changed);
        assert!(event.record.read);

        // Already read: nothing to echo.
        backend.apply_read(&NotificationId::new("a")).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_concurrent_writes_keep_row_order() {
        let backend = Arc::new(MemoryBackend::new());
        let rx = backend.subscribe(&OwnerId::new("u1")).unwrap();

        for i in 0..50 {
            let id = format!("n{}", i);
            let writer = {
                let backend = Arc::clone(&backend);
                let record = rec(&id, "u1", i);
                thread::spawn(move || backend.publish(record))
            };
            let changed = rec(&id, "u1", i).with_read(true);
            while !backend.update(changed.clone()) {
                thread::yield_now();
            }
            writer.join().unwrap();

            assert_eq!(next_event(&rx).op, EventOp::Created);
            assert_eq!(next_event(&rx).op, EventOp::Changed);
        }
    }

    #[test]
    fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.fail_next(BackendOp::ApplyDelete, BackendError::Unauthorized);

        let id = NotificationId::new("a");
        assert_eq!(backend.apply_delete(&id), Err(BackendError::Unauthorized));
        assert_eq!(backend.apply_delete(&id), Ok(()));

        backend.fail_always(BackendOp::Subscribe, BackendError::Unavailable);
        assert!(backend.subscribe(&OwnerId::new("u1")).is_err());
        assert!(backend.subscribe(&OwnerId::new("u1")).is_err());
        backend.clear_failures();
        assert!(backend.subscribe(&OwnerId::new("u1")).is_ok());
    }

    #[test]
    fn test_slow_feed_is_dropped() {
        let backend = MemoryBackend::with_buffer_size(2);
        let _rx = backend.subscribe(&OwnerId::new("u1")).unwrap();

        for i in 0..10 {
            backend.publish(rec(&format!("n{}", i), "u1", i));
        }

        assert_eq!(backend.feed_count(), 0);
    }

    #[test]
    fn test_disconnect_owner() {
        let backend = MemoryBackend::new();
        let rx = backend.subscribe(&OwnerId::new("u1")).unwrap();
        let _other = backend.subscribe(&OwnerId::new("u2")).unwrap();

        backend.disconnect_owner(&OwnerId::new("u1"), DropReason::Disconnected);

        assert_eq!(backend.feed_count(), 1);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).unwrap(),
            FeedMessage::Dropped {
                reason: DropReason::Disconnected
            }
        );
    }
}
