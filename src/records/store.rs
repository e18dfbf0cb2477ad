//! Keyed notification store with presentation ordering.

use crate::types::{NotificationId, NotificationRecord, Timestamp};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// Set of notification records keyed by id.
///
/// Not internally synchronized: the owning session serializes access.
#[derive(Debug, Default)]
pub struct RecordStore {
    /// Records by id.
    records: HashMap<NotificationId, NotificationRecord>,

    /// Presentation order: newest first, then ascending id.
    order: BTreeSet<(Reverse<Timestamp>, NotificationId)>,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholesale-replace the record with the same id.
    ///
    /// Returns the replaced record, if any. Last writer wins; there is no
    /// version check.
    pub fn upsert(&mut self, record: NotificationRecord) -> Option<NotificationRecord> {
        let key = record.order_key();
        let prior = self.records.insert(record.id.clone(), record);

        if let Some(ref old) = prior {
            self.order.remove(&old.order_key());
        }
        self.order.insert(key);

        prior
    }

    /// Remove a record. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &NotificationId) -> Option<NotificationRecord> {
        let removed = self.records.remove(id)?;
        self.order.remove(&removed.order_key());
        Some(removed)
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.records.get(id)
    }

    /// Flip the read flag in place. Returns the prior flag, or `None` if absent.
    pub fn set_read(&mut self, id: &NotificationId, read: bool) -> Option<bool> {
        let record = self.records.get_mut(id)?;
        let prior = record.read;
        record.read = read;
        Some(prior)
    }

    /// Mark every record read. Returns the ids that were unread.
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        self.records
            .values_mut()
            .filter(|r| !r.read)
            .map(|record| {
                record.read = true;
                record.id.clone()
            })
            .collect()
    }

    /// All records in presentation order.
    pub fn all(&self) -> impl Iterator<Item = &NotificationRecord> + '_ {
        self.order
            .iter()
            .filter_map(move |(_, id)| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }

    /// Count unread records by full scan.
    ///
    /// Only bootstrap, resync and verification use this; steady-state
    /// transitions go through the incremental counter.
    pub fn unread_scan(&self) -> u64 {
        self.records.values().filter(|r| !r.read).count() as u64
    }
}
