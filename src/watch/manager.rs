//! Watch manager for broadcasting projection changes.

use crate::types::{NotificationId, NotificationRecord, OwnerId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{SyncEvent, WatchConfig, WatchDropReason, WatchHandle, WatchId};

/// Internal watch state.
struct Watch {
    config: WatchConfig,
    sender: Sender<SyncEvent>,
}

impl Watch {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (the watch will be dropped).
    fn try_send(&self, event: SyncEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Manages watches and broadcasts sync events.
pub struct WatchManager {
    watches: RwLock<HashMap<WatchId, Watch>>,
    next_id: AtomicU64,
}

impl WatchManager {
    pub fn new() -> Self {
        Self {
            watches: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new watch.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.watches.write().insert(id, Watch { config, sender });

        WatchHandle { id, receiver }
    }

    /// Remove a watch.
    pub fn unwatch(&self, id: WatchId) {
        if let Some(watch) = self.watches.write().remove(&id) {
            let _ = watch.sender.try_send(SyncEvent::Dropped {
                reason: WatchDropReason::Unwatched,
            });
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.read().len()
    }

    // --- Broadcasting ---

    pub fn broadcast_upserted(&self, record: &NotificationRecord) {
        let event = SyncEvent::Upserted {
            record: record.clone(),
        };
        self.broadcast(|w| w.config.filter.include_records, event);
    }

    pub fn broadcast_removed(&self, id: &NotificationId) {
        let event = SyncEvent::Removed { id: id.clone() };
        self.broadcast(|w| w.config.filter.include_records, event);
    }

    pub fn broadcast_unread(&self, count: u64) {
        let event = SyncEvent::UnreadCount { count };
        self.broadcast(|w| w.config.filter.include_counter, event);
    }

    pub fn broadcast_resynced(&self, records: usize, unread: u64) {
        let event = SyncEvent::Resynced { records, unread };
        self.broadcast(|w| w.config.filter.include_lifecycle, event);
    }

    pub fn broadcast_reset(&self, owner: &OwnerId) {
        let event = SyncEvent::Reset {
            owner: owner.clone(),
        };
        self.broadcast(|w| w.config.filter.include_lifecycle, event);
    }

    /// Internal broadcast helper. Drops watchers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: SyncEvent)
    where
        F: Fn(&Watch) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let watches = self.watches.read();
            for (id, watch) in watches.iter() {
                if filter(watch) && !watch.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watches = self.watches.write();
            for id in to_remove {
                if let Some(watch) = watches.remove(&id) {
                    debug!(watch = id.0, "dropping slow watcher");
                    let _ = watch.sender.try_send(SyncEvent::Dropped {
                        reason: WatchDropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationKind, Timestamp};
    use crate::watch::WatchFilter;
    use std::time::Duration;

    fn make_record(id: &str) -> NotificationRecord {
        NotificationRecord::new(id, OwnerId::new("u1"), NotificationKind::VaultShared, "t", Timestamp::now())
    }

    #[test]
    fn test_watch_unwatch() {
        let manager = WatchManager::new();

        let handle = manager.watch(WatchConfig::default());
        assert_eq!(manager.watch_count(), 1);

        manager.unwatch(handle.id);
        assert_eq!(manager.watch_count(), 0);
        assert!(matches!(
            handle.recv_timeout(Duration::from_millis(100)),
            Ok(SyncEvent::Dropped {
                reason: WatchDropReason::Unwatched
            })
        ));
    }

    #[test]
    fn test_filter_counter_only() {
        let manager = WatchManager::new();
        let handle = manager.watch(WatchConfig {
            filter: WatchFilter::counter(),
            ..Default::default()
        });

        manager.broadcast_upserted(&make_record("a"));
        manager.broadcast_unread(3);

        assert_eq!(handle.drain(), vec![SyncEvent::UnreadCount { count: 3 }]);
    }

    #[test]
    fn test_drop_slow_watcher() {
        let manager = WatchManager::new();
        let _handle = manager.watch(WatchConfig {
            buffer_size: 2,
            filter: WatchFilter::all(),
        });

        for i in 0..10 {
            manager.broadcast_unread(i);
        }

        assert_eq!(manager.watch_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let manager = WatchManager::new();
        let handle = manager.watch(WatchConfig::default());
        drop(handle);

        manager.broadcast_removed(&NotificationId::new("a"));
        assert_eq!(manager.watch_count(), 0);
    }
}
