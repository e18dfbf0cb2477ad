//! Watch types for projection change notifications.

use crate::types::{NotificationId, NotificationRecord, OwnerId};
use serde::{Deserialize, Serialize};

/// Configuration for a watch.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Max buffered events before dropping the watcher.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: WatchFilter,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: WatchFilter::all(),
        }
    }
}

/// Which kinds of change a watcher wants.
#[derive(Clone, Debug, Default)]
pub struct WatchFilter {
    /// Record upserts and removals.
    pub include_records: bool,

    /// Unread counter changes.
    pub include_counter: bool,

    /// Resync and reset.
    pub include_lifecycle: bool,
}

impl WatchFilter {
    /// Only the unread badge.
    pub fn counter() -> Self {
        Self {
            include_counter: true,
            ..Default::default()
        }
    }

    /// Record changes plus lifecycle, for list views.
    pub fn records() -> Self {
        Self {
            include_records: true,
            include_lifecycle: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_records: true,
            include_counter: true,
            include_lifecycle: true,
        }
    }
}

/// Events emitted to watchers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    // --- Record Events ---
    /// A record was inserted or replaced.
    Upserted { record: NotificationRecord },

    /// A record left the mirror.
    Removed { id: NotificationId },

    // --- Counter Events ---
    /// The unread count changed.
    UnreadCount { count: u64 },

    // --- Lifecycle Events ---
    /// The store was replaced from the backend of record.
    Resynced { records: usize, unread: u64 },

    /// The session was torn down, possibly for a new owner.
    Reset { owner: OwnerId },

    /// This watch was dropped.
    Dropped { reason: WatchDropReason },
}

/// Why a watch was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchDropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Handle to receive watch events.
pub struct WatchHandle {
    pub id: WatchId,
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
