//! Change notifications for read-only consumers of the mirror.
//!
//! A UI layer reads the session as a projection. Rather than polling, it can
//! open a watch and redraw when a [`SyncEvent`] arrives:
//! - Record upserts and removals
//! - Unread counter changes
//! - Resync and session reset
//!
//! Watches use bounded buffers; a watcher that falls behind is dropped
//! instead of stalling ingestion.
//!
//! # Example
//!
//! ```ignore
//! let handle = sync.watch(WatchConfig {
//!     filter: WatchFilter::counter(),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         SyncEvent::UnreadCount { count } => badge.set(count),
//!         SyncEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::WatchManager;
pub use types::{SyncEvent, WatchConfig, WatchDropReason, WatchFilter, WatchHandle, WatchId};
