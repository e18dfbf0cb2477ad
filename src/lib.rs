//! # Herald
//!
//! A client-local, eventually-consistent mirror of a server-authoritative
//! notification log, with an unread counter that stays exact under
//! duplicate and out-of-order delivery.
//!
//! ## Core Concepts
//!
//! - **Records**: Notifications keyed by id, ordered newest-first
//! - **Counter**: Unread count maintained per transition, never re-scanned in steady state
//! - **Feed**: Server-pushed created/changed/removed events, applied one at a time
//! - **Mutations**: Local-first mark-read, mark-all-read and delete, then written to the backend
//! - **Resync**: Full authoritative refetch that resets the counter by scan
//!
//! ## Example
//!
//! ```ignore
//! use herald::{IngestionPipeline, MemoryBackend, NotificationSync, SyncConfig};
//! use std::sync::Arc;
//!
//! let sync = Arc::new(NotificationSync::new(MemoryBackend::new(), SyncConfig::for_owner("u1")));
//!
//! // Subscribe first so nothing published during the fetch is missed
//! let mut pipeline = IngestionPipeline::new(Arc::clone(&sync));
//! pipeline.connect()?;
//! sync.bootstrap()?;
//!
//! // Apply live events as they arrive
//! pipeline.poll(std::time::Duration::from_millis(100));
//!
//! // Local-first mutation
//! sync.mark_all_read()?;
//! assert_eq!(sync.unread_count(), 0);
//! ```

pub mod backend;
pub mod error;
pub mod feed;
pub mod records;
pub mod sync;
pub mod types;
pub mod watch;

// Re-exports
pub use backend::{Backend, BackendOp, MemoryBackend};
pub use error::{BackendError, Result, SyncError};
pub use feed::{
    DropReason, EventOp, FeedMessage, FeedReceiver, IngestionPipeline, NotificationEvent,
    PipelineState, PollOutcome, ReconnectPolicy,
};
pub use records::{unread_delta, RecordStore, UnreadCounter};
pub use sync::{
    Applied, IgnoreReason, MutationOutcome, NotificationSync, NotificationView, ResyncSummary,
    SyncConfig, DEFAULT_PAGE_SIZE,
};
pub use types::*;
pub use watch::{SyncEvent, WatchConfig, WatchDropReason, WatchFilter, WatchHandle, WatchId, WatchManager};
