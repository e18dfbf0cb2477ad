//! Server-pushed notification feed and the pipeline that ingests it.
//!
//! The backend hands out a channel of [`FeedMessage`]s per owner. The
//! [`IngestionPipeline`] owns that channel, tracks connection state, and
//! applies each event to the session as a single transition.
//!
//! # Example
//!
//! ```ignore
//! let sync = Arc::new(NotificationSync::new(backend, SyncConfig::for_owner("u1")));
//! sync.bootstrap()?;
//!
//! // The first connect resyncs again, covering the gap before it
//! let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
//! let mut pipeline = IngestionPipeline::new(Arc::clone(&sync));
//! std::thread::spawn(move || pipeline.run(&stop_rx));
//!
//! // ... later
//! stop_tx.send(()).ok();
//! ```

mod pipeline;
mod types;

pub use pipeline::IngestionPipeline;
pub(crate) use types::millis;
pub use types::{
    DropReason, EventOp, FeedMessage, FeedReceiver, NotificationEvent, PipelineState, PollOutcome,
    ReconnectPolicy,
};
