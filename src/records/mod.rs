//! In-memory notification records and the derived unread counter.
//!
//! The store holds at most one record per id and keeps a presentation
//! index ordered newest-first. The counter is maintained incrementally by
//! whoever mutates the store, using [`unread_delta`] for every transition.

mod counter;
mod store;

pub use counter::{unread_delta, UnreadCounter};
pub use store::RecordStore;
