//! The backend of record.
//!
//! Storage, authentication and the push transport live behind the
//! [`Backend`] trait. The mirror only needs a paged fetch, an owner-filtered
//! event feed, and the three authoritative mutations.

mod memory;

pub use memory::{BackendOp, MemoryBackend};

use crate::error::BackendError;
use crate::feed::FeedReceiver;
use crate::types::{NotificationId, NotificationRecord, OwnerId};
use std::sync::Arc;

/// Authoritative notification service.
///
/// Every call may block on I/O. None of them is ever invoked while the
/// session lock is held.
pub trait Backend: Send + Sync {
    /// Most-recent-first page of the owner's notifications, at most `limit` long.
    fn fetch_notifications(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError>;

    /// Open a live feed filtered server-side to `owner`.
    fn subscribe(&self, owner: &OwnerId) -> Result<FeedReceiver, BackendError>;

    fn apply_read(&self, id: &NotificationId) -> Result<(), BackendError>;

    fn apply_read_all(&self, owner: &OwnerId) -> Result<(), BackendError>;

    fn apply_delete(&self, id: &NotificationId) -> Result<(), BackendError>;
}

impl<T: Backend + ?Sized> Backend for Arc<T> {
    fn fetch_notifications(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, BackendError> {
        (**self).fetch_notifications(owner, limit)
    }

    fn subscribe(&self, owner: &OwnerId) -> Result<FeedReceiver, BackendError> {
        (**self).subscribe(owner)
    }

    fn apply_read(&self, id: &NotificationId) -> Result<(), BackendError> {
        (**self).apply_read(id)
    }

    fn apply_read_all(&self, owner: &OwnerId) -> Result<(), BackendError> {
        (**self).apply_read_all(owner)
    }

    fn apply_delete(&self, id: &NotificationId) -> Result<(), BackendError> {
        (**self).apply_delete(id)
    }
}
