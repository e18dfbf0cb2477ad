//! Error types for notification synchronization.

use crate::types::{MutationKind, OwnerId};
use thiserror::Error;

/// Failure reported by the authoritative backend.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("Rejected by backend: {0}")]
    Validation(String),

    #[error("Backend unavailable")]
    Unavailable,
}

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Subscribing failed or the live stream dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The local phase of a mutation succeeded but the backend write failed.
    /// Local state is left as-is until the next resync.
    #[error("Authoritative {operation} failed: {source}")]
    AuthoritativeWrite {
        operation: MutationKind,
        #[source]
        source: BackendError,
    },

    /// Bootstrap or refetch could not reach the backend of record.
    #[error("Fetch failed: {0}")]
    Fetch(#[source] BackendError),

    /// The owner changed while a fetch was in flight; its result was discarded.
    #[error("Session changed during fetch for {0}")]
    SessionChanged(OwnerId),

    #[error("Unread counter drifted: counter is {counter}, scan found {scanned}")]
    CounterDrift { counter: u64, scanned: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
