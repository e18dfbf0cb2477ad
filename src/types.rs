//! Core types for the notification mirror.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Opaque, stable identifier for a notification.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        NotificationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user a notification belongs to.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::since_epoch(duration)
    }

    /// Saturates at `i64::MAX` microseconds.
    pub fn since_epoch(duration: Duration) -> Self {
        Timestamp(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Semantic category of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    VaultShared,
    VaultForked,
    VaultFavorited,
    AccessRequested,
    AccessGranted,
    PublicationUpdated,
}

/// Opaque navigation context attached to a notification.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A single notification as held by the mirror.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub owner_id: OwnerId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: Timestamp,
    #[serde(default)]
    pub payload: Payload,
}

impl NotificationRecord {
    /// Create an unread record with an empty payload.
    pub fn new(
        id: impl Into<String>,
        owner_id: OwnerId,
        kind: NotificationKind,
        title: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: NotificationId::new(id),
            owner_id,
            kind,
            title: title.into(),
            body: String::new(),
            read: false,
            created_at,
            payload: Payload::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Set a payload entry.
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Presentation ordering key: newest first, then ascending id.
    pub(crate) fn order_key(&self) -> (Reverse<Timestamp>, NotificationId) {
        (Reverse(self.created_at), self.id.clone())
    }

    /// Extract where a UI should navigate for this notification.
    ///
    /// Only looks up identifiers; the caller decides what they mean.
    pub fn navigation_hint(&self) -> NavigationHint {
        let field = |key: &str| {
            self.payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        };

        let Some(vault_id) = field("vault_id") else {
            return NavigationHint::None;
        };

        match self.kind {
            NotificationKind::VaultShared
            | NotificationKind::VaultFavorited
            | NotificationKind::AccessGranted => NavigationHint::Vault { vault_id },
            NotificationKind::VaultForked => match field("fork_id") {
                Some(fork_id) => NavigationHint::Fork { vault_id, fork_id },
                None => NavigationHint::Vault { vault_id },
            },
            NotificationKind::AccessRequested => match field("requester_id") {
                Some(requester_id) => NavigationHint::AccessRequest {
                    vault_id,
                    requester_id,
                },
                None => NavigationHint::Vault { vault_id },
            },
            NotificationKind::PublicationUpdated => match field("publication_id") {
                Some(publication_id) => NavigationHint::Publication {
                    vault_id,
                    publication_id,
                },
                None => NavigationHint::Vault { vault_id },
            },
        }
    }
}

/// Navigation target extracted from a record's payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum NavigationHint {
    Vault { vault_id: String },
    Fork { vault_id: String, fork_id: String },
    AccessRequest { vault_id: String, requester_id: String },
    Publication { vault_id: String, publication_id: String },
    None,
}

/// User-initiated mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    MarkRead,
    MarkAllRead,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::MarkRead => "mark-read",
            MutationKind::MarkAllRead => "mark-all-read",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Sync statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub record_count: u64,
    pub unread_count: u64,
    pub events_applied: u64,
    pub events_ignored: u64,
    pub mutations_applied: u64,
    pub failed_writes: u64,
    pub resyncs: u64,
    pub counter_breaches: u64,
}
