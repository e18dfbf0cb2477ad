//! Wire-level types for the server-pushed notification feed.

use crate::types::NotificationRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to a notification on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOp {
    Created,
    Changed,
    Removed,
}

/// A single feed event. For `Removed` only the record's id and owner are
/// meaningful.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub op: EventOp,
    pub record: NotificationRecord,
}

impl NotificationEvent {
    pub fn created(record: NotificationRecord) -> Self {
        Self {
            op: EventOp::Created,
            record,
        }
    }

    pub fn changed(record: NotificationRecord) -> Self {
        Self {
            op: EventOp::Changed,
            record,
        }
    }

    pub fn removed(record: NotificationRecord) -> Self {
        Self {
            op: EventOp::Removed,
            record,
        }
    }
}

/// Message delivered on a feed subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Event(NotificationEvent),

    /// The server side closed the subscription.
    Dropped { reason: DropReason },
}

/// Why a subscription ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Transport lost its connection.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// Internal error.
    Error(String),
}

/// Receiving end of a feed subscription.
pub type FeedReceiver = crossbeam_channel::Receiver<FeedMessage>;

/// Connection state of the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Subscribing,
    Live,
}

/// Result of one pipeline poll.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// An event was applied to the mirror.
    Applied(crate::sync::Applied),
    /// Nothing arrived within the timeout.
    Idle,
    /// The stream ended; the pipeline is now disconnected.
    Disconnected(DropReason),
    /// The pipeline was not live; call `connect` first.
    NotLive,
}

/// Exponential backoff between reconnect attempts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,

    /// Growth factor per failed attempt.
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
