//! Event ingestion pipeline: subscribe, apply, reconnect.

use crate::backend::Backend;
use crate::error::{Result, SyncError};
use crate::sync::NotificationSync;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{DropReason, FeedMessage, FeedReceiver, PipelineState, PollOutcome};

/// Drives a feed subscription and applies each event to the mirror.
///
/// State machine: `Disconnected -> Subscribing -> Live -> Disconnected`.
/// Events are applied one at a time in arrival order. A disconnect leaves
/// the store untouched; there is no gap detection, so missed events are
/// only recovered by a resync. When driving the pipeline by hand, call
/// [`connect`](Self::connect) before bootstrapping so nothing published in
/// between is missed.
pub struct IngestionPipeline<B: Backend> {
    sync: Arc<NotificationSync<B>>,
    state: PipelineState,
    receiver: Option<FeedReceiver>,
    /// Session epoch the current subscription was opened for.
    epoch: u64,
    /// Consecutive failed connect attempts.
    failed_attempts: u32,
    /// Successful connects over the pipeline's lifetime.
    connections: u64,
}

impl<B: Backend> IngestionPipeline<B> {
    pub fn new(sync: Arc<NotificationSync<B>>) -> Self {
        Self {
            sync,
            state: PipelineState::Disconnected,
            receiver: None,
            epoch: 0,
            failed_attempts: 0,
            connections: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Open a subscription for the session's current owner.
    pub fn connect(&mut self) -> Result<()> {
        self.state = PipelineState::Subscribing;
        let (owner, epoch) = self.sync.owner_and_epoch();

        match self.sync.backend().subscribe(&owner) {
            Ok(receiver) => {
                self.receiver = Some(receiver);
                self.epoch = epoch;
                self.state = PipelineState::Live;
                self.failed_attempts = 0;
                self.connections += 1;
                info!(owner = %owner, epoch, "notification feed live");
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::Disconnected;
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                warn!(owner = %owner, error = %e, attempt = self.failed_attempts, "subscribe failed");
                Err(SyncError::Transport(e.to_string()))
            }
        }
    }

    /// Wait up to `timeout` for one feed message and apply it.
    pub fn poll(&mut self, timeout: Duration) -> PollOutcome {
        if self.state != PipelineState::Live {
            return PollOutcome::NotLive;
        }

        // Owner changed under us; the subscription belongs to the old session.
        if self.sync.owner_and_epoch().1 != self.epoch {
            return self.disconnect(DropReason::Unsubscribed);
        }

        let Some(receiver) = self.receiver.as_ref() else {
            return self.disconnect(DropReason::Disconnected);
        };

        match receiver.recv_timeout(timeout) {
            Ok(FeedMessage::Event(event)) => PollOutcome::Applied(self.sync.ingest(event)),
            Ok(FeedMessage::Dropped { reason }) => self.disconnect(reason),
            Err(RecvTimeoutError::Timeout) => PollOutcome::Idle,
            Err(RecvTimeoutError::Disconnected) => self.disconnect(DropReason::Disconnected),
        }
    }

    fn disconnect(&mut self, reason: DropReason) -> PollOutcome {
        self.receiver = None;
        self.state = PipelineState::Disconnected;
        warn!(?reason, "notification feed disconnected");
        PollOutcome::Disconnected(reason)
    }

    /// Run until `shutdown` yields a message or its sender is dropped.
    ///
    /// Failed connects back off per the session's reconnect policy. When
    /// `resync_on_reconnect` is set, every reconnect triggers a resync, and
    /// so does the first connect if the session was already bootstrapped,
    /// since events published before the subscription opened are lost.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        let config = self.sync.config().clone();

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => break,
                Err(crossbeam_channel::TryRecvError::Empty) => {}
            }

            match self.state {
                PipelineState::Live => {
                    if let PollOutcome::Applied(applied) = self.poll(config.poll_interval) {
                        debug!(?applied, "feed event applied");
                    }
                }
                PipelineState::Disconnected | PipelineState::Subscribing => match self.connect() {
                    Ok(()) => {
                        let resync = self.connections > 1 || self.sync.has_synced();
                        if resync && config.resync_on_reconnect {
                            if let Err(e) = self.sync.refetch() {
                                warn!(error = %e, "resync after reconnect failed");
                            }
                        }
                    }
                    Err(_) => {
                        let delay = config
                            .reconnect
                            .delay_for(self.failed_attempts.saturating_sub(1));
                        match shutdown.recv_timeout(delay) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                },
            }
        }

        self.receiver = None;
        self.state = PipelineState::Disconnected;
        info!("ingestion pipeline stopped");
    }
}
