//! Change Recorder
//!
//! Buffers relevant live notifications durably and replays them to the
//! consumer one at a time. The consumer pulls with `replay_next()` and
//! confirms with `change_processed()`; only then is the notification popped.
//! At most one notification is outstanding at any time.
//!
//! With recording disabled, new notifications pass straight through to the
//! consumer like a plain `LiveMonitor`, while anything already buffered can
//! still be drained.

use flume::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;
use crate::monitor::filter::CoalesceOutcome;
use crate::monitor::live::LiveMonitor;
use crate::monitor::queue::{LoadOutcome, NotificationQueue};
use crate::store::DurableStore;
use crate::types::error::{RecorderError, Result};
use crate::types::event::{MonitorEvent, RecorderSignal};
use crate::types::notification::ChangeNotification;
use crate::types::subscription::SubscriptionSpec;

/// Replay state as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Not recording and nothing delivered
    Disabled,
    /// Recording, nothing delivered
    Idle,
    /// A delivered notification has not been acknowledged yet
    AwaitingAck,
}

/// What happened to a live notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Not covered by the subscription
    Filtered,
    /// Passed straight to the consumer (recording disabled)
    Delivered,
    /// Recording disabled and the consumer is gone
    Dropped,
    /// Buffered in the queue
    Recorded(CoalesceOutcome),
}

/// Result of a replay request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// This notification was sent to the consumer and awaits acknowledgement
    Delivered(ChangeNotification),
    NothingToReplay,
}

/// Receiving ends handed to the consumer
pub struct ConsumerChannels {
    pub events: Receiver<MonitorEvent>,
    pub signals: Receiver<RecorderSignal>,
}

pub struct Recorder {
    live: LiveMonitor,
    queue: NotificationQueue,
    signal_tx: Sender<RecorderSignal>,
    /// Sequence of the delivered, unacknowledged front
    awaiting: Option<u64>,
    /// Disable requested while a notification was outstanding
    disable_pending: bool,
    feed_rx: Option<Receiver<ChangeNotification>>,
    load_outcome: LoadOutcome,
    /// Shut down; the store may already belong to a newer recorder
    closed: bool,
}

impl Recorder {
    /// Create a recorder, restoring any queue saved in `store`
    pub fn open(
        store: Box<dyn DurableStore>,
        subscription: SubscriptionSpec,
        config: &RecorderConfig,
    ) -> (Self, ConsumerChannels) {
        let (queue, load_outcome) = NotificationQueue::load(
            store,
            config.coalesce_window,
            config.recording_enabled_by_default,
        );
        let (live, events) = LiveMonitor::new(subscription);
        let (signal_tx, signals) = flume::unbounded();

        info!(
            "Recorder opened on {} (recording: {}, pending: {})",
            queue.store_description(),
            queue.recording_enabled(),
            queue.len()
        );

        let recorder = Self {
            live,
            queue,
            signal_tx,
            awaiting: None,
            disable_pending: false,
            feed_rx: None,
            load_outcome,
            closed: false,
        };

        (recorder, ConsumerChannels { events, signals })
    }

    pub fn state(&self) -> RecorderState {
        if self.awaiting.is_some() {
            RecorderState::AwaitingAck
        } else if self.queue.recording_enabled() {
            RecorderState::Idle
        } else {
            RecorderState::Disabled
        }
    }

    pub fn is_recording(&self) -> bool {
        self.queue.recording_enabled()
    }

    /// Switch recording on or off.
    ///
    /// Disabling never discards buffered notifications. While a delivered
    /// notification is outstanding, disabling takes effect once it has been
    /// acknowledged.
    pub fn set_recording_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_open()?;

        if enabled {
            self.disable_pending = false;
            if !self.queue.recording_enabled() {
                info!("Recording enabled on {}", self.queue.store_description());
            }
            return self.queue.set_recording_enabled(true);
        }

        if self.awaiting.is_some() {
            info!("Recording will be disabled once the outstanding notification is acknowledged");
            self.disable_pending = true;
            return Ok(());
        }

        if self.queue.recording_enabled() {
            info!(
                "Recording disabled on {} ({} notifications left to drain)",
                self.queue.store_description(),
                self.queue.len()
            );
        }
        self.queue.set_recording_enabled(false)
    }

    /// Entry point for the upstream live feed
    pub fn on_live_notification(&mut self, notification: ChangeNotification) -> Result<LiveOutcome> {
        self.ensure_open()?;

        if !self.live.admits(&notification) {
            debug!("Filtered out {}", notification);
            return Ok(LiveOutcome::Filtered);
        }

        if !self.queue.recording_enabled() {
            return Ok(if self.live.deliver(notification) {
                LiveOutcome::Delivered
            } else {
                LiveOutcome::Dropped
            });
        }

        let result = self.queue.enqueue(notification);

        // Even when persisting failed the notification is buffered in memory
        if !self.queue.is_empty() {
            self.signal(RecorderSignal::ChangesAdded);
        }

        result.map(LiveOutcome::Recorded)
    }

    /// Deliver the front of the queue without removing it
    pub fn replay_next(&mut self) -> Result<ReplayOutcome> {
        self.ensure_open()?;

        if let Some(sequence) = self.awaiting {
            error!(
                "replay_next called while #{} is still awaiting acknowledgement",
                sequence
            );
            return Err(RecorderError::ReplayWhileAwaiting);
        }

        if self.queue.is_empty() {
            debug!("Nothing to replay");
            self.signal(RecorderSignal::NothingToReplay);
            return Ok(ReplayOutcome::NothingToReplay);
        }

        let front = self.queue.pin_front()?.clone();
        self.awaiting = Some(front.sequence);
        debug!("Replaying {}", front);

        if !self.live.deliver(front.clone()) {
            warn!("Replayed {} but no consumer is listening", front);
        }

        Ok(ReplayOutcome::Delivered(front))
    }

    /// Acknowledge the delivered notification; pops and returns it
    pub fn change_processed(&mut self) -> Result<ChangeNotification> {
        self.ensure_open()?;

        let Some(sequence) = self.awaiting.take() else {
            error!("change_processed called with nothing awaiting acknowledgement");
            return Err(RecorderError::DoubleAcknowledge);
        };

        let popped = self.queue.pop_front();
        if let Ok(front) = &popped {
            debug_assert_eq!(front.sequence, sequence);
            debug!("Acknowledged {} ({} left)", front, self.queue.len());
        }

        if self.disable_pending {
            self.disable_pending = false;
            let disabled = self.set_recording_enabled(false);
            if let Err(e) = disabled {
                warn!("Failed to persist deferred disable: {}", e);
            }
        }

        popped
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Buffered notifications, front first
    pub fn pending(&self) -> Vec<ChangeNotification> {
        self.queue.iter().cloned().collect()
    }

    pub fn high_water(&self) -> u64 {
        self.queue.high_water()
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn subscription(&self) -> &SubscriptionSpec {
        self.live.subscription()
    }

    /// Replace the interest set; already buffered notifications are kept
    pub fn set_subscription(&mut self, subscription: SubscriptionSpec) {
        self.live.set_subscription(subscription);
    }

    /// Take notifications from an upstream feed channel.
    ///
    /// The attached feed is drained synchronously by `process_feed_notification`;
    /// use `state::pump_feed` to drive a shared recorder from an async task.
    pub fn attach_feed(&mut self, feed: Receiver<ChangeNotification>) {
        self.feed_rx = Some(feed);
    }

    /// Handle one pending feed notification without blocking.
    ///
    /// Returns true if a notification was processed, false if the feed is
    /// empty, closed or not attached.
    pub fn process_feed_notification(&mut self) -> bool {
        let received = match &self.feed_rx {
            Some(rx) => rx.try_recv(),
            None => {
                debug!("No feed attached");
                return false;
            }
        };

        match received {
            Ok(notification) => {
                if let Err(e) = self.on_live_notification(notification) {
                    warn!("Failed to record feed notification: {}", e);
                }
                true
            }
            Err(flume::TryRecvError::Empty) => false,
            Err(flume::TryRecvError::Disconnected) => {
                warn!("Feed channel disconnected");
                false
            }
        }
    }

    /// Handle everything currently waiting in the feed
    pub fn drain_feed(&mut self) -> usize {
        let mut processed = 0;
        while self.process_feed_notification() {
            processed += 1;
        }
        processed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Persist anything not yet written and close the recorder.
    ///
    /// Every later mutating call fails with `Closed`, so a recorder kept
    /// alive by a stale handle never writes to the store again.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        info!(
            "Shutting down recorder on {} ({} pending)",
            self.queue.store_description(),
            self.queue.len()
        );
        self.closed = true;
        self.feed_rx = None;

        let flushed = self.queue.flush();
        if let Err(e) = &flushed {
            error!(
                "Unsaved recorder state on {} lost at shutdown: {}",
                self.queue.store_description(),
                e
            );
        }
        flushed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            error!("Recorder on {} used after shutdown", self.queue.store_description());
            return Err(RecorderError::Closed);
        }
        Ok(())
    }

    fn signal(&self, signal: RecorderSignal) {
        if self.signal_tx.send(signal).is_err() {
            debug!("No consumer listening for {:?}", signal);
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if !self.closed && self.queue.is_dirty() {
            if let Err(e) = self.queue.flush() {
                error!(
                    "Lost unsaved recorder state on {}: {}",
                    self.queue.store_description(),
                    e
                );
            }
        }
    }
}
