//! Durable notification queue
//!
//! FIFO of pending notifications, written through to a `DurableStore` after
//! every mutation. Sequence numbers are stamped from a high-water mark that
//! is persisted with the queue, so they keep increasing across restarts.

use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::monitor::filter::{self, CoalesceOutcome};
use crate::store::{DurableStore, QueueSnapshot};
use crate::types::error::{RecorderError, Result};
use crate::types::notification::ChangeNotification;

/// What `NotificationQueue::load` found in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing saved yet
    Fresh,
    /// Saved state restored
    Restored { pending: usize, high_water: u64 },
    /// Saved state unusable; started empty
    Recovered { reason: String },
}

pub struct NotificationQueue {
    pending: VecDeque<ChangeNotification>,
    high_water: u64,
    recording_enabled: bool,
    /// Front is delivered and awaiting acknowledgement
    pinned: bool,
    /// In-memory state is ahead of the store
    dirty: bool,
    coalesce_window: usize,
    store: Box<dyn DurableStore>,
}

impl NotificationQueue {
    /// Load the queue from `store`.
    ///
    /// A missing, unreadable or corrupt blob yields an empty queue; the
    /// server state stays authoritative so losing the recording is not fatal.
    pub fn load(
        store: Box<dyn DurableStore>,
        coalesce_window: usize,
        recording_default: bool,
    ) -> (Self, LoadOutcome) {
        let mut queue = Self {
            pending: VecDeque::new(),
            high_water: 0,
            recording_enabled: recording_default,
            pinned: false,
            dirty: false,
            coalesce_window,
            store,
        };

        let snapshot = queue
            .store
            .load()
            .and_then(|blob| blob.map(|bytes| QueueSnapshot::decode(&bytes)).transpose());

        let outcome = match snapshot {
            Ok(None) => {
                debug!("No saved queue in {}", queue.store.describe());
                LoadOutcome::Fresh
            }
            Ok(Some(snapshot)) => {
                queue.recording_enabled = snapshot.recording_enabled;
                queue.high_water = snapshot.high_water;
                queue.pending = snapshot.notifications.into();
                info!(
                    "Restored {} pending notifications from {} (high-water {})",
                    queue.pending.len(),
                    queue.store.describe(),
                    queue.high_water
                );
                LoadOutcome::Restored {
                    pending: queue.pending.len(),
                    high_water: queue.high_water,
                }
            }
            Err(e) => {
                warn!(
                    "Discarding saved queue in {}: {}",
                    queue.store.describe(),
                    e
                );
                // Overwrite a corrupt blob at the next flush; a failed read
                // may be transient, so leave that one alone
                queue.dirty = matches!(e, RecorderError::StoreCorrupt(_));
                LoadOutcome::Recovered {
                    reason: e.to_string(),
                }
            }
        };

        (queue, outcome)
    }

    /// Stamp, coalesce and persist a notification
    pub fn enqueue(&mut self, mut notification: ChangeNotification) -> Result<CoalesceOutcome> {
        self.high_water += 1;
        notification.sequence = self.high_water;

        let protected = usize::from(self.pinned);
        let outcome = filter::coalesce(
            &mut self.pending,
            protected,
            self.coalesce_window,
            notification,
        );
        debug!(
            "Enqueued #{}: {:?} ({} pending)",
            self.high_water,
            outcome,
            self.pending.len()
        );

        self.save()?;
        Ok(outcome)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeNotification> {
        self.pending.iter()
    }

    pub fn peek_front(&self) -> Result<&ChangeNotification> {
        self.pending.front().ok_or(RecorderError::EmptyQueue)
    }

    /// Mark the front as delivered; coalescing will not touch it until popped
    pub fn pin_front(&mut self) -> Result<&ChangeNotification> {
        let front = self.pending.front().ok_or(RecorderError::EmptyQueue)?;
        self.pinned = true;
        Ok(front)
    }

    pub fn is_front_pinned(&self) -> bool {
        self.pinned
    }

    /// Remove the front and persist. Only call after the consumer acknowledged it.
    ///
    /// The removal stands even if persisting fails.
    pub fn pop_front(&mut self) -> Result<ChangeNotification> {
        let front = self.pending.pop_front().ok_or(RecorderError::EmptyQueue)?;
        self.pinned = false;
        self.save()?;
        Ok(front)
    }

    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled
    }

    pub fn set_recording_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.recording_enabled == enabled {
            return Ok(());
        }
        self.recording_enabled = enabled;
        self.save()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            recording_enabled: self.recording_enabled,
            high_water: self.high_water,
            notifications: self.pending.iter().cloned().collect(),
        }
    }

    /// Write the full queue state to the store.
    ///
    /// On failure the queue stays dirty and the next mutation retries.
    pub fn save(&mut self) -> Result<()> {
        let result = self
            .snapshot()
            .encode()
            .and_then(|bytes| self.store.save(&bytes));

        match result {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                warn!(
                    "Failed to persist queue to {}: {} (keeping {} notifications in memory)",
                    self.store.describe(),
                    e,
                    self.pending.len()
                );
                Err(RecorderError::Persistence(e.to_string()))
            }
        }
    }

    /// Save only if the last save failed or never happened
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.save()
        } else {
            Ok(())
        }
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }
}
