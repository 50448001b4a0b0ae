//! Live pass-through monitoring
//!
//! Filters notifications against the consumer's subscription and hands them
//! straight to the consumer's event channel. No buffering, no persistence:
//! delivery guarantees are those of the upstream feed.

use flume::{Receiver, Sender};
use tracing::warn;

use crate::monitor::filter;
use crate::types::event::MonitorEvent;
use crate::types::notification::ChangeNotification;
use crate::types::subscription::SubscriptionSpec;

/// Channel through which an upstream transport pushes parsed notifications
pub fn feed_channel() -> (Sender<ChangeNotification>, Receiver<ChangeNotification>) {
    flume::unbounded()
}

pub struct LiveMonitor {
    subscription: SubscriptionSpec,
    event_tx: Sender<MonitorEvent>,
}

impl LiveMonitor {
    /// Create a monitor and the receiver the consumer reads events from
    pub fn new(subscription: SubscriptionSpec) -> (Self, Receiver<MonitorEvent>) {
        let (event_tx, event_rx) = flume::unbounded();
        (
            Self {
                subscription,
                event_tx,
            },
            event_rx,
        )
    }

    pub fn subscription(&self) -> &SubscriptionSpec {
        &self.subscription
    }

    pub fn set_subscription(&mut self, subscription: SubscriptionSpec) {
        self.subscription = subscription;
    }

    pub fn admits(&self, notification: &ChangeNotification) -> bool {
        filter::accepts(notification, &self.subscription)
    }

    /// Send a notification to the consumer.
    ///
    /// Returns false if it was dropped (ill-formed, or nobody is listening).
    pub fn deliver(&self, notification: ChangeNotification) -> bool {
        let Some(event) = MonitorEvent::from_notification(notification) else {
            return false;
        };

        match self.event_tx.send(event) {
            Ok(()) => true,
            Err(flume::SendError(event)) => {
                warn!(
                    "Consumer event channel closed, dropping {}",
                    event.notification()
                );
                false
            }
        }
    }
}
