//! Events delivered to the consumer
//!
//! `MonitorEvent` carries a notification tagged by the signal a consumer
//! would react to; `RecorderSignal` reports queue state changes.

use serde::{Deserialize, Serialize};

use super::notification::{ChangeNotification, EntityKind, Operation};

/// A change delivered to the consumer, tagged by entity kind and operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "notification", rename_all = "snake_case")]
pub enum MonitorEvent {
    CollectionAdded(ChangeNotification),
    CollectionChanged(ChangeNotification),
    CollectionRemoved(ChangeNotification),
    CollectionMoved(ChangeNotification),
    CollectionStatisticsChanged(ChangeNotification),
    ItemAdded(ChangeNotification),
    ItemChanged(ChangeNotification),
    ItemRemoved(ChangeNotification),
    ItemMoved(ChangeNotification),
    ItemLinked(ChangeNotification),
    ItemUnlinked(ChangeNotification),
}

impl MonitorEvent {
    /// Tag a notification; `None` for ill-formed kind/operation pairs
    pub fn from_notification(notification: ChangeNotification) -> Option<Self> {
        let event = match (notification.entity_kind, notification.operation) {
            (EntityKind::Collection, Operation::Added) => Self::CollectionAdded(notification),
            (EntityKind::Collection, Operation::Changed) => Self::CollectionChanged(notification),
            (EntityKind::Collection, Operation::Removed) => Self::CollectionRemoved(notification),
            (EntityKind::Collection, Operation::Moved) => Self::CollectionMoved(notification),
            (EntityKind::Collection, Operation::StatisticsChanged) => {
                Self::CollectionStatisticsChanged(notification)
            }
            (EntityKind::Item, Operation::Added) => Self::ItemAdded(notification),
            (EntityKind::Item, Operation::Changed) => Self::ItemChanged(notification),
            (EntityKind::Item, Operation::Removed) => Self::ItemRemoved(notification),
            (EntityKind::Item, Operation::Moved) => Self::ItemMoved(notification),
            (EntityKind::Item, Operation::Linked) => Self::ItemLinked(notification),
            (EntityKind::Item, Operation::Unlinked) => Self::ItemUnlinked(notification),
            (EntityKind::Collection, Operation::Linked | Operation::Unlinked)
            | (EntityKind::Item, Operation::StatisticsChanged) => return None,
        };
        Some(event)
    }

    pub fn notification(&self) -> &ChangeNotification {
        match self {
            Self::CollectionAdded(n)
            | Self::CollectionChanged(n)
            | Self::CollectionRemoved(n)
            | Self::CollectionMoved(n)
            | Self::CollectionStatisticsChanged(n)
            | Self::ItemAdded(n)
            | Self::ItemChanged(n)
            | Self::ItemRemoved(n)
            | Self::ItemMoved(n)
            | Self::ItemLinked(n)
            | Self::ItemUnlinked(n) => n,
        }
    }

    pub fn into_notification(self) -> ChangeNotification {
        match self {
            Self::CollectionAdded(n)
            | Self::CollectionChanged(n)
            | Self::CollectionRemoved(n)
            | Self::CollectionMoved(n)
            | Self::CollectionStatisticsChanged(n)
            | Self::ItemAdded(n)
            | Self::ItemChanged(n)
            | Self::ItemRemoved(n)
            | Self::ItemMoved(n)
            | Self::ItemLinked(n)
            | Self::ItemUnlinked(n) => n,
        }
    }
}

/// Queue-level signals sent to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderSignal {
    /// New buffered work is available; the consumer should pull
    ChangesAdded,
    /// `replay_next` found an empty queue
    NothingToReplay,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = MonitorEvent::from_notification(ChangeNotification::item(1, Operation::Moved));
        assert!(matches!(event, Some(MonitorEvent::ItemMoved(_))));

        let event =
            MonitorEvent::from_notification(ChangeNotification::collection(2, Operation::Removed));
        assert!(matches!(event, Some(MonitorEvent::CollectionRemoved(_))));

        assert!(MonitorEvent::from_notification(ChangeNotification::collection(
            2,
            Operation::Unlinked
        ))
        .is_none());
    }

    #[test]
    fn test_event_keeps_notification() {
        let n = ChangeNotification::item(5, Operation::Changed).with_parts(["body"]);
        let event = MonitorEvent::from_notification(n.clone()).unwrap();
        assert_eq!(event.notification(), &n);
        assert_eq!(event.into_notification(), n);
    }
}
