//! Subscription matching and queue coalescing
//!
//! `accepts` decides whether a notification is relevant to a consumer.
//! `coalesce` folds an incoming notification into the pending queue so that
//! bursts of changes for one entity do not grow the queue unboundedly and a
//! removed entity is never replayed as existing.

use std::collections::VecDeque;
use tracing::debug;

use crate::types::notification::{ChangeNotification, EntityKind, Operation};
use crate::types::subscription::SubscriptionSpec;

/// How an incoming notification ended up in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceOutcome {
    /// Appended as a new entry
    Appended,
    /// Folded into the queued entry with this sequence
    Merged { into: u64 },
    /// A `Changed` swallowed by the queued `Added` with this sequence
    Absorbed { into: u64 },
    /// A `Removed` appended after dropping earlier entries for the entity
    Superseded { dropped: usize },
    /// An `Added` ... `Removed` run cancelled out; nothing was appended
    Collapsed { dropped: usize },
}

impl CoalesceOutcome {
    /// Whether the queue grew by one entry
    pub fn appended(&self) -> bool {
        matches!(self, Self::Appended | Self::Superseded { .. })
    }
}

/// Whether a notification falls within the consumer's interest set
pub fn accepts(notification: &ChangeNotification, subscription: &SubscriptionSpec) -> bool {
    if !notification.is_well_formed() {
        debug!("Rejecting ill-formed notification {}", notification);
        return false;
    }

    if !subscription.resources.is_empty() {
        if let Some(resource) = &notification.resource {
            if !subscription.resources.contains(resource) {
                return false;
            }
        }
    }

    if notification.entity_kind == EntityKind::Item && !subscription.mime_types.is_empty() {
        if let Some(mime_type) = &notification.mime_type {
            if !subscription.mime_types.contains(mime_type) {
                return false;
            }
        }
    }

    let collections = notification.related_collections();

    // Excluded only when every collection it touches is ignored, so a move
    // out of an ignored collection into a watched one is still reported
    if !collections.is_empty()
        && collections
            .iter()
            .all(|c| subscription.ignored_collections.contains(c))
    {
        return false;
    }

    if subscription.monitors_all() {
        return true;
    }

    if notification.entity_kind == EntityKind::Item
        && subscription.items.contains(&notification.entity_id)
    {
        return true;
    }

    collections.iter().any(|c| subscription.collections.contains(c))
}

/// Fold `incoming` into `pending`.
///
/// The first `protected` entries (the notification currently delivered to
/// the consumer) are never modified or removed. Merges only look at the
/// last `window` entries and only ever target the most recent entry for the
/// same entity, so per-entity order is preserved.
pub fn coalesce(
    pending: &mut VecDeque<ChangeNotification>,
    protected: usize,
    window: usize,
    incoming: ChangeNotification,
) -> CoalesceOutcome {
    let protected = protected.min(pending.len());

    match incoming.operation {
        Operation::Removed => supersede(pending, protected, incoming),
        Operation::Changed | Operation::StatisticsChanged => {
            let start = pending.len().saturating_sub(window).max(protected);
            let latest = (start..pending.len())
                .rev()
                .find(|&i| pending[i].same_entity(&incoming));

            match latest {
                Some(i) => merge_into(pending, i, incoming),
                None => {
                    pending.push_back(incoming);
                    CoalesceOutcome::Appended
                }
            }
        }
        Operation::Added | Operation::Moved | Operation::Linked | Operation::Unlinked => {
            pending.push_back(incoming);
            CoalesceOutcome::Appended
        }
    }
}

fn merge_into(
    pending: &mut VecDeque<ChangeNotification>,
    index: usize,
    incoming: ChangeNotification,
) -> CoalesceOutcome {
    let existing = &mut pending[index];

    match (existing.operation, incoming.operation) {
        (Operation::Changed, Operation::Changed) => {
            // An empty part set means the whole entity, which covers any other set
            if existing.changed_parts.is_empty() || incoming.changed_parts.is_empty() {
                existing.changed_parts.clear();
            } else {
                existing.changed_parts.extend(incoming.changed_parts);
            }
            existing.observed_at = incoming.observed_at;
            CoalesceOutcome::Merged {
                into: existing.sequence,
            }
        }
        (Operation::Added, Operation::Changed) => {
            // The consumer fetches the entity on Added anyway
            CoalesceOutcome::Absorbed {
                into: existing.sequence,
            }
        }
        (Operation::StatisticsChanged, Operation::StatisticsChanged) => {
            existing.observed_at = incoming.observed_at;
            CoalesceOutcome::Merged {
                into: existing.sequence,
            }
        }
        _ => {
            pending.push_back(incoming);
            CoalesceOutcome::Appended
        }
    }
}

fn supersede(
    pending: &mut VecDeque<ChangeNotification>,
    protected: usize,
    incoming: ChangeNotification,
) -> CoalesceOutcome {
    let latest_added = (protected..pending.len()).rev().find(|&i| {
        pending[i].same_entity(&incoming) && pending[i].operation == Operation::Added
    });

    match latest_added {
        Some(added) => {
            // The consumer never saw this incarnation of the entity
            let before = pending.len();
            let mut index = 0;
            pending.retain(|n| {
                let keep = index < added || !n.same_entity(&incoming);
                index += 1;
                keep
            });
            CoalesceOutcome::Collapsed {
                dropped: before - pending.len(),
            }
        }
        None => {
            let before = pending.len();
            let mut index = 0;
            pending.retain(|n| {
                let keep = index < protected || !n.same_entity(&incoming);
                index += 1;
                keep
            });
            let dropped = before - pending.len();
            pending.push_back(incoming);
            CoalesceOutcome::Superseded { dropped }
        }
    }
}
