//! Change notification records
//!
//! A `ChangeNotification` describes one observed mutation on the groupware
//! server: which entity, what happened to it, and where it lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque server-side identifier of a collection or an item
pub type EntityId = u64;

/// Sequence number meaning "never enqueued" (pass-through deliveries)
pub const UNSEQUENCED: u64 = 0;

/// Kind of entity a notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Collection,
    Item,
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Added,
    Changed,
    Removed,
    Moved,
    StatisticsChanged,
    Linked,
    Unlinked,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Moved => "moved",
            Self::StatisticsChanged => "statistics_changed",
            Self::Linked => "linked",
            Self::Unlinked => "unlinked",
        }
    }
}

/// One observed mutation on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    pub operation: Operation,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub destination_parent_id: Option<EntityId>,
    /// Parts touched by a `Changed`; empty means the whole entity
    #[serde(default)]
    pub changed_parts: BTreeSet<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// Stamped by the queue on enqueue, `UNSEQUENCED` otherwise
    #[serde(default)]
    pub sequence: u64,
}

impl ChangeNotification {
    pub fn new(entity_kind: EntityKind, entity_id: EntityId, operation: Operation) -> Self {
        Self {
            entity_id,
            entity_kind,
            operation,
            parent_id: None,
            destination_parent_id: None,
            changed_parts: BTreeSet::new(),
            mime_type: None,
            resource: None,
            observed_at: Utc::now(),
            sequence: UNSEQUENCED,
        }
    }

    pub fn item(entity_id: EntityId, operation: Operation) -> Self {
        Self::new(EntityKind::Item, entity_id, operation)
    }

    pub fn collection(entity_id: EntityId, operation: Operation) -> Self {
        Self::new(EntityKind::Collection, entity_id, operation)
    }

    pub fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_destination(mut self, destination_parent_id: EntityId) -> Self {
        self.destination_parent_id = Some(destination_parent_id);
        self
    }

    pub fn with_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_parts = parts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Whether both notifications refer to the same server entity
    pub fn same_entity(&self, other: &ChangeNotification) -> bool {
        self.entity_kind == other.entity_kind && self.entity_id == other.entity_id
    }

    /// Collections this notification touches, for subscription matching
    pub fn related_collections(&self) -> Vec<EntityId> {
        let mut ids = Vec::with_capacity(3);
        if self.entity_kind == EntityKind::Collection {
            ids.push(self.entity_id);
        }
        ids.extend(self.parent_id);
        ids.extend(self.destination_parent_id);
        ids
    }

    /// Linking applies to items only, statistics to collections only
    pub fn is_well_formed(&self) -> bool {
        match (self.entity_kind, self.operation) {
            (EntityKind::Collection, Operation::Linked | Operation::Unlinked) => false,
            (EntityKind::Item, Operation::StatisticsChanged) => false,
            _ => true,
        }
    }

    /// Content equality, ignoring the sequence stamp and timestamp
    pub fn same_change(&self, other: &ChangeNotification) -> bool {
        self.same_entity(other)
            && self.operation == other.operation
            && self.parent_id == other.parent_id
            && self.destination_parent_id == other.destination_parent_id
            && self.changed_parts == other.changed_parts
    }
}

impl fmt::Display for ChangeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.entity_kind {
            EntityKind::Collection => "collection",
            EntityKind::Item => "item",
        };
        write!(
            f,
            "#{} {} {} {}",
            self.sequence,
            kind,
            self.entity_id,
            self.operation.as_str()
        )
    }
}
