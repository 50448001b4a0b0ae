use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::notification::EntityId;

/// Sentinel collection meaning "every collection"
pub const ROOT_COLLECTION: EntityId = 0;

/// The consumer's interest set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Monitored collections, `ROOT_COLLECTION` for all
    #[serde(default)]
    pub collections: BTreeSet<EntityId>,
    /// Explicitly monitored items
    #[serde(default)]
    pub items: BTreeSet<EntityId>,
    /// Item mime types of interest (empty = any)
    #[serde(default)]
    pub mime_types: BTreeSet<String>,
    /// Resources of interest (empty = any)
    #[serde(default)]
    pub resources: BTreeSet<String>,
    /// Collections whose changes are never reported
    #[serde(default)]
    pub ignored_collections: BTreeSet<EntityId>,
    /// Consumers want the full item payload fetched alongside notifications
    #[serde(default)]
    pub fetch_item_payload: bool,
    /// Consumers want full collection data fetched alongside notifications
    #[serde(default)]
    pub fetch_collection: bool,
}

impl SubscriptionSpec {
    /// Subscription covering every collection
    pub fn monitor_all() -> Self {
        Self::default().monitor_collection(ROOT_COLLECTION)
    }

    pub fn monitor_collection(mut self, collection: EntityId) -> Self {
        self.collections.insert(collection);
        self
    }

    pub fn monitor_item(mut self, item: EntityId) -> Self {
        self.items.insert(item);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_types.insert(mime_type.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    pub fn ignore_collection(mut self, collection: EntityId) -> Self {
        self.ignored_collections.insert(collection);
        self
    }

    pub fn with_item_payload(mut self, fetch: bool) -> Self {
        self.fetch_item_payload = fetch;
        self
    }

    pub fn with_collection_data(mut self, fetch: bool) -> Self {
        self.fetch_collection = fetch;
        self
    }

    pub fn monitors_all(&self) -> bool {
        self.collections.contains(&ROOT_COLLECTION)
    }
}
