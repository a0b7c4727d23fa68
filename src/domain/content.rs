//! Content item domain model
//!
//! Content items are the unit of migration. Their `body` is an arbitrary
//! JSON document that carries its schema URI in `_meta.schema` and may embed
//! links/references to other content items.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a content item on the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    #[default]
    Active,
    Archived,
    Deleted,
}

impl ContentStatus {
    /// Returns true if the item is live (not archived or deleted)
    pub fn is_active(&self) -> bool {
        matches!(self, ContentStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Active => "ACTIVE",
            ContentStatus::Archived => "ARCHIVED",
            ContentStatus::Deleted => "DELETED",
        }
    }
}

/// A content item as stored on a hub or in an export file
///
/// Unknown top-level fields are preserved in `extra` so an export file
/// round-trips everything the hub returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    #[serde(default)]
    pub status: ContentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_repository_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_version: Option<u64>,

    #[serde(default)]
    pub body: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentItem {
    /// Creates an item with the given label and body
    pub fn new(label: impl Into<String>, body: Value) -> Self {
        Self {
            label: label.into(),
            body,
            ..Self::default()
        }
    }

    /// Sets the ID (builder style)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns the ID, or an empty string for items not yet created
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Returns the schema URI from `body._meta.schema`
    pub fn schema(&self) -> Option<&str> {
        self.body.pointer("/_meta/schema").and_then(Value::as_str)
    }

    /// Returns the hierarchy parent from `body._meta.hierarchy.parentId`
    pub fn hierarchy_parent(&self) -> Option<&str> {
        self.body
            .pointer("/_meta/hierarchy/parentId")
            .and_then(Value::as_str)
    }

    /// Returns the version, treating a missing version as 0
    pub fn version_or_zero(&self) -> u64 {
        self.version.unwrap_or(0)
    }

    /// Removes `body._meta.deliveryKey`, if present
    pub fn remove_delivery_key(&mut self) {
        if let Some(meta) = self.body.get_mut("_meta").and_then(Value::as_object_mut) {
            meta.remove("deliveryKey");
        }
    }
}

/// A content item together with the repository it belongs to in a batch
///
/// `publish` records whether the source carried a last-published marker.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub content: ContentItem,
    pub repository_id: Option<String>,
    pub publish: bool,
}

impl BatchItem {
    pub fn new(content: ContentItem, repository_id: Option<String>) -> Self {
        let publish = content.last_published_version.is_some();
        Self {
            content,
            repository_id,
            publish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_hub_json() {
        let item: ContentItem = serde_json::from_value(json!({
            "id": "abc",
            "label": "Banner",
            "version": 3,
            "status": "ARCHIVED",
            "folderId": "f1",
            "lastPublishedVersion": 2,
            "hierarchy": { "root": false },
            "body": { "_meta": { "schema": "https://example.com/banner" } }
        }))
        .unwrap();

        assert_eq!(item.id.as_deref(), Some("abc"));
        assert_eq!(item.version, Some(3));
        assert_eq!(item.status, ContentStatus::Archived);
        assert_eq!(item.schema(), Some("https://example.com/banner"));
        assert!(item.extra.contains_key("hierarchy"));
    }

    #[test]
    fn serialization_keeps_unknown_fields() {
        let mut extra = Map::new();
        extra.insert("createdBy".to_string(), json!("someone"));
        let item = ContentItem {
            extra,
            ..ContentItem::new("x", json!({}))
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["createdBy"], "someone");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn hierarchy_parent_is_read_from_meta() {
        let item = ContentItem::new(
            "child",
            json!({ "_meta": { "schema": "s", "hierarchy": { "parentId": "p1" } } }),
        );
        assert_eq!(item.hierarchy_parent(), Some("p1"));
    }

    #[test]
    fn remove_delivery_key() {
        let mut item = ContentItem::new(
            "x",
            json!({ "_meta": { "schema": "s", "deliveryKey": "home" } }),
        );
        item.remove_delivery_key();
        assert!(item.body.pointer("/_meta/deliveryKey").is_none());
    }

    #[test]
    fn batch_item_publish_flag() {
        let mut content = ContentItem::new("x", json!({}));
        assert!(!BatchItem::new(content.clone(), None).publish);

        content.last_published_version = Some(1);
        assert!(BatchItem::new(content, None).publish);
    }
}
