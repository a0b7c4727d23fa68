//! Dependency marker scanning
//!
//! A dependency marker is an object embedded in a content body with the shape
//!
//! ```json
//! { "_meta": { "schema": "<content-link|content-reference URI>" },
//!   "contentType": "<uri>",
//!   "id": "<content item id>" }
//! ```
//!
//! Markers are located by JSON pointer inside the owning body, which lets the
//! importer strip or rewrite them without holding references into the tree.
//! A hierarchy parent (`_meta.hierarchy.parentId`) is reported as a synthetic
//! marker of kind [`MarkerKind::Hierarchy`].

use std::collections::HashSet;

use serde_json::Value;

/// Schema URI of an embedded content link
pub const CONTENT_LINK_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-link";

/// Schema URI of an embedded content reference
pub const CONTENT_REFERENCE_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-reference";

/// Reserved pseudo-schema for hierarchy parent pointers
pub const HIERARCHY_SCHEMA: &str = "_hierarchy";

const HIERARCHY_POINTER: &str = "/_meta/hierarchy/parentId";

/// Kind of dependency a marker expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Link,
    Reference,
    Hierarchy,
}

impl MarkerKind {
    /// Maps an embedded `_meta.schema` value to a marker kind
    ///
    /// Only the two reference-type URIs are recognized; the hierarchy
    /// pseudo-schema never appears inside a body.
    pub fn from_schema(schema: &str) -> Option<Self> {
        match schema {
            CONTENT_LINK_SCHEMA => Some(MarkerKind::Link),
            CONTENT_REFERENCE_SCHEMA => Some(MarkerKind::Reference),
            _ => None,
        }
    }

    pub fn schema(&self) -> &'static str {
        match self {
            MarkerKind::Link => CONTENT_LINK_SCHEMA,
            MarkerKind::Reference => CONTENT_REFERENCE_SCHEMA,
            MarkerKind::Hierarchy => HIERARCHY_SCHEMA,
        }
    }
}

/// A pointer from one content item to another, found in its body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyMarker {
    pub kind: MarkerKind,
    pub content_type: String,
    /// Target content item ID as found in the source body
    pub id: String,
    pointer: String,
}

impl DependencyMarker {
    /// JSON pointer of the marker object (or of `parentId` for hierarchy markers)
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    pub fn is_hierarchy(&self) -> bool {
        self.kind == MarkerKind::Hierarchy
    }
}

/// Returns the marker kind if `value` has the dependency marker shape
pub fn marker_kind(value: &Value) -> Option<MarkerKind> {
    let object = value.as_object()?;
    let kind = object
        .get("_meta")
        .and_then(|meta| meta.get("schema"))
        .and_then(Value::as_str)
        .and_then(MarkerKind::from_schema)?;

    let shaped = object.get("contentType").is_some_and(Value::is_string)
        && object.get("id").is_some_and(Value::is_string);
    shaped.then_some(kind)
}

/// Finds every dependency marker in a body
///
/// Markers are leaves: nothing inside a marker object is scanned. Missing or
/// oddly typed fields simply produce fewer markers.
pub fn scan(body: &Value) -> Vec<DependencyMarker> {
    let mut markers = Vec::new();
    let mut pointer = String::new();
    scan_value(body, &mut pointer, &mut markers);

    if let Some(parent_id) = body.pointer(HIERARCHY_POINTER).and_then(Value::as_str) {
        markers.push(DependencyMarker {
            kind: MarkerKind::Hierarchy,
            content_type: String::new(),
            id: parent_id.to_string(),
            pointer: HIERARCHY_POINTER.to_string(),
        });
    }

    markers
}

fn scan_value(value: &Value, pointer: &mut String, out: &mut Vec<DependencyMarker>) {
    match value {
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&index.to_string());
                scan_value(element, pointer, out);
                pointer.truncate(len);
            }
        }
        Value::Object(object) => {
            if let Some(kind) = marker_kind(value) {
                out.push(DependencyMarker {
                    kind,
                    content_type: string_field(value, "contentType"),
                    id: string_field(value, "id"),
                    pointer: pointer.clone(),
                });
                return;
            }

            for (key, child) in object {
                if child.is_object() || child.is_array() {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape_token(key));
                    scan_value(child, pointer, out);
                    pointer.truncate(len);
                }
            }
        }
        _ => {}
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Escapes a key for use as a JSON pointer reference token (RFC 6901)
fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Removes the embedded marker objects from a body
///
/// Object properties holding a marker are deleted; array elements holding a
/// marker are removed from the array. A hierarchy marker removes
/// `_meta.hierarchy.parentId`, which makes the item a hierarchy root.
/// Returns the number of values removed.
pub fn strip_markers(body: &mut Value, markers: &[DependencyMarker]) -> usize {
    let targets: HashSet<&str> = markers.iter().map(|marker| marker.pointer()).collect();

    if targets.is_empty() {
        return 0;
    }

    let mut pointer = String::new();
    strip_value(body, &mut pointer, &targets)
}

fn strip_value(value: &mut Value, pointer: &mut String, targets: &HashSet<&str>) -> usize {
    let mut removed = 0;

    match value {
        Value::Array(elements) => {
            let mut kept = Vec::with_capacity(elements.len());
            for (index, mut element) in std::mem::take(elements).into_iter().enumerate() {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&index.to_string());

                if targets.contains(pointer.as_str()) {
                    removed += 1;
                } else {
                    removed += strip_value(&mut element, pointer, targets);
                    kept.push(element);
                }

                pointer.truncate(len);
            }
            *elements = kept;
        }
        Value::Object(object) => {
            let keys: Vec<String> = object.keys().cloned().collect();
            for key in keys {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&escape_token(&key));

                if targets.contains(pointer.as_str()) {
                    object.remove(&key);
                    removed += 1;
                } else if let Some(child) = object.get_mut(&key) {
                    removed += strip_value(child, pointer, targets);
                }

                pointer.truncate(len);
            }
        }
        _ => {}
    }

    removed
}

/// Points a marker at a new content item ID
///
/// Hierarchy markers rewrite `_meta.hierarchy.parentId`; other markers
/// rewrite the `id` field of the embedded object. Returns false if the
/// marker no longer exists at its recorded location.
pub fn rewrite_marker(body: &mut Value, marker: &DependencyMarker, new_id: &str) -> bool {
    let target = if marker.is_hierarchy() {
        body.pointer_mut(marker.pointer())
    } else {
        body.pointer_mut(marker.pointer())
            .filter(|value| marker_kind(value).is_some())
            .and_then(|value| value.get_mut("id"))
    };

    match target {
        Some(slot) => {
            *slot = Value::String(new_id.to_string());
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(id: &str) -> Value {
        json!({
            "_meta": { "schema": CONTENT_LINK_SCHEMA },
            "contentType": "https://example.com/card",
            "id": id
        })
    }

    fn reference(id: &str) -> Value {
        json!({
            "_meta": { "schema": CONTENT_REFERENCE_SCHEMA },
            "contentType": "https://example.com/card",
            "id": id
        })
    }

    #[test]
    fn finds_links_and_references() {
        let body = json!({
            "_meta": { "schema": "https://example.com/page" },
            "hero": link("a"),
            "slots": [link("b"), { "inner": reference("c") }, reference("d")],
            "nested": { "deep": { "list": [[link("e")]] } }
        });

        let markers = scan(&body);
        let mut ids: Vec<_> = markers.iter().map(|m| m.id.as_str()).collect();
        ids.sort();

        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            markers.iter().filter(|m| m.kind == MarkerKind::Reference).count(),
            2
        );
    }

    #[test]
    fn marker_is_a_leaf() {
        let mut outer = link("outer");
        outer["extra"] = link("inner");

        let markers = scan(&json!({ "field": outer }));
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, "outer");
    }

    #[test]
    fn hierarchy_parent_adds_one_synthetic_marker() {
        let body = json!({
            "_meta": { "schema": "s", "hierarchy": { "parentId": "parent-1" } },
            "link": link("a")
        });

        let markers = scan(&body);
        assert_eq!(markers.len(), 2);

        let hierarchy: Vec<_> = markers.iter().filter(|m| m.is_hierarchy()).collect();
        assert_eq!(hierarchy.len(), 1);
        assert_eq!(hierarchy[0].id, "parent-1");
        assert_eq!(hierarchy[0].kind.schema(), "_hierarchy");
    }

    #[test]
    fn malformed_bodies_yield_fewer_markers() {
        let body = json!({
            "noSchema": { "contentType": "x", "id": "1" },
            "wrongSchema": { "_meta": { "schema": "other" }, "contentType": "x", "id": "2" },
            "numericId": { "_meta": { "schema": CONTENT_LINK_SCHEMA }, "contentType": "x", "id": 3 },
            "nullField": null,
            "meta": { "_meta": null }
        });

        assert!(scan(&body).is_empty());
        assert!(scan(&Value::Null).is_empty());
        assert!(scan(&json!("text")).is_empty());
    }

    #[test]
    fn pointers_escape_special_keys() {
        let body = json!({ "a/b": { "c~d": link("x") } });
        let markers = scan(&body);

        assert_eq!(markers[0].pointer(), "/a~1b/c~0d");
        assert!(body.pointer(markers[0].pointer()).is_some());
    }

    #[test]
    fn strip_removes_properties_and_array_elements() {
        let mut body = json!({
            "hero": link("a"),
            "slots": [link("b"), link("c"), "text", link("d")],
            "keep": link("e")
        });

        let markers = scan(&body);
        let remove: Vec<_> = markers
            .into_iter()
            .filter(|m| m.id != "c" && m.id != "e")
            .collect();

        let removed = strip_markers(&mut body, &remove);

        assert_eq!(removed, 3);
        assert!(body.get("hero").is_none());
        assert_eq!(body["slots"], json!([link("c"), "text"]));
        assert_eq!(body["keep"], link("e"));
    }

    #[test]
    fn strip_clears_hierarchy_parent() {
        let mut body = json!({
            "_meta": { "schema": "s", "hierarchy": { "root": false, "parentId": "p" } },
            "link": link("a")
        });
        let hierarchy: Vec<_> = scan(&body).into_iter().filter(|m| m.is_hierarchy()).collect();

        assert_eq!(strip_markers(&mut body, &hierarchy), 1);
        assert!(body.pointer("/_meta/hierarchy/parentId").is_none());
        assert_eq!(body["_meta"]["hierarchy"]["root"], false);
        assert_eq!(body["link"], link("a"));
        assert!(scan(&body).iter().all(|m| !m.is_hierarchy()));
    }

    #[test]
    fn rewrite_updates_link_and_parent() {
        let mut body = json!({
            "_meta": { "schema": "s", "hierarchy": { "parentId": "p" } },
            "list": [link("a")]
        });

        for marker in scan(&body) {
            let new_id = format!("new-{}", marker.id);
            assert!(rewrite_marker(&mut body, &marker, &new_id));
        }

        assert_eq!(body["list"][0]["id"], "new-a");
        assert_eq!(body["_meta"]["hierarchy"]["parentId"], "new-p");
    }

    #[test]
    fn rewrite_misses_stale_pointer() {
        let mut body = json!({ "list": [link("a")] });
        let markers = scan(&body);
        body["list"] = json!([]);

        assert!(!rewrite_marker(&mut body, &markers[0], "x"));
    }
}
