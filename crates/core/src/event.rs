use serde::{Deserialize, Serialize};

/// Wire value of a watch envelope's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
    Bookmark,
}

/// One change notification, delivered in server emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<K> {
    pub event_type: WatchEventType,
    /// `None` only for bookmarks, which carry nothing but a resourceVersion.
    pub object: Option<K>,
    pub resource_version: String,
}

impl<K> WatchEvent<K> {
    pub fn added(object: K, resource_version: impl Into<String>) -> Self {
        Self { event_type: WatchEventType::Added, object: Some(object), resource_version: resource_version.into() }
    }

    pub fn modified(object: K, resource_version: impl Into<String>) -> Self {
        Self { event_type: WatchEventType::Modified, object: Some(object), resource_version: resource_version.into() }
    }

    pub fn deleted(object: K, resource_version: impl Into<String>) -> Self {
        Self { event_type: WatchEventType::Deleted, object: Some(object), resource_version: resource_version.into() }
    }

    pub fn bookmark(resource_version: impl Into<String>) -> Self {
        Self { event_type: WatchEventType::Bookmark, object: None, resource_version: resource_version.into() }
    }
}

/// Result of a single List call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<K> {
    pub items: Vec<K>,
    /// resourceVersion of the list as a whole.
    pub resource_version: String,
    pub continue_token: Option<String>,
}

impl<K> Default for ListPage<K> {
    fn default() -> Self {
        Self { items: Vec::new(), resource_version: String::new(), continue_token: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<i64>,
}

/// `FooList` body as returned by the API server.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectList<K> {
    #[serde(default)]
    pub metadata: ListMeta,
    // no `#[serde(default)]`: it would bound `K: Default`
    pub items: Option<Vec<K>>,
}

impl<K> From<ObjectList<K>> for ListPage<K> {
    fn from(list: ObjectList<K>) -> Self {
        let continue_token = list.metadata.continue_.filter(|c| !c.is_empty());
        Self {
            items: list.items.unwrap_or_default(),
            resource_version: list.metadata.resource_version.unwrap_or_default(),
            continue_token,
        }
    }
}

/// The API server's `Status` object (errors, and some delete responses).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub code: u16,
}

impl Status {
    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }

    /// Whether a JSON document is a `Status` rather than the requested object.
    pub fn matches(raw: &serde_json::Value) -> bool {
        raw.get("kind").and_then(|k| k.as_str()) == Some("Status")
    }
}

/// Delete responses are either the object (deletion pending finalizers) or a `Status`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteResult<K> {
    Deleted(K),
    Status(Status),
}

impl<K> DeleteResult<K> {
    pub fn into_object(self) -> Option<K> {
        match self {
            Self::Deleted(k) => Some(k),
            Self::Status(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_list_tolerates_null_items_and_empty_continue() {
        let raw = serde_json::json!({
            "kind": "ConfigMapList",
            "metadata": { "resourceVersion": "100", "continue": "" },
            "items": null
        });
        let list: ObjectList<serde_json::Value> = serde_json::from_value(raw).expect("decode");
        let page: ListPage<_> = list.into();
        assert!(page.items.is_empty());
        assert_eq!(page.resource_version, "100");
        assert_eq!(page.continue_token, None);
    }

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn object_list_decodes_items_without_default() {
        let list: ObjectList<Named> =
            serde_json::from_value(serde_json::json!({ "metadata": {}, "items": [{ "name": "a" }] })).expect("decode");
        let page: ListPage<Named> = list.into();
        assert_eq!(page.items[0].name, "a");

        let missing: ObjectList<Named> = serde_json::from_value(serde_json::json!({})).expect("decode");
        assert!(ListPage::from(missing).items.is_empty());
    }

    #[test]
    fn event_type_uses_wire_names() {
        let t: WatchEventType = serde_json::from_str("\"BOOKMARK\"").expect("decode");
        assert_eq!(t, WatchEventType::Bookmark);
        assert_eq!(serde_json::to_string(&WatchEventType::Added).unwrap(), "\"ADDED\"");
    }
}
