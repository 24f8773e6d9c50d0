use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Error, Result};

/// Group/Version/Kind identity of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// Empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// Build from a wire `apiVersion` (`v1` or `apps/v1`) and a kind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((g, v)) => Self::new(g, v, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// Parse a key of the form `v1/Kind` or `group/v1/Kind`.
    pub fn parse_key(key: &str) -> Result<Self> {
        let parts: Vec<_> = key.split('/').collect();
        match parts.as_slice() {
            [version, kind] if !version.is_empty() && !kind.is_empty() => Ok(Self::new("", *version, *kind)),
            [group, version, kind] if !group.is_empty() && !version.is_empty() && !kind.is_empty() => {
                Ok(Self::new(*group, *version, *kind))
            }
            _ => Err(Error::InvalidResourceKey(key.to_string())),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// Same GV, different kind (used to derive `FooList` from `Foo`).
    pub fn with_kind(&self, kind: impl Into<String>) -> Self {
        Self { group: self.group.clone(), version: self.version.clone(), kind: kind.into() }
    }

    pub fn key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// REST verbs a descriptor may expose a path template for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verb {
    Get,
    List,
    /// Cluster-wide list of a namespaced kind.
    ListAllNamespaces,
    Watch,
    WatchAllNamespaces,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
    GetStatus,
    UpdateStatus,
    PatchStatus,
    /// Container log text of a single object (`/log` subresource).
    GetLog,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Verb::Get,
        Verb::List,
        Verb::ListAllNamespaces,
        Verb::Watch,
        Verb::WatchAllNamespaces,
        Verb::Create,
        Verb::Update,
        Verb::Patch,
        Verb::Delete,
        Verb::DeleteCollection,
        Verb::GetStatus,
        Verb::UpdateStatus,
        Verb::PatchStatus,
        Verb::GetLog,
    ];

    /// HTTP method used on the wire.
    pub fn method(self) -> &'static str {
        match self {
            Verb::Get | Verb::List | Verb::ListAllNamespaces | Verb::Watch | Verb::WatchAllNamespaces | Verb::GetStatus | Verb::GetLog => {
                "GET"
            }
            Verb::Create => "POST",
            Verb::Update | Verb::UpdateStatus => "PUT",
            Verb::Patch | Verb::PatchStatus => "PATCH",
            Verb::Delete | Verb::DeleteCollection => "DELETE",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::ListAllNamespaces => "list-all-namespaces",
            Verb::Watch => "watch",
            Verb::WatchAllNamespaces => "watch-all-namespaces",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "deletecollection",
            Verb::GetStatus => "get-status",
            Verb::UpdateStatus => "update-status",
            Verb::PatchStatus => "patch-status",
            Verb::GetLog => "get-log",
        }
    }

    /// Verbs a caller may safely repeat. Create/Update are never in this set.
    pub fn is_idempotent(self) -> bool {
        !matches!(self, Verb::Create | Verb::Update | Verb::UpdateStatus | Verb::Patch | Verb::PatchStatus)
    }

    /// Verbs whose template addresses a single named object.
    pub fn is_singular(self) -> bool {
        matches!(
            self,
            Verb::Get
                | Verb::Update
                | Verb::Patch
                | Verb::Delete
                | Verb::GetStatus
                | Verb::UpdateStatus
                | Verb::PatchStatus
                | Verb::GetLog
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST routing information for one resource kind (or its list kind).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub gvk: GroupVersionKind,
    /// URL path segment, e.g. `pods`.
    pub plural: String,
    pub namespaced: bool,
    pub status_subresource: bool,
    /// Set on list descriptors: the kind of the items.
    pub item_kind: Option<String>,
    pub path_templates: BTreeMap<Verb, String>,
}

impl ResourceDescriptor {
    pub fn is_list(&self) -> bool {
        self.item_kind.is_some()
    }

    pub fn supports(&self, verb: Verb) -> bool {
        self.path_templates.contains_key(&verb)
    }

    pub fn template(&self, verb: Verb) -> Result<&str> {
        self.path_templates
            .get(&verb)
            .map(String::as_str)
            .ok_or_else(|| Error::UnsupportedVerb { kind: self.gvk.key(), verb })
    }

    pub fn verbs(&self) -> impl Iterator<Item = Verb> + '_ {
        self.path_templates.keys().copied()
    }
}

/// Values for `{placeholder}`s in a path template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: SmallVec<[(String, String); 2]>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(self, ns: impl Into<String>) -> Self {
        self.with("namespace", ns)
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.with("name", name)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_handles_core_and_grouped() {
        let core = GroupVersionKind::parse_key("v1/ConfigMap").expect("ok");
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
        let apps = GroupVersionKind::parse_key("apps/v1/Deployment").expect("ok");
        assert_eq!(apps.api_version(), "apps/v1");
        assert_eq!(apps.key(), "apps/v1/Deployment");
    }

    #[test]
    fn parse_key_rejects_malformed() {
        assert!(GroupVersionKind::parse_key("invalid").is_err());
        assert!(GroupVersionKind::parse_key("").is_err());
        assert!(GroupVersionKind::parse_key("a/b/c/d").is_err());
        assert!(GroupVersionKind::parse_key("/v1/Pod").is_err());
    }

    #[test]
    fn from_api_version_splits_group() {
        let g = GroupVersionKind::from_api_version("batch/v1", "Job");
        assert_eq!(g, GroupVersionKind::new("batch", "v1", "Job"));
        let c = GroupVersionKind::from_api_version("v1", "Pod");
        assert_eq!(c, GroupVersionKind::new("", "v1", "Pod"));
    }

    #[test]
    fn path_params_overwrite_existing_keys() {
        let p = PathParams::new().namespace("a").name("x").namespace("b");
        assert_eq!(p.get("namespace"), Some("b"));
        assert_eq!(p.get("name"), Some("x"));
        assert_eq!(p.get("other"), None);
    }

    #[test]
    fn verbs_map_to_http_methods() {
        assert_eq!(Verb::Create.method(), "POST");
        assert_eq!(Verb::PatchStatus.method(), "PATCH");
        assert_eq!(Verb::DeleteCollection.method(), "DELETE");
        assert!(Verb::Get.is_idempotent());
        assert!(!Verb::Create.is_idempotent());
    }
}
