//! Kubeline registry: maps resource types to their REST routing descriptors.
//!
//! Descriptors come from a static table (see [`builtin`]) plus anything registered
//! through [`RegistryBuilder`]. A built [`Registry`] is immutable and meant to be
//! shared behind an `Arc`; [`Registry::builtin`] memoises the default one process-wide.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kubeline_core::{Error, GroupVersionKind, PathParams, ResourceDescriptor, Result, TypeSchema, Verb};
use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

pub mod builtin;
pub mod schemas;

pub use builtin::{KindSpec, CREATE_ONLY, NO_COLLECTION_DELETE, READ_ONLY, STANDARD, WITH_LOG};

static BUILTIN: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(RegistryBuilder::new().with_builtins().build()));

#[derive(Debug, Default)]
pub struct Registry {
    by_gvk: FxHashMap<GroupVersionKind, Arc<ResourceDescriptor>>,
    schemas: FxHashMap<GroupVersionKind, &'static TypeSchema>,
}

impl Registry {
    /// Shared registry of the built-in kinds.
    pub fn builtin() -> Arc<Registry> {
        Arc::clone(&BUILTIN)
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builder seeded with this registry's descriptors and schemas.
    pub fn to_builder(&self) -> RegistryBuilder {
        RegistryBuilder {
            inner: Registry { by_gvk: self.by_gvk.clone(), schemas: self.schemas.clone() },
        }
    }

    pub fn describe(&self, gvk: &GroupVersionKind) -> Result<Arc<ResourceDescriptor>> {
        self.by_gvk.get(gvk).cloned().ok_or_else(|| Error::UnknownResourceType(gvk.key()))
    }

    /// Describe by `v1/Kind` or `group/v1/Kind` key.
    pub fn describe_key(&self, key: &str) -> Result<Arc<ResourceDescriptor>> {
        self.describe(&GroupVersionKind::parse_key(key)?)
    }

    /// Describe a generated model type by its own kind/group/version constants.
    pub fn describe_type<K: k8s_openapi::Resource>(&self) -> Result<Arc<ResourceDescriptor>> {
        self.describe(&gvk_of::<K>())
    }

    /// Descriptor of the list kind wrapping `item`'s kind.
    pub fn list_descriptor(&self, item: &ResourceDescriptor) -> Result<Arc<ResourceDescriptor>> {
        self.describe(&item.gvk.with_kind(format!("{}List", item.gvk.kind)))
    }

    /// Merge-key schema for a kind, if one is known.
    pub fn schema_for(&self, gvk: &GroupVersionKind) -> Option<&'static TypeSchema> {
        self.schemas.get(gvk).copied()
    }

    /// All item (non-list) descriptors, in stable key order.
    pub fn kinds(&self) -> Vec<Arc<ResourceDescriptor>> {
        let mut out: Vec<_> = self.by_gvk.values().filter(|d| !d.is_list()).cloned().collect();
        out.sort_by(|a, b| a.gvk.cmp(&b.gvk));
        out
    }

    pub fn len(&self) -> usize {
        self.by_gvk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_gvk.is_empty()
    }
}

/// GVK of a generated model type.
pub fn gvk_of<K: k8s_openapi::Resource>() -> GroupVersionKind {
    GroupVersionKind::new(K::GROUP, K::VERSION, K::KIND)
}

/// Scope marker of a generated model type.
pub trait ScopeFlag {
    const NAMESPACED: bool;
}

impl ScopeFlag for k8s_openapi::NamespaceResourceScope {
    const NAMESPACED: bool = true;
}

impl ScopeFlag for k8s_openapi::ClusterResourceScope {
    const NAMESPACED: bool = false;
}

/// Collects descriptors and schemas, then freezes them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    inner: Registry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(mut self) -> Self {
        for spec in builtin::KINDS {
            self = self.register(spec);
        }
        for &(key, schema) in schemas::BUILTIN_SCHEMAS {
            match GroupVersionKind::parse_key(key) {
                Ok(gvk) => self = self.register_schema(gvk, schema),
                Err(e) => warn!(key = %key, error = %e, "skipping malformed builtin schema key"),
            }
        }
        self
    }

    /// Register a kind and its list kind from a static spec.
    pub fn register(self, spec: &KindSpec) -> Self {
        let item = spec.descriptor();
        let list = spec.list_descriptor();
        let this = self.register_descriptor(item);
        match list {
            Some(list) => this.register_descriptor(list),
            None => this,
        }
    }

    /// Register a generated model type (standard verbs).
    pub fn register_type<K>(self, plural_hint: Option<&str>, status_subresource: bool) -> Self
    where
        K: k8s_openapi::Resource,
        K::Scope: ScopeFlag,
    {
        let plural = plural_hint.unwrap_or(K::URL_PATH_SEGMENT).to_string();
        self.register_owned(builtin::OwnedKindSpec {
            gvk: gvk_of::<K>(),
            plural,
            namespaced: <K::Scope as ScopeFlag>::NAMESPACED,
            verbs: STANDARD.to_vec(),
            status_subresource,
        })
    }

    fn register_owned(self, spec: builtin::OwnedKindSpec) -> Self {
        let this = self.register_descriptor(spec.descriptor());
        match spec.list_descriptor() {
            Some(list) => this.register_descriptor(list),
            None => this,
        }
    }

    /// Register the kinds of one discovered group version (`/api/v1`, `/apis/{group}/{version}`).
    ///
    /// Verbs and scope come from each entry; `<plural>/status` and `<plural>/log`
    /// entries switch on the matching subresources. Kinds already registered keep
    /// their descriptor.
    pub fn register_api_resources(mut self, list: &APIResourceList) -> Self {
        let (group, version) = match list.group_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", list.group_version.as_str()),
        };
        let subresources: FxHashSet<&str> =
            list.resources.iter().filter(|r| r.name.contains('/')).map(|r| r.name.as_str()).collect();
        let mut added = 0usize;
        for r in list.resources.iter().filter(|r| !r.name.contains('/')) {
            let gvk = GroupVersionKind::new(
                r.group.as_deref().unwrap_or(group),
                r.version.as_deref().unwrap_or(version),
                r.kind.as_str(),
            );
            if self.inner.by_gvk.contains_key(&gvk) {
                continue;
            }
            let mut verbs: Vec<Verb> = r.verbs.iter().filter_map(|v| discovery_verb(v)).collect();
            if verbs.contains(&Verb::Get) && subresources.contains(format!("{}/log", r.name).as_str()) {
                verbs.push(Verb::GetLog);
            }
            let status_subresource = subresources.contains(format!("{}/status", r.name).as_str());
            self = self.register_owned(builtin::OwnedKindSpec {
                gvk,
                plural: r.name.clone(),
                namespaced: r.namespaced,
                verbs,
                status_subresource,
            });
            added += 1;
        }
        debug!(group_version = %list.group_version, added, "discovered kinds registered");
        self
    }

    pub fn register_descriptor(mut self, descriptor: ResourceDescriptor) -> Self {
        let gvk = descriptor.gvk.clone();
        if self.inner.by_gvk.insert(gvk.clone(), Arc::new(descriptor)).is_some() {
            warn!(gvk = %gvk, "descriptor registered twice; keeping the latest");
        } else {
            debug!(gvk = %gvk, "descriptor registered");
        }
        self
    }

    pub fn register_schema(mut self, gvk: GroupVersionKind, schema: &'static TypeSchema) -> Self {
        self.inner.schemas.insert(gvk, schema);
        self
    }

    pub fn build(self) -> Registry {
        self.inner
    }
}

/// Substitute `{placeholder}`s in the descriptor's template for `verb`.
pub fn resolve_path(descriptor: &ResourceDescriptor, verb: Verb, params: &PathParams) -> Result<String> {
    let template = descriptor.template(verb)?;
    substitute(template, params)
}

fn substitute(template: &str, params: &PathParams) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| Error::MissingPathParameter {
            template: template.to_string(),
            param: after.to_string(),
        })?;
        let name = &after[..close];
        match params.get(name) {
            Some(v) if !v.is_empty() => {
                if !is_path_segment(v) {
                    return Err(Error::InvalidPathParameter { param: name.to_string(), value: v.to_string() });
                }
                out.push_str(v);
            }
            _ => return Err(Error::MissingPathParameter { template: template.to_string(), param: name.to_string() }),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Discovery verb name to the verb it enables.
fn discovery_verb(name: &str) -> Option<Verb> {
    match name {
        "get" => Some(Verb::Get),
        "list" => Some(Verb::List),
        "watch" => Some(Verb::Watch),
        "create" => Some(Verb::Create),
        "update" => Some(Verb::Update),
        "patch" => Some(Verb::Patch),
        "delete" => Some(Verb::Delete),
        "deletecollection" => Some(Verb::DeleteCollection),
        _ => None,
    }
}

/// A value that stays within one path segment.
fn is_path_segment(v: &str) -> bool {
    v != "." && v != ".." && !v.contains(|c: char| matches!(c, '/' | '?' | '#' | '%') || c.is_control())
}

/// Template map for a kind, derived from its scope, verbs and status subresource.
pub(crate) fn build_templates(
    gvk: &GroupVersionKind,
    plural: &str,
    namespaced: bool,
    verbs: &[Verb],
    status_subresource: bool,
) -> BTreeMap<Verb, String> {
    let base = if gvk.group.is_empty() {
        format!("/api/{}", gvk.version)
    } else {
        format!("/apis/{}/{}", gvk.group, gvk.version)
    };
    let all = format!("{}/{}", base, plural);
    let collection = if namespaced { format!("{}/namespaces/{{namespace}}/{}", base, plural) } else { all.clone() };
    let item = format!("{}/{{name}}", collection);

    let mut out = BTreeMap::new();
    for verb in verbs {
        match verb {
            Verb::Get | Verb::Update | Verb::Patch | Verb::Delete => {
                out.insert(*verb, item.clone());
            }
            Verb::List | Verb::Watch | Verb::Create | Verb::DeleteCollection => {
                out.insert(*verb, collection.clone());
            }
            Verb::ListAllNamespaces | Verb::WatchAllNamespaces => {
                if namespaced {
                    out.insert(*verb, all.clone());
                }
            }
            Verb::GetLog => {
                out.insert(*verb, format!("{}/log", item));
            }
            Verb::GetStatus | Verb::UpdateStatus | Verb::PatchStatus => {}
        }
    }
    if namespaced {
        if out.contains_key(&Verb::List) {
            out.insert(Verb::ListAllNamespaces, all.clone());
        }
        if out.contains_key(&Verb::Watch) {
            out.insert(Verb::WatchAllNamespaces, all.clone());
        }
    }
    if status_subresource {
        let status = format!("{}/status", item);
        if verbs.contains(&Verb::Get) {
            out.insert(Verb::GetStatus, status.clone());
        }
        if verbs.contains(&Verb::Update) {
            out.insert(Verb::UpdateStatus, status.clone());
        }
        if verbs.contains(&Verb::Patch) {
            out.insert(Verb::PatchStatus, status);
        }
    }
    out
}
