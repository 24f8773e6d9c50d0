//! Built-in kind table.
//!
//! One row per kind; templates for every verb are derived from the row, never
//! written out by hand.

use kubeline_core::{GroupVersionKind, ResourceDescriptor, Verb};

use crate::build_templates;

pub const STANDARD: &[Verb] =
    &[Verb::Get, Verb::List, Verb::Watch, Verb::Create, Verb::Update, Verb::Patch, Verb::Delete, Verb::DeleteCollection];
/// Namespaces cannot be deleted as a collection.
pub const NO_COLLECTION_DELETE: &[Verb] =
    &[Verb::Get, Verb::List, Verb::Watch, Verb::Create, Verb::Update, Verb::Patch, Verb::Delete];
/// Standard verbs plus the `/log` subresource.
pub const WITH_LOG: &[Verb] = &[
    Verb::Get,
    Verb::List,
    Verb::Watch,
    Verb::Create,
    Verb::Update,
    Verb::Patch,
    Verb::Delete,
    Verb::DeleteCollection,
    Verb::GetLog,
];
pub const READ_ONLY: &[Verb] = &[Verb::Get, Verb::List];
/// Virtual kinds that only accept POST (reviews, bindings).
pub const CREATE_ONLY: &[Verb] = &[Verb::Create];

const LIST_VERBS: &[Verb] = &[Verb::List, Verb::ListAllNamespaces, Verb::Watch, Verb::WatchAllNamespaces];

#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
    pub verbs: &'static [Verb],
    pub status: bool,
}

impl KindSpec {
    pub const fn namespaced(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str) -> Self {
        Self { group, version, kind, plural, namespaced: true, verbs: STANDARD, status: false }
    }

    pub const fn cluster(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str) -> Self {
        Self { group, version, kind, plural, namespaced: false, verbs: STANDARD, status: false }
    }

    pub const fn with_status(self) -> Self {
        let mut out = self;
        out.status = true;
        out
    }

    pub const fn with_verbs(self, verbs: &'static [Verb]) -> Self {
        let mut out = self;
        out.verbs = verbs;
        out
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(self.group, self.version, self.kind)
    }

    pub fn descriptor(&self) -> ResourceDescriptor {
        self.to_owned_spec().descriptor()
    }

    /// `FooList` descriptor; `None` when the kind cannot be listed.
    pub fn list_descriptor(&self) -> Option<ResourceDescriptor> {
        self.to_owned_spec().list_descriptor()
    }

    fn to_owned_spec(&self) -> OwnedKindSpec {
        OwnedKindSpec {
            gvk: self.gvk(),
            plural: self.plural.to_string(),
            namespaced: self.namespaced,
            verbs: self.verbs.to_vec(),
            status_subresource: self.status,
        }
    }
}

/// Runtime counterpart of [`KindSpec`], for kinds registered from model types.
#[derive(Debug, Clone)]
pub(crate) struct OwnedKindSpec {
    pub gvk: GroupVersionKind,
    pub plural: String,
    pub namespaced: bool,
    pub verbs: Vec<Verb>,
    pub status_subresource: bool,
}

impl OwnedKindSpec {
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            gvk: self.gvk.clone(),
            plural: self.plural.clone(),
            namespaced: self.namespaced,
            status_subresource: self.status_subresource,
            item_kind: None,
            path_templates: build_templates(&self.gvk, &self.plural, self.namespaced, &self.verbs, self.status_subresource),
        }
    }

    pub fn list_descriptor(&self) -> Option<ResourceDescriptor> {
        if !self.verbs.contains(&Verb::List) {
            return None;
        }
        let verbs: Vec<Verb> = LIST_VERBS.iter().copied().filter(|v| self.verbs.contains(v)).collect();
        Some(ResourceDescriptor {
            gvk: self.gvk.with_kind(format!("{}List", self.gvk.kind)),
            plural: self.plural.clone(),
            namespaced: self.namespaced,
            status_subresource: false,
            item_kind: Some(self.gvk.kind.clone()),
            path_templates: build_templates(&self.gvk, &self.plural, self.namespaced, &verbs, false),
        })
    }
}

const fn ns(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str) -> KindSpec {
    KindSpec::namespaced(group, version, kind, plural)
}

const fn cl(group: &'static str, version: &'static str, kind: &'static str, plural: &'static str) -> KindSpec {
    KindSpec::cluster(group, version, kind, plural)
}

pub static KINDS: &[KindSpec] = &[
    // core/v1
    ns("", "v1", "Pod", "pods").with_status().with_verbs(WITH_LOG),
    ns("", "v1", "ConfigMap", "configmaps"),
    ns("", "v1", "Secret", "secrets"),
    ns("", "v1", "Service", "services").with_status(),
    ns("", "v1", "ServiceAccount", "serviceaccounts"),
    ns("", "v1", "Endpoints", "endpoints"),
    ns("", "v1", "Event", "events"),
    ns("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims").with_status(),
    ns("", "v1", "ReplicationController", "replicationcontrollers").with_status(),
    ns("", "v1", "ResourceQuota", "resourcequotas").with_status(),
    ns("", "v1", "LimitRange", "limitranges"),
    ns("", "v1", "PodTemplate", "podtemplates"),
    ns("", "v1", "Binding", "bindings").with_verbs(CREATE_ONLY),
    cl("", "v1", "Namespace", "namespaces").with_status().with_verbs(NO_COLLECTION_DELETE),
    cl("", "v1", "Node", "nodes").with_status(),
    cl("", "v1", "PersistentVolume", "persistentvolumes").with_status(),
    cl("", "v1", "ComponentStatus", "componentstatuses").with_verbs(READ_ONLY),
    // apps/v1
    ns("apps", "v1", "Deployment", "deployments").with_status(),
    ns("apps", "v1", "StatefulSet", "statefulsets").with_status(),
    ns("apps", "v1", "DaemonSet", "daemonsets").with_status(),
    ns("apps", "v1", "ReplicaSet", "replicasets").with_status(),
    ns("apps", "v1", "ControllerRevision", "controllerrevisions"),
    // batch/v1
    ns("batch", "v1", "Job", "jobs").with_status(),
    ns("batch", "v1", "CronJob", "cronjobs").with_status(),
    // autoscaling/v2
    ns("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers").with_status(),
    // networking.k8s.io/v1
    ns("networking.k8s.io", "v1", "Ingress", "ingresses").with_status(),
    ns("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies"),
    cl("networking.k8s.io", "v1", "IngressClass", "ingressclasses"),
    // discovery.k8s.io/v1
    ns("discovery.k8s.io", "v1", "EndpointSlice", "endpointslices"),
    // policy/v1
    ns("policy", "v1", "PodDisruptionBudget", "poddisruptionbudgets").with_status(),
    // rbac.authorization.k8s.io/v1
    ns("rbac.authorization.k8s.io", "v1", "Role", "roles"),
    ns("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
    cl("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles"),
    cl("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings"),
    // coordination.k8s.io/v1
    ns("coordination.k8s.io", "v1", "Lease", "leases"),
    // storage.k8s.io/v1
    cl("storage.k8s.io", "v1", "StorageClass", "storageclasses"),
    // reviews
    cl("authentication.k8s.io", "v1", "TokenReview", "tokenreviews").with_verbs(CREATE_ONLY),
    cl("authorization.k8s.io", "v1", "SelfSubjectAccessReview", "selfsubjectaccessreviews").with_verbs(CREATE_ONLY),
    // apiextensions.k8s.io/v1
    cl("apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions").with_status(),
];
