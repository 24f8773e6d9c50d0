use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{DeleteOptions, ObjectMeta};
use kubeline_core::{DeleteResult, Error, ListPage, ObjectList, PathParams, ResourceDescriptor, Result, Status, Verb};
use kubeline_patch::PatchDocument;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, Query, RequestBody, JSON_PATCH, MERGE_PATCH, STRATEGIC_MERGE_PATCH};
use crate::watch::WatchStream;

/// What the client needs to know about any object it moves over the wire.
pub trait KubeObject: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn name(&self) -> Option<&str>;
    fn namespace(&self) -> Option<&str>;
    fn resource_version(&self) -> Option<&str>;

    /// `namespace/name` (empty namespace for cluster-scoped objects).
    fn object_key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or(""), self.name().unwrap_or(""))
    }
}

impl<K> KubeObject for K
where
    K: k8s_openapi::Metadata<Ty = ObjectMeta> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }
}

/// Untyped object for kinds resolved at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawObject(pub Json);

impl RawObject {
    fn meta_str(&self, field: &str) -> Option<&str> {
        self.0.get("metadata").and_then(|m| m.get(field)).and_then(|v| v.as_str())
    }
}

impl KubeObject for RawObject {
    fn name(&self) -> Option<&str> {
        self.meta_str("name")
    }

    fn namespace(&self) -> Option<&str> {
        self.meta_str("namespace")
    }

    fn resource_version(&self) -> Option<&str> {
        self.meta_str("resourceVersion")
    }
}

/// List and watch filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
    pub resource_version: Option<String>,
    pub timeout_seconds: Option<u32>,
}

impl ListOptions {
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn query(&self) -> Query {
        let mut q: Query = Vec::new();
        if let Some(s) = &self.label_selector {
            q.push(("labelSelector", s.clone()));
        }
        if let Some(s) = &self.field_selector {
            q.push(("fieldSelector", s.clone()));
        }
        if let Some(n) = self.limit {
            q.push(("limit", n.to_string()));
        }
        if let Some(c) = &self.continue_token {
            q.push(("continue", c.clone()));
        }
        if let Some(rv) = &self.resource_version {
            q.push(("resourceVersion", rv.clone()));
        }
        if let Some(t) = self.timeout_seconds {
            q.push(("timeoutSeconds", t.to_string()));
        }
        q
    }
}

/// Options shared by create, update and patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub dry_run: bool,
    pub field_manager: Option<String>,
}

impl WriteOptions {
    fn query(&self) -> Query {
        let mut q: Query = Vec::new();
        if self.dry_run {
            q.push(("dryRun", "All".to_string()));
        }
        if let Some(m) = &self.field_manager {
            q.push(("fieldManager", m.clone()));
        }
        q
    }
}

/// Patch flavours understood by the API server.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Strategic(PatchDocument),
    Merge(Json),
    Json(Json),
}

impl Patch {
    /// RFC 6902 rendering of a computed patch against the object it was computed from.
    pub fn json_from(doc: &PatchDocument, pre_image: &Json) -> Result<Self> {
        Ok(Self::Json(doc.to_json_patch(pre_image)?))
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Strategic(_) => STRATEGIC_MERGE_PATCH,
            Self::Merge(_) => MERGE_PATCH,
            Self::Json(_) => JSON_PATCH,
        }
    }

    fn body(&self) -> Result<RequestBody> {
        match self {
            Self::Strategic(doc) => RequestBody::with_content_type(&doc.to_strategic_merge(), STRATEGIC_MERGE_PATCH),
            Self::Merge(v) => RequestBody::with_content_type(v, MERGE_PATCH),
            Self::Json(v) => RequestBody::with_content_type(v, JSON_PATCH),
        }
    }
}

/// Verb-level access to one resource kind, optionally scoped to a namespace.
pub struct TypedClient<K> {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) descriptor: Arc<ResourceDescriptor>,
    pub(crate) namespace: Option<String>,
    pub(crate) config: Arc<ClientConfig>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for TypedClient<K> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            descriptor: Arc::clone(&self.descriptor),
            namespace: self.namespace.clone(),
            config: Arc::clone(&self.config),
            _kind: PhantomData,
        }
    }
}

impl<K: KubeObject> TypedClient<K> {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        descriptor: Arc<ResourceDescriptor>,
        namespace: Option<String>,
        config: Arc<ClientConfig>,
    ) -> Self {
        // cluster-scoped kinds never carry a namespace
        let namespace = if descriptor.namespaced { namespace } else { None };
        Self { dispatcher, descriptor, namespace, config, _kind: PhantomData }
    }

    /// Same client with a different per-call deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut out = self.clone();
        out.dispatcher = self.dispatcher.with_timeout(timeout);
        out
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn params(&self, name: Option<&str>) -> PathParams {
        let mut p = PathParams::new();
        if let Some(ns) = &self.namespace {
            p.set("namespace", ns.as_str());
        }
        if let Some(n) = name {
            p.set("name", n);
        }
        p
    }

    /// List/Watch, widened to all namespaces when a namespaced kind has no namespace set.
    fn collection_verb(&self, verb: Verb) -> Verb {
        if !self.descriptor.namespaced || self.namespace.is_some() {
            return verb;
        }
        match verb {
            Verb::List => Verb::ListAllNamespaces,
            Verb::Watch => Verb::WatchAllNamespaces,
            other => other,
        }
    }

    pub async fn get(&self, name: &str) -> Result<K> {
        self.dispatcher.execute(&self.descriptor, Verb::Get, &self.params(Some(name)), &[], None).await
    }

    /// `get`, with NotFound mapped to `None`.
    pub async fn get_opt(&self, name: &str) -> Result<Option<K>> {
        match self.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(Error::Api(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_status(&self, name: &str) -> Result<K> {
        self.dispatcher.execute(&self.descriptor, Verb::GetStatus, &self.params(Some(name)), &[], None).await
    }

    /// One page.
    pub async fn list(&self, opts: &ListOptions) -> Result<ListPage<K>> {
        let verb = self.collection_verb(Verb::List);
        let list: ObjectList<K> =
            self.dispatcher.execute(&self.descriptor, verb, &self.params(None), &opts.query(), None).await?;
        Ok(list.into())
    }

    /// Every page, following continue tokens. The page size is `opts.limit` or the configured default.
    pub async fn list_all(&self, opts: &ListOptions) -> Result<ListPage<K>> {
        let mut page_opts = opts.clone();
        if page_opts.limit.is_none() {
            page_opts.limit = self.config.page_size;
        }
        let mut out = ListPage::default();
        loop {
            let page = self.list(&page_opts).await?;
            out.items.extend(page.items);
            if !page.resource_version.is_empty() {
                out.resource_version = page.resource_version;
            }
            match page.continue_token {
                Some(token) => {
                    debug!(gvk = %self.descriptor.gvk, items = out.items.len(), "following continue token");
                    page_opts.continue_token = Some(token);
                    // continued pages are served from the first page's snapshot
                    page_opts.resource_version = None;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Watch from `resource_version`. Connection errors surface as the stream's first item.
    pub fn watch(&self, resource_version: &str, opts: &ListOptions) -> WatchStream<K> {
        let verb = self.collection_verb(Verb::Watch);
        let mut query: Query = vec![("watch", "true".to_string())];
        if !resource_version.is_empty() {
            query.push(("resourceVersion", resource_version.to_string()));
        }
        if self.config.bookmarks {
            query.push(("allowWatchBookmarks", "true".to_string()));
        }
        if let Some(s) = &opts.label_selector {
            query.push(("labelSelector", s.clone()));
        }
        if let Some(s) = &opts.field_selector {
            query.push(("fieldSelector", s.clone()));
        }
        if let Some(t) = opts.timeout_seconds.or(self.config.watch_timeout_secs) {
            query.push(("timeoutSeconds", t.to_string()));
        }
        let dispatcher = self.dispatcher.clone();
        let descriptor = Arc::clone(&self.descriptor);
        let params = self.params(None);
        let connect = async move { dispatcher.open_stream(&descriptor, verb, &params, &query).await };
        WatchStream::connect(Box::pin(connect), self.config.watch_idle_timeout, resource_version)
            .with_max_line(self.config.watch_max_line_bytes)
    }

    pub async fn create(&self, obj: &K, opts: &WriteOptions) -> Result<K> {
        let body = RequestBody::json(obj)?;
        self.dispatcher.execute(&self.descriptor, Verb::Create, &self.params(None), &opts.query(), Some(body)).await
    }

    /// Full replace; the object's resourceVersion is the optimistic-concurrency precondition.
    pub async fn update(&self, obj: &K, opts: &WriteOptions) -> Result<K> {
        self.replace(Verb::Update, obj, opts).await
    }

    pub async fn update_status(&self, obj: &K, opts: &WriteOptions) -> Result<K> {
        self.replace(Verb::UpdateStatus, obj, opts).await
    }

    async fn replace(&self, verb: Verb, obj: &K, opts: &WriteOptions) -> Result<K> {
        let body = RequestBody::json(obj)?;
        self.dispatcher.execute(&self.descriptor, verb, &self.params(obj.name()), &opts.query(), Some(body)).await
    }

    pub async fn patch(&self, name: &str, patch: &Patch, opts: &WriteOptions) -> Result<K> {
        let body = patch.body()?;
        self.dispatcher.execute(&self.descriptor, Verb::Patch, &self.params(Some(name)), &opts.query(), Some(body)).await
    }

    pub async fn patch_status(&self, name: &str, patch: &Patch, opts: &WriteOptions) -> Result<K> {
        let body = patch.body()?;
        self.dispatcher
            .execute(&self.descriptor, Verb::PatchStatus, &self.params(Some(name)), &opts.query(), Some(body))
            .await
    }

    pub async fn delete(&self, name: &str, opts: &DeleteOptions) -> Result<DeleteResult<K>> {
        let body = RequestBody::json(opts)?;
        let raw = self.dispatcher.execute_raw(&self.descriptor, Verb::Delete, &self.params(Some(name)), &[], Some(body)).await?;
        decode_delete(&raw, "delete response")
    }

    pub async fn delete_collection(&self, list: &ListOptions, opts: &DeleteOptions) -> Result<DeleteResult<Vec<K>>> {
        let body = RequestBody::json(opts)?;
        let raw = self
            .dispatcher
            .execute_raw(&self.descriptor, Verb::DeleteCollection, &self.params(None), &list.query(), Some(body))
            .await?;
        let value: Json = serde_json::from_slice(&raw).map_err(|e| Error::decode("deletecollection response", e))?;
        if Status::matches(&value) {
            let st = serde_json::from_value(value).map_err(|e| Error::decode("deletecollection status", e))?;
            return Ok(DeleteResult::Status(st));
        }
        let list: ObjectList<K> = serde_json::from_value(value).map_err(|e| Error::decode("deletecollection response", e))?;
        Ok(DeleteResult::Deleted(list.items.unwrap_or_default()))
    }
}

fn decode_delete<T: DeserializeOwned>(raw: &[u8], what: &str) -> Result<DeleteResult<T>> {
    let value: Json = serde_json::from_slice(raw).map_err(|e| Error::decode(what, e))?;
    if Status::matches(&value) {
        let st = serde_json::from_value(value).map_err(|e| Error::decode(what, e))?;
        return Ok(DeleteResult::Status(st));
    }
    let obj = serde_json::from_value(value).map_err(|e| Error::decode(what, e))?;
    Ok(DeleteResult::Deleted(obj))
}
