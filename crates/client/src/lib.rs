//! Kubeline client: verb dispatch, typed per-kind clients, watch streams, list-watch
//! subscriptions, server discovery and pod logs.

#![forbid(unsafe_code)]

use std::sync::Arc;

use kubeline_core::{ResourceDescriptor, Result};
use kubeline_registry::Registry;

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod logs;
pub mod reconcile;
pub mod transport;
pub mod typed;
pub mod watch;

pub use config::ClientConfig;
pub use discovery::discover_registry;
pub use dispatcher::{Dispatcher, RequestBody};
pub use logs::{LogLines, LogOptions};
pub use reconcile::Subscription;
pub use transport::{ByteStream, HttpRequest, HttpResponse, KubeTransport, Transport};
pub use typed::{KubeObject, ListOptions, Patch, RawObject, TypedClient, WriteOptions};
pub use watch::{WatchState, WatchStream};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::DeleteOptions;
pub use kubeline_core::{DeleteResult, Error, KubeApiError, ListPage, Status, WatchEvent, WatchEventType};

/// Entry point: a transport, a registry and a config, handing out [`TypedClient`]s.
#[derive(Clone)]
pub struct KubeClient {
    dispatcher: Dispatcher,
    registry: Arc<Registry>,
    config: Arc<ClientConfig>,
}

impl KubeClient {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<Registry>, config: ClientConfig) -> Self {
        let dispatcher = Dispatcher::new(transport, config.request_timeout);
        Self { dispatcher, registry, config: Arc::new(config) }
    }

    /// Ambient kubeconfig, built-in registry, `KUBELINE_*` config.
    pub async fn try_default() -> Result<Self> {
        let transport = KubeTransport::try_default().await?;
        Ok(Self::new(Arc::new(transport), Registry::builtin(), ClientConfig::from_env()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Client scoped to one namespace (ignored for cluster-scoped kinds).
    pub fn namespaced<K>(&self, namespace: &str) -> Result<TypedClient<K>>
    where
        K: k8s_openapi::Resource + KubeObject,
    {
        let descriptor = self.registry.describe_type::<K>()?;
        Ok(self.for_descriptor(descriptor, Some(namespace.to_string())))
    }

    /// Client for the configured default namespace.
    pub fn default_namespaced<K>(&self) -> Result<TypedClient<K>>
    where
        K: k8s_openapi::Resource + KubeObject,
    {
        let ns = self.config.default_namespace.clone();
        self.namespaced(&ns)
    }

    /// Client spanning all namespaces (list/watch), or a cluster-scoped kind.
    pub fn all<K>(&self) -> Result<TypedClient<K>>
    where
        K: k8s_openapi::Resource + KubeObject,
    {
        let descriptor = self.registry.describe_type::<K>()?;
        Ok(self.for_descriptor(descriptor, None))
    }

    /// Client for a descriptor resolved at runtime, usually with [`RawObject`].
    pub fn for_descriptor<K: KubeObject>(&self, descriptor: Arc<ResourceDescriptor>, namespace: Option<String>) -> TypedClient<K> {
        TypedClient::new(self.dispatcher.clone(), descriptor, namespace, Arc::clone(&self.config))
    }

    /// Dynamic client from a `v1/Kind` or `group/version/Kind` key. Kinds outside the
    /// built-in table need a registry from [`KubeClient::discover`] or a custom builder.
    pub fn dynamic(&self, key: &str, namespace: Option<&str>) -> Result<TypedClient<RawObject>> {
        let descriptor = self.registry.describe_key(key)?;
        Ok(self.for_descriptor(descriptor, namespace.map(str::to_string)))
    }
}
