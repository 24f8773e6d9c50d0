//! Server API discovery.
//!
//! Reads `/api` and `/apis`, then one `APIResourceList` per group version (the
//! group's preferred version), and folds every reported kind into a registry.

use std::sync::Arc;

use futures::future::join_all;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroupList, APIResourceList, APIVersions};
use kubeline_core::Result;
use kubeline_registry::Registry;
use metrics::counter;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::KubeClient;

/// `base` plus every kind the server serves. A group version that fails to load is
/// skipped; `/api` and `/apis` themselves must succeed.
pub async fn discover_registry(dispatcher: &Dispatcher, base: &Registry) -> Result<Registry> {
    let core: APIVersions = dispatcher.get_path("/api").await?;
    let groups: APIGroupList = dispatcher.get_path("/apis").await?;

    let mut paths: Vec<String> = core.versions.iter().map(|v| format!("/api/{}", v)).collect();
    for group in &groups.groups {
        match group.preferred_version.as_ref().or_else(|| group.versions.first()) {
            Some(gv) => paths.push(format!("/apis/{}", gv.group_version)),
            None => warn!(group = %group.name, "group reports no versions"),
        }
    }

    let lists = join_all(paths.iter().map(|p| dispatcher.get_path::<APIResourceList>(p))).await;
    let mut builder = base.to_builder();
    let mut failed = 0usize;
    for (path, res) in paths.iter().zip(lists) {
        match res {
            Ok(list) => builder = builder.register_api_resources(&list),
            Err(e) => {
                failed += 1;
                counter!("discovery_failures", 1u64);
                warn!(path = %path, error = %e, "skipping group version");
            }
        }
    }
    let registry = builder.build();
    info!(group_versions = paths.len(), failed, descriptors = registry.len(), "api discovery complete");
    Ok(registry)
}

impl KubeClient {
    /// Same transport and config, with a registry extended by server discovery.
    /// Custom resources become reachable through [`KubeClient::dynamic`].
    pub async fn discover(&self) -> Result<KubeClient> {
        let registry = discover_registry(&self.dispatcher, &self.registry).await?;
        Ok(KubeClient { dispatcher: self.dispatcher.clone(), registry: Arc::new(registry), config: Arc::clone(&self.config) })
    }
}
