use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use kube::{Api, Client};
use mmd_common::{is_eligible, Error, NodeInfo};
use mmd_types::{BaseModel, ClusterBaseModel, ModelResource, Provider, Task, TaskType};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

/// What the Watcher remembers about a resource between events, enough to
/// decide whether a subsequent `Applied` is a material change (§4.A
/// "Update: diff labels, annotations, and spec").
#[derive(Debug, Clone, PartialEq)]
struct CachedEntry {
    labels: std::collections::BTreeMap<String, String>,
    annotations: std::collections::BTreeMap<String, String>,
    spec: mmd_types::ModelStorageSpec,
    eligible: bool,
}

impl CachedEntry {
    fn from(resource: &ModelResource, eligible: bool) -> Self {
        CachedEntry {
            labels: resource.labels().clone(),
            annotations: resource.annotations().clone(),
            spec: resource.storage().clone(),
            eligible,
        }
    }
}

/// Watches both CRD kinds, maintains a local per-resource cache keyed by
/// UID, and dispatches `Task`s onto the two channels (§4.A, §4.B).
pub struct ResourceWatcher {
    client: Client,
    node_name: String,
    cache: Arc<RwLock<HashMap<String, CachedEntry>>>,
    node_info: Arc<RwLock<NodeInfo>>,
    download_tx: mpsc::Sender<Task>,
    delete_tx: mpsc::Sender<Task>,
}

impl ResourceWatcher {
    pub fn new(
        client: Client,
        node_name: String,
        node_info: NodeInfo,
        download_tx: mpsc::Sender<Task>,
        delete_tx: mpsc::Sender<Task>,
    ) -> Self {
        ResourceWatcher {
            client,
            node_name,
            cache: Arc::new(RwLock::new(HashMap::new())),
            node_info: Arc::new(RwLock::new(node_info)),
            download_tx,
            delete_tx,
        }
    }

    /// Drives both the namespaced and cluster-scoped watch streams
    /// concurrently; returns as soon as either hits a fatal (unauthorized or
    /// forbidden) error (§4.A "Failure semantics").
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let namespaced: Api<BaseModel> = Api::all(self.client.clone());
        let cluster: Api<ClusterBaseModel> = Api::all(self.client.clone());

        let this_ns = self.clone();
        let this_cluster = self.clone();

        let ns_fut = async move { this_ns.watch_kind(namespaced).await };
        let cluster_fut = async move { this_cluster.watch_kind(cluster).await };

        tokio::select! {
            result = ns_fut => result,
            result = cluster_fut => result,
        }
    }

    async fn watch_kind<K>(&self, api: Api<K>) -> Result<(), Error>
    where
        K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
        K::DynamicType: Default,
        ModelResource: From<K>,
    {
        let mut stream = std::pin::pin!(watcher::watcher(api, watcher::Config::default()));
        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Applied(resource)) => self.handle_applied(resource.into()).await,
                Ok(Event::Deleted(resource)) => self.handle_deleted(resource.into()).await,
                Ok(Event::Restarted(resources)) => {
                    self.handle_restarted(resources.into_iter().map(ModelResource::from).collect())
                        .await
                }
                Err(err) => {
                    if is_fatal(&err) {
                        error!(error = %err, "watch stream failed with an unauthorized/forbidden error");
                        return Err(Error::WatchFatal(err.to_string()));
                    }
                    warn!(error = %err, "watch stream error, retrying");
                }
            }
        }
        Ok(())
    }

    /// Covers both genuine startup relists and any desync recovery the
    /// underlying stream performs later; every listed resource is treated
    /// exactly as the initial list in §4.A ("recovery for events missed
    /// while the daemon was offline").
    async fn handle_restarted(&self, resources: Vec<ModelResource>) {
        for resource in resources {
            self.handle_applied(resource).await;
        }
    }

    async fn handle_applied(&self, resource: ModelResource) {
        let uid = resource.uid().to_string();
        if resource.is_deleting() {
            self.dispatch_delete(resource).await;
            return;
        }

        self.refresh_node_info().await;
        let node_info = self.node_info.read().await.clone();
        let eligible_now = is_eligible(&resource, &node_info);
        let new_entry = CachedEntry::from(&resource, eligible_now);

        let previous = self.cache.write().await.insert(uid.clone(), new_entry.clone());
        match previous {
            None => {
                if eligible_now {
                    self.dispatch_download(resource, TaskType::Download).await;
                }
            }
            Some(prev) => {
                if prev.eligible && !eligible_now {
                    self.dispatch_delete(resource).await;
                    return;
                }
                if !eligible_now {
                    return;
                }
                let material_change = prev.labels != new_entry.labels
                    || prev.annotations != new_entry.annotations
                    || prev.spec != new_entry.spec;
                if !material_change {
                    return;
                }
                self.dispatch_download(resource, TaskType::DownloadOverride).await;
            }
        }
    }

    async fn handle_deleted(&self, resource: ModelResource) {
        self.cache.write().await.remove(resource.uid());
        self.dispatch_delete(resource).await;
    }

    async fn refresh_node_info(&self) {
        match mmd_common::k8s::get_node_info(self.client.clone(), &self.node_name).await {
            Ok(info) => *self.node_info.write().await = info,
            Err(err) => warn!(error = %err, "failed to refresh node info, using stale cache"),
        }
    }

    async fn dispatch_download(&self, resource: ModelResource, task_type: TaskType) {
        let key = resource.model_key();
        info!(model = %key, task_type = ?task_type, "dispatching download task");
        if self
            .download_tx
            .send(Task::new(task_type, resource))
            .await
            .is_err()
        {
            error!(model = %key, "download channel closed, dropping task");
        }
    }

    async fn dispatch_delete(&self, resource: ModelResource) {
        let key = resource.model_key();
        info!(model = %key, "dispatching delete task");
        if self
            .delete_tx
            .send(Task::new(TaskType::Delete, resource))
            .await
            .is_err()
        {
            error!(model = %key, "delete channel closed, dropping task");
        }
    }
}

fn is_hub_uri(storage_uri: &str) -> bool {
    mmd_types::ObjectLocator::parse(storage_uri)
        .map(|locator| locator.provider == Some(Provider::Hub))
        .unwrap_or(false)
}

/// Unauthorized/forbidden failures are the one case §4.A calls fatal; every
/// other list/watch error is left to the underlying stream's own retry
/// backoff. Matched on the error's rendered text rather than its variant
/// shape since the wrapped `kube::Error::Api` carries the HTTP status as a
/// plain integer either way.
fn is_fatal(err: &watcher::Error) -> bool {
    let text = err.to_string();
    text.contains("401") || text.contains("403") || text.contains("Unauthorized") || text.contains("Forbidden")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmd_types::{BaseModel, ModelStorageSpec};

    fn resource(storage_uri: &str, download_policy: mmd_types::DownloadPolicy) -> ModelResource {
        let spec = ModelStorageSpec {
            storage_uri: storage_uri.to_string(),
            download_policy,
            ..Default::default()
        };
        let mut bm = BaseModel::new("demo", mmd_types::BaseModelSpec { storage: spec });
        bm.metadata.namespace = Some("default".to_string());
        bm.metadata.uid = Some("uid-1".to_string());
        bm.into()
    }

    #[test]
    fn is_hub_uri_detects_hf_scheme() {
        assert!(is_hub_uri("hf://org/model"));
        assert!(!is_hub_uri("s3://bucket/prefix"));
        assert!(!is_hub_uri("not a uri"));
    }

    #[test]
    fn cached_entry_detects_policy_change_on_hub_uri() {
        let before = resource("hf://org/model", mmd_types::DownloadPolicy::AlwaysDownload);
        let after = resource("hf://org/model", mmd_types::DownloadPolicy::ReuseIfExists);
        let prev = CachedEntry::from(&before, true);
        let new_entry = CachedEntry::from(&after, true);
        assert_ne!(prev.spec, new_entry.spec);
        let forces_override =
            prev.spec.download_policy != new_entry.spec.download_policy && is_hub_uri(&new_entry.spec.storage_uri);
        assert!(forces_override);
    }

    #[test]
    fn policy_change_on_non_hub_uri_does_not_force_override() {
        let before = resource("s3://bucket/prefix", mmd_types::DownloadPolicy::AlwaysDownload);
        let after = resource("s3://bucket/prefix", mmd_types::DownloadPolicy::ReuseIfExists);
        let prev = CachedEntry::from(&before, true);
        let new_entry = CachedEntry::from(&after, true);
        let forces_override =
            prev.spec.download_policy != new_entry.spec.download_policy && is_hub_uri(&new_entry.spec.storage_uri);
        assert!(!forces_override);
    }
}
