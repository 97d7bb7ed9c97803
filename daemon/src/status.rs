use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use mmd_common::{catalog_configmap_name, node_label_key, Error, NodeLabelState, CATALOG_DATA_KEY};
use mmd_types::{ArtifactStatus, Catalog, ModelMetadata, ProgressInfo};
use tokio::sync::Mutex;
use tracing::{info, warn};

const MANAGER_NAME: &str = "model-materializer";
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Serializes every node-label patch and catalog read-modify-write (§4.H
/// "all public updates flow through a single serializing mutex"). The
/// catalog itself lives in a per-node ConfigMap keyed by `nodeName`.
pub struct StatusPublisher {
    client: Client,
    node_name: String,
    label_prefix: String,
    namespace: String,
    lock: Mutex<()>,
}

impl StatusPublisher {
    pub fn new(client: Client, node_name: String, label_prefix: String, namespace: String) -> Self {
        StatusPublisher {
            client,
            node_name,
            label_prefix,
            namespace,
            lock: Mutex::new(()),
        }
    }

    async fn read_catalog(&self) -> Result<(Catalog, Option<String>), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(&catalog_configmap_name(&self.node_name)).await {
            Ok(cm) => {
                let resource_version = cm.metadata.resource_version.clone();
                let catalog = cm
                    .data
                    .as_ref()
                    .and_then(|d| d.get(CATALOG_DATA_KEY))
                    .map(|s| serde_json::from_str(s))
                    .transpose()?
                    .unwrap_or_default();
                Ok((catalog, resource_version))
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok((Catalog::new(), None)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_catalog(&self, catalog: &Catalog) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let name = catalog_configmap_name(&self.node_name);
        let mut data = BTreeMap::new();
        data.insert(CATALOG_DATA_KEY.to_string(), serde_json::to_string(catalog)?);
        let cm = ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        match api.get(&name).await {
            Ok(_) => match api.replace(&name, &PostParams::default(), &cm).await {
                Ok(_) => {}
                Err(kube::Error::Api(ae)) if ae.code == 409 => return Err(Error::CatalogConflict),
                Err(e) => return Err(e.into()),
            },
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                api.create(&PostParams::default(), &cm).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Writes `catalog`, retrying from a fresh read on
    /// [`Error::CatalogConflict`] (§7 "Catalog conflict ... retry with
    /// fresh read-modify-write"). `mutate` is re-applied to each fresh read
    /// so a concurrent writer's change is never silently dropped.
    async fn write_catalog_retrying(
        &self,
        mut catalog: Catalog,
        mutate: impl Fn(&mut Catalog),
    ) -> Result<(), Error> {
        for attempt in 0.. {
            match self.write_catalog(&catalog).await {
                Ok(()) => return Ok(()),
                Err(Error::CatalogConflict) if attempt + 1 < MAX_CONFLICT_RETRIES => {
                    warn!(attempt, "catalog write conflict, retrying with fresh read");
                    catalog = self.read_catalog().await?.0;
                    mutate(&mut catalog);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns before exhausting its range")
    }

    /// Updates the node label and catalog entry for `model_key` to `state`.
    /// Idempotent: both steps compare current vs. desired and skip when
    /// equal (§4.H).
    pub async fn set_state(&self, model_key: &str, state: NodeLabelState) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.patch_node_label_retrying(model_key, Some(state)).await?;
        let mut catalog = self.read_catalog().await?.0;
        let desired = artifact_status_for(state);
        let already_set = catalog.get(model_key).and_then(|e| e.status) == Some(desired);
        if !already_set {
            let apply = |catalog: &mut Catalog| {
                catalog.entry(model_key.to_string()).or_default().status = Some(desired);
            };
            apply(&mut catalog);
            self.write_catalog_retrying(catalog, apply).await?;
        }
        Ok(())
    }

    /// Removes both the node label and the catalog entry (§4.H `remove`).
    pub async fn remove(&self, model_key: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.patch_node_label_retrying(model_key, None).await?;
        let mut catalog = self.read_catalog().await?.0;
        if catalog.remove(model_key).is_some() {
            self.write_catalog_retrying(catalog, |catalog| {
                catalog.remove(model_key);
            })
            .await?;
        }
        Ok(())
    }

    pub async fn set_metadata(
        &self,
        model_key: &str,
        metadata: ModelMetadata,
        fingerprint: Option<(String, String)>,
    ) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.read_catalog().await?.0;
        let model_key_owned = model_key.to_string();
        let apply = move |catalog: &mut Catalog| {
            let entry = catalog.entry(model_key_owned.clone()).or_default();
            entry.metadata = metadata.clone();
            if let Some((content_sha, destination_path)) = fingerprint.clone() {
                entry.artifact.content_sha = content_sha;
                entry.artifact.parent_paths.insert(model_key_owned.clone(), destination_path);
            }
        };
        apply(&mut catalog);
        self.write_catalog_retrying(catalog, apply).await
    }

    /// Read-only snapshot of the current catalog, for collaborators (the
    /// Artifact Reuse Manager) that only need to consult it, not mutate it.
    pub async fn catalog_snapshot(&self) -> Result<Catalog, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.read_catalog().await?.0)
    }

    /// `(read, append, write)` per §4.F.
    pub async fn append_child_path(&self, matched_key: &str, new_path: String) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.read_catalog().await?.0;
        if catalog.get(matched_key).map(|e| e.artifact.children_paths.contains(&new_path)) == Some(true) {
            return Ok(());
        }
        let matched_key = matched_key.to_string();
        let apply = move |catalog: &mut Catalog| {
            if let Some(entry) = catalog.get_mut(&matched_key) {
                if !entry.artifact.children_paths.contains(&new_path) {
                    entry.artifact.children_paths.push(new_path.clone());
                }
            }
        };
        apply(&mut catalog);
        self.write_catalog_retrying(catalog, apply).await
    }

    /// Best-effort; callers are expected to ignore the result when their
    /// owning context is cancelled (§4.H).
    pub async fn set_progress(&self, model_key: &str, progress: ProgressInfo) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut catalog = self.read_catalog().await?.0;
        let model_key = model_key.to_string();
        let apply = move |catalog: &mut Catalog| {
            catalog.entry(model_key.clone()).or_default().progress = Some(progress.clone());
        };
        apply(&mut catalog);
        self.write_catalog_retrying(catalog, apply).await
    }

    /// Retries [`Self::patch_node_label`] on a conflicting apply patch (§7).
    async fn patch_node_label_retrying(
        &self,
        model_key: &str,
        state: Option<NodeLabelState>,
    ) -> Result<(), Error> {
        for attempt in 0.. {
            match self.patch_node_label(model_key, state).await {
                Ok(()) => return Ok(()),
                Err(Error::CatalogConflict) if attempt + 1 < MAX_CONFLICT_RETRIES => {
                    warn!(model = model_key, attempt, "node label patch conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns before exhausting its range")
    }

    async fn patch_node_label(&self, model_key: &str, state: Option<NodeLabelState>) -> Result<(), Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let key = node_label_key(model_key, &self.label_prefix);
        let node = match api.get(&self.node_name).await {
            Ok(node) => node,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!(node = %self.node_name, "node not found while setting status label");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let current = node
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(&key))
            .map(String::as_str);
        let desired = state.map(NodeLabelState::as_str);
        if current == desired {
            return Ok(());
        }
        match api
            .patch(
                &self.node_name,
                &PatchParams::apply(MANAGER_NAME),
                &Patch::Merge(serde_json::json!({
                    "metadata": { "labels": { key: desired } }
                })),
            )
            .await
        {
            Ok(_) => {
                info!(node = %self.node_name, label = %key, state = ?desired, "updated node label");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::CatalogConflict),
            Err(kube::Error::Api(ae)) if ae.code == 400 || ae.code == 403 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn artifact_status_for(state: NodeLabelState) -> ArtifactStatus {
    match state {
        NodeLabelState::Ready => ArtifactStatus::Ready,
        NodeLabelState::Updating => ArtifactStatus::Updating,
        NodeLabelState::Failed => ArtifactStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_status_mapping_is_total() {
        assert_eq!(artifact_status_for(NodeLabelState::Ready), ArtifactStatus::Ready);
        assert_eq!(artifact_status_for(NodeLabelState::Updating), ArtifactStatus::Updating);
        assert_eq!(artifact_status_for(NodeLabelState::Failed), ArtifactStatus::Failed);
    }
}
