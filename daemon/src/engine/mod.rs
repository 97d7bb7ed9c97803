//! Download Engine (§4.D): dispatches tasks pulled off the Download/Delete
//! channels to a storage-kind-specific pipeline, registering and retiring
//! cancellation state around each one.

mod hub;
mod local;
mod object_store;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kube::Client;
use mmd_common::{Error, NodeLabelState};
use mmd_types::{ModelResource, ObjectLocator, Task, TaskType};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cancellation::CancellationRegistry;
use crate::channels::TaskHandler;
use crate::metrics::Metrics;
use crate::p2p::Coordinator;
use crate::status::StatusPublisher;
use crate::storage::{self, StorageKind};

/// Everything a single task execution needs, threaded through to whichever
/// pipeline handles its storage kind.
pub struct DownloadEngine {
    client: Client,
    root_dir: PathBuf,
    status: Arc<StatusPublisher>,
    cancellation: Arc<CancellationRegistry>,
    metrics: Arc<Metrics>,
    coordinator: Arc<Coordinator>,
    path_owners: Arc<Mutex<HashMap<PathBuf, HashSet<String>>>>,
}

impl DownloadEngine {
    pub fn new(
        client: Client,
        root_dir: PathBuf,
        status: Arc<StatusPublisher>,
        cancellation: Arc<CancellationRegistry>,
        metrics: Arc<Metrics>,
        coordinator: Arc<Coordinator>,
    ) -> Self {
        DownloadEngine {
            client,
            root_dir,
            status,
            cancellation,
            metrics,
            coordinator,
            path_owners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn resolve_destination(&self, resource: &ModelResource) -> PathBuf {
        match &resource.storage().destination_path {
            Some(explicit) => PathBuf::from(explicit),
            None => self.root_dir.join(resource.storage().storage_uri.replace("://", "/")),
        }
    }

    async fn resolve_auth(
        &self,
        resource: &ModelResource,
        provider: Option<mmd_types::Provider>,
    ) -> Result<storage::AuthConfig, Error> {
        let storage = resource.storage();
        let mut token = storage.storage_parameters.get("token").cloned();

        if let Some(secret_name) = &storage.storage_secret_name {
            let namespace = resource.namespace().unwrap_or("default");
            if let Some(secret) = mmd_common::k8s::get_secret(self.client.clone(), namespace, secret_name).await? {
                let key = storage
                    .storage_parameters
                    .get("secretKey")
                    .map(String::as_str)
                    .unwrap_or("token");
                if let Some(value) = mmd_common::k8s::get_secret_value(&secret, key)? {
                    token = Some(value);
                }
            }
        }

        let (auth_type, fallback_auth_type) = storage::AuthConfig::resolve_auth_type(
            provider,
            storage.storage_parameters.get("auth").map(String::as_str),
        );

        Ok(storage::AuthConfig {
            auth_type,
            fallback_auth_type,
            region: storage.storage_parameters.get("region").cloned(),
            token,
            secret_key_name: storage.storage_parameters.get("secretKey").cloned(),
            extras: storage.storage_parameters.clone(),
        })
    }

    async fn register_path_owner(&self, path: &Path, model_key: &str) {
        self.path_owners
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .insert(model_key.to_string());
    }

    /// Returns `true` if some resource other than `model_key` still claims
    /// `path` (§8 "the filesystem at P is not removed" invariant).
    async fn path_has_other_owner(&self, path: &Path, model_key: &str) -> bool {
        self.path_owners
            .lock()
            .await
            .get(path)
            .map(|owners| owners.iter().any(|k| k != model_key))
            .unwrap_or(false)
    }

    async fn release_path_owner(&self, path: &Path, model_key: &str) {
        let mut guard = self.path_owners.lock().await;
        if let Some(owners) = guard.get_mut(path) {
            owners.remove(model_key);
            if owners.is_empty() {
                guard.remove(path);
            }
        }
    }

    /// Rebuilds the backend for `locator` using `auth`'s fallback auth type
    /// (§7 "Auth | ... | try fallback auth; if still failing, propagate").
    /// Propagates the original auth error if no fallback was resolved.
    pub(super) fn retry_with_fallback_auth(
        &self,
        model_key: &str,
        locator: &ObjectLocator,
        auth: &storage::AuthConfig,
    ) -> Result<Box<dyn storage::Backend>, Error> {
        match auth.with_fallback_applied() {
            Some(fallback_auth) => {
                warn!(model = model_key, "primary auth failed, retrying with fallback auth type");
                storage::backend_for(locator, fallback_auth)
            }
            None => Err(Error::AuthFailed("no fallback auth type configured".to_string())),
        }
    }

    async fn fail(&self, model_key: &str, err: Error) {
        error!(model = model_key, error = %err, kind = ?err.kind(), "task failed");
        self.metrics.record_error(err.metric_tag());
        if let Err(publish_err) = self.status.set_state(model_key, NodeLabelState::Failed).await {
            warn!(model = model_key, error = %publish_err, "failed to publish Failed state");
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for DownloadEngine {
    async fn handle_download(&self, task: Task) {
        let model_key = task.model_key();
        let uid = task.uid().to_string();
        let destination = self.resolve_destination(&task.resource);
        self.register_path_owner(&destination, &model_key).await;

        if let Err(err) = self.status.set_state(&model_key, NodeLabelState::Updating).await {
            warn!(model = %model_key, error = %err, "failed to publish Updating state");
        }

        let cancel = match task.task_type {
            TaskType::Download => self.cancellation.register(&uid).await,
            TaskType::DownloadOverride => match self.cancellation.existing(&uid).await {
                Some(_) => {
                    info!(model = %model_key, "in-flight download is authoritative, ignoring override");
                    return;
                }
                None => self.cancellation.register(&uid).await,
            },
            TaskType::Delete => return,
        };

        let locator = match ObjectLocator::parse(&task.resource.storage().storage_uri) {
            Ok(locator) => locator,
            Err(err) => {
                self.fail(&model_key, err.into()).await;
                self.cancellation.complete(&uid).await;
                return;
            }
        };

        let kind = match storage::storage_kind(&locator) {
            Ok(kind) => kind,
            Err(err) => {
                self.fail(&model_key, err).await;
                self.cancellation.complete(&uid).await;
                return;
            }
        };

        info!(model = %model_key, task_type = ?task.task_type, storage_kind = ?kind, "dispatching download task");

        let result = match kind {
            StorageKind::ObjectStore => {
                self.run_object_store_pipeline(&task, &locator, &destination, &cancel).await
            }
            StorageKind::Hub => self.run_hub_pipeline(&task, &locator, &destination, &cancel).await,
            StorageKind::SharedVolume => self.run_shared_volume_pipeline(&task, &destination).await,
            StorageKind::LocalPath => self.run_local_path_pipeline(&task, &locator, &destination).await,
        };

        match result {
            Ok(()) => {}
            Err(Error::Cancelled) => info!(model = %model_key, "download cancelled before completion"),
            Err(err) => self.fail(&model_key, err).await,
        }

        self.cancellation.complete(&uid).await;
    }

    async fn handle_delete(&self, task: Task) {
        let model_key = task.model_key();
        let uid = task.uid().to_string();
        let destination = self.resolve_destination(&task.resource);

        self.cancellation.cancel(&uid).await;
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let locator = ObjectLocator::parse(&task.resource.storage().storage_uri).ok();
        let kind = locator.as_ref().and_then(|l| storage::storage_kind(l).ok());

        let removable = !matches!(kind, Some(StorageKind::SharedVolume) | Some(StorageKind::LocalPath));

        if removable {
            let retained = task.resource.retained();
            let has_other_owner = self.path_has_other_owner(&destination, &model_key).await;
            if retained {
                info!(model = %model_key, path = %destination.display(), "retention label set, skipping filesystem removal");
            } else if has_other_owner {
                info!(model = %model_key, path = %destination.display(), "another resource still targets this path, skipping filesystem removal");
            } else if let Err(err) = tokio::fs::remove_dir_all(&destination).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(model = %model_key, path = %destination.display(), error = %err, "failed to remove destination path");
                }
            }
        }

        self.release_path_owner(&destination, &model_key).await;

        if let Err(err) = self.status.remove(&model_key).await {
            warn!(model = %model_key, error = %err, "failed to remove status");
        }
        info!(model = %model_key, "delete task complete");
    }
}

