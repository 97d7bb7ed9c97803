use std::path::Path;

use mmd_common::{Error, NodeLabelState};
use mmd_types::{DownloadPolicy, ObjectLocator, Task};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::reuse;
use crate::storage::HubBackend;

use super::DownloadEngine;

impl DownloadEngine {
    /// §4.D.3: resolve auth, consult the Artifact Reuse Manager when the
    /// resource opts in, otherwise hand the fetch to the P2P Coordinator.
    pub(super) async fn run_hub_pipeline(
        &self,
        task: &Task,
        locator: &ObjectLocator,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let model_key = task.model_key();
        let model_id = locator
            .extra
            .get("modelId")
            .ok_or_else(|| Error::InvalidHubUri("missing model id".to_string()))?
            .clone();
        let revision = locator.extra.get("revision").cloned();

        let auth = self.resolve_auth(&task.resource, locator.provider).await?;
        let hub = HubBackend::new(auth)?;

        if task.resource.download_policy() == DownloadPolicy::ReuseIfExists {
            if let Ok(content_sha) = hub.resolve_commit_sha(&model_id, revision.as_deref()).await {
                let catalog = self.status.catalog_snapshot().await?;
                let requesting_namespace = task.resource.namespace();
                if let Some((matched_key, parent_path)) =
                    reuse::find_reuse_candidate(&catalog, &content_sha, &model_key, requesting_namespace)
                {
                    info!(model = %model_key, matched = %matched_key, "reusing existing artifact instead of fetching");
                    if let Some(parent) = destination.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::symlink(&parent_path, destination)
                        .await
                        .or_else(|err| if err.kind() == std::io::ErrorKind::AlreadyExists { Ok(()) } else { Err(err) })?;
                    self.status.append_child_path(&matched_key, destination.display().to_string()).await?;
                    self.status
                        .set_metadata(&model_key, Default::default(), Some((content_sha, destination.display().to_string())))
                        .await?;
                    self.status.set_state(&model_key, NodeLabelState::Ready).await?;
                    return Ok(());
                }
            }
        }

        let lease_name = task.resource.uid().to_string();
        let (_paths, content_sha) = self
            .coordinator
            .materialize(&lease_name, &model_key, &model_id, revision.as_deref(), destination, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let parsed = if task.resource.skip_config_parse() {
            None
        } else {
            crate::metadata::parse_model_metadata(destination).await
        };
        self.status
            .set_metadata(
                &model_key,
                parsed.unwrap_or_default(),
                Some((content_sha, destination.display().to_string())),
            )
            .await?;

        self.status.set_state(&model_key, NodeLabelState::Ready).await?;
        self.metrics.downloads_success_total.inc();
        Ok(())
    }
}
