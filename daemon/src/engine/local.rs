use std::path::Path;

use mmd_common::{Error, NodeLabelState};
use mmd_types::{ObjectLocator, Task};

use super::DownloadEngine;

impl DownloadEngine {
    /// §4.D.4 `SharedVolume`: another subsystem owns the mount, so there's
    /// nothing to fetch. Only the status transitions fire.
    pub(super) async fn run_shared_volume_pipeline(&self, task: &Task, _destination: &Path) -> Result<(), Error> {
        let model_key = task.model_key();
        if !task.resource.skip_config_parse() {
            if let Some(parsed) = crate::metadata::parse_model_metadata(_destination).await {
                self.status.set_metadata(&model_key, parsed, None).await?;
            }
        }
        self.status.set_state(&model_key, NodeLabelState::Ready).await?;
        self.metrics.downloads_success_total.inc();
        Ok(())
    }

    /// §4.D.4 `LocalPath`: validate the path exists, parse metadata, publish
    /// status. No bytes are copied; the configured path already is the
    /// destination.
    pub(super) async fn run_local_path_pipeline(
        &self,
        task: &Task,
        locator: &ObjectLocator,
        _destination: &Path,
    ) -> Result<(), Error> {
        let model_key = task.model_key();
        let path = locator
            .extra
            .get("path")
            .ok_or_else(|| Error::GenericError("local locator missing path".to_string()))?;

        if !tokio::fs::try_exists(path).await? {
            return Err(Error::GenericError(format!("local path {path} does not exist")));
        }

        if !task.resource.skip_config_parse() {
            if let Some(parsed) = crate::metadata::parse_model_metadata(Path::new(path)).await {
                self.status.set_metadata(&model_key, parsed, None).await?;
            }
        }

        self.status.set_state(&model_key, NodeLabelState::Ready).await?;
        self.metrics.downloads_success_total.inc();
        Ok(())
    }
}
