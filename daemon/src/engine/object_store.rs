use std::path::Path;
use std::time::{Duration, Instant};

use mmd_common::{Error, NodeLabelState};
use mmd_types::{ObjectLocator, Task};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metadata;
use crate::storage::TransferOptions;
use crate::verify;

use super::DownloadEngine;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

impl DownloadEngine {
    /// §4.D.2: list, optionally shape-filter, bulk-or-sequential download,
    /// verify, parse metadata, mark `Ready`.
    pub(super) async fn run_object_store_pipeline(
        &self,
        task: &Task,
        locator: &ObjectLocator,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let model_key = task.model_key();
        let auth = self.resolve_auth(&task.resource, locator.provider).await?;
        let mut backend = crate::storage::backend_for(locator, auth.clone())?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let started = Instant::now();
        let mut objects = match backend.list(locator).await {
            Ok(objects) => objects,
            Err(err) if err.kind() == mmd_common::ErrorKind::Auth => {
                backend = self.retry_with_fallback_auth(&model_key, locator, &auth)?;
                backend.list(locator).await?
            }
            Err(err) => return Err(err),
        };

        if task.shape_filter.should_filter() {
            objects.retain(|object| task.shape_filter.matches(&object.name));
            if objects.is_empty() {
                return Err(Error::GenericError(
                    "shape filter excluded every listed object".to_string(),
                ));
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let storage = task.resource.storage();
        let options = TransferOptions {
            concurrency: parse_usize(storage.storage_parameters.get("concurrency")).unwrap_or(4),
            threads: parse_usize(storage.storage_parameters.get("threads")).unwrap_or(1),
            chunk_size_mb: parse_usize(storage.storage_parameters.get("chunkSizeMB")).unwrap_or(8),
            size_threshold_mb: parse_usize(storage.storage_parameters.get("sizeThresholdMB")).unwrap_or(64),
            strip_prefix: locator.prefix.clone(),
            override_existing: false,
        };

        if backend.supports_bulk() {
            let results = backend.bulk_download(locator, &objects, destination, &options).await?;
            let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
            if !failed.is_empty() {
                for f in &failed {
                    warn!(model = %model_key, object = %f.name, error = ?f.result, "bulk download failed for object");
                }
                return Err(Error::GenericError(format!(
                    "{} of {} objects failed to download",
                    failed.len(),
                    results.len()
                )));
            }
        } else {
            for object in &objects {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let relative = object
                    .name
                    .strip_prefix(&locator.prefix)
                    .unwrap_or(&object.name)
                    .trim_start_matches('/');
                let local_path = destination.join(relative);
                if let Some(parent) = local_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                download_with_retry(backend.as_ref(), locator, &object.name, &local_path).await?;
            }
        }

        let provider_tag = locator.provider.map(|p| p.to_string()).unwrap_or_default();

        self.metrics
            .bytes_total
            .inc_by(objects.iter().map(|o| o.size).sum());
        self.metrics
            .download_duration_seconds
            .with_label_values(&[provider_tag.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let failures = verify::verify(&objects, destination, &locator.prefix, &provider_tag, &self.metrics).await;
        if !failures.is_empty() {
            return Err(Error::IntegrityFailed(format!(
                "{} of {} objects failed verification",
                failures.len(),
                objects.len()
            )));
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !task.resource.skip_config_parse() {
            if let Some(parsed) = metadata::parse_model_metadata(destination).await {
                let _ = self.status.set_metadata(&model_key, parsed, None).await;
            }
        }

        self.status.set_state(&model_key, NodeLabelState::Ready).await?;
        self.metrics.downloads_success_total.inc();
        Ok(())
    }
}

async fn download_with_retry(
    backend: &dyn crate::storage::Backend,
    locator: &ObjectLocator,
    object_name: &str,
    local_path: &Path,
) -> Result<(), Error> {
    let mut attempt = 0;
    loop {
        match backend.download(locator, object_name, local_path).await {
            Ok(_) => return Ok(()),
            Err(err) if err.is_retryable() && attempt < MAX_RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(object = object_name, attempt, error = %err, "retrying transient download failure");
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn parse_usize(value: Option<&String>) -> Option<usize> {
    value.and_then(|v| v.parse().ok())
}
