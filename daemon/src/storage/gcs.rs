use std::path::Path;

use async_trait::async_trait;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use mmd_types::{ObjectEntry, ObjectLocator};
use tokio::io::AsyncWriteExt;

use mmd_common::Error;

use super::{AuthConfig, Backend};

/// Backend for `gs://`/`gcp://` locators (§6.1). Authentication follows the
/// application-default chain unless overridden via `storageParameters`.
pub struct GcsBackend {
    client: GcsClient,
}

impl GcsBackend {
    pub fn new(_auth: AuthConfig) -> Result<Self, Error> {
        // Application-default credential discovery happens lazily on first
        // request; `ClientConfig::default()` defers to it.
        let config = ClientConfig::default();
        Ok(GcsBackend {
            client: GcsClient::new(config),
        })
    }
}

#[async_trait]
impl Backend for GcsBackend {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        let mut entries = Vec::new();
        let mut page_token = None;
        loop {
            let response = self
                .client
                .list_objects(&ListObjectsRequest {
                    bucket: locator.bucket.clone(),
                    prefix: Some(locator.prefix.clone()),
                    page_token: page_token.clone(),
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::GenericError(e.to_string()))?;
            for object in response.items.unwrap_or_default() {
                entries.push(ObjectEntry {
                    name: object.name,
                    size: object.size as u64,
                    etag: Some(object.etag),
                });
            }
            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(entries)
    }

    async fn download(
        &self,
        locator: &ObjectLocator,
        object_name: &str,
        local_path: &Path,
    ) -> Result<u64, Error> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self
            .client
            .download_object(
                &GetObjectRequest {
                    bucket: locator.bucket.clone(),
                    object: object_name.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| Error::GenericError(e.to_string()))?;
        let mut file = tokio::fs::File::create(local_path).await?;
        file.write_all(&bytes).await?;
        Ok(bytes.len() as u64)
    }
}
