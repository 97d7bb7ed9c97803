use std::path::Path;

use async_trait::async_trait;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{BlobServiceClient, ClientBuilder};
use futures::StreamExt;
use mmd_types::{ObjectEntry, ObjectLocator};
use tokio::io::AsyncWriteExt;

use mmd_common::Error;

use super::{AuthConfig, Backend};

/// Backend for `az://`/`azure://` locators (§6.1). `account` comes from the
/// `azure://<account>/...` form or from the `account_name` storage
/// parameter; falls back to the access key in `auth.token` when no managed
/// identity is available.
pub struct AzureBackend {
    service: BlobServiceClient,
    container: String,
}

impl AzureBackend {
    pub fn new(locator: &ObjectLocator, auth: AuthConfig) -> Result<Self, Error> {
        let account = locator
            .extra
            .get("account")
            .cloned()
            .or_else(|| auth.extras.get("account_name").cloned())
            .ok_or_else(|| Error::AuthFailed("azure storage account not specified".to_string()))?;
        let credentials = match auth.token.as_deref() {
            Some(key) => StorageCredentials::access_key(account.clone(), key.to_string()),
            None => StorageCredentials::anonymous(),
        };
        let service = ClientBuilder::new(account, credentials).blob_service_client();
        Ok(AzureBackend {
            service,
            container: locator.bucket.clone(),
        })
    }
}

#[async_trait]
impl Backend for AzureBackend {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        let container = self.service.container_client(&self.container);
        let mut stream = container.list_blobs().prefix(locator.prefix.clone()).into_stream();
        let mut entries = Vec::new();
        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| Error::GenericError(e.to_string()))?;
            for blob in page.blobs.blobs() {
                entries.push(ObjectEntry {
                    name: blob.name.clone(),
                    size: blob.properties.content_length,
                    etag: Some(blob.properties.etag.clone()),
                });
            }
        }
        Ok(entries)
    }

    async fn download(
        &self,
        _locator: &ObjectLocator,
        object_name: &str,
        local_path: &Path,
    ) -> Result<u64, Error> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let blob = self
            .service
            .container_client(&self.container)
            .blob_client(object_name);
        let mut stream = blob.get().into_stream();
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::GenericError(e.to_string()))?;
            let data = chunk
                .data
                .collect()
                .await
                .map_err(|e| Error::GenericError(e.to_string()))?;
            file.write_all(&data).await?;
            total += data.len() as u64;
        }
        Ok(total)
    }
}
