use std::path::Path;

use async_trait::async_trait;
use awscreds::Credentials;
use awsregion::Region;
use futures::StreamExt;
use mmd_types::{ObjectEntry, ObjectLocator};
use s3::bucket::Bucket;

use mmd_common::Error;

use super::{AuthConfig, Backend, BulkResult, TransferOptions};

/// Backend for both `s3://`/`aws://` (AWS) and `oci://` (OCI's S3-compatible
/// API) locators; OCI is reached through [`Region::Custom`] the same way the
/// teacher configured alternate S3-compatible endpoints.
pub struct S3Backend {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Backend {
    pub fn new_aws(auth: AuthConfig) -> Result<Self, Error> {
        let region = match auth.region.clone() {
            Some(region) => region.parse().unwrap_or(Region::UsEast1),
            None => Region::UsEast1,
        };
        let credentials = resolve_credentials(&auth)?;
        Ok(S3Backend {
            region,
            credentials,
            path_style: false,
        })
    }

    pub fn new_oci(locator: &ObjectLocator, auth: AuthConfig) -> Result<Self, Error> {
        let region = auth.region.clone().unwrap_or_default();
        let namespace = locator.namespace.as_deref().unwrap_or_default();
        let endpoint = format!("https://{namespace}.compat.objectstorage.{region}.oraclecloud.com");
        let credentials = resolve_credentials(&auth)?;
        Ok(S3Backend {
            region: Region::Custom { region, endpoint },
            credentials,
            path_style: true,
        })
    }

    fn for_bucket(&self, locator: &ObjectLocator) -> Result<Bucket, Error> {
        let bucket = Bucket::new(&locator.bucket, self.region.clone(), self.credentials.clone())?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

fn resolve_credentials(auth: &AuthConfig) -> Result<Credentials, Error> {
    if let Some(token) = auth.token.as_deref() {
        return Ok(Credentials::new(Some(token), None, None, None, None)?);
    }
    Ok(Credentials::default()?)
}

#[async_trait]
impl Backend for S3Backend {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        let bucket = self.for_bucket(locator)?;
        let results = bucket.list(locator.prefix.clone(), None).await?;
        let mut entries = Vec::new();
        for page in results {
            for object in page.contents {
                entries.push(ObjectEntry {
                    name: object.key,
                    size: object.size,
                    etag: Some(object.e_tag.trim_matches('"').to_string()),
                });
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
        let bucket = self.for_bucket(locator)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;
        let code = bucket.get_object_to_writer(object_name, &mut file).await?;
        if code >= 300 {
            return Err(Error::HttpStatus {
                status: code as u16,
                message: format!("get_object failed for {object_name}"),
            });
        }
        let metadata = tokio::fs::metadata(local_path).await?;
        Ok(metadata.len())
    }

    fn supports_bulk(&self) -> bool {
        true
    }

    async fn bulk_download(
        &self,
        locator: &ObjectLocator,
        objects: &[ObjectEntry],
        dest_root: &Path,
        options: &TransferOptions,
    ) -> Result<Vec<BulkResult>, Error> {
        let concurrency = options.concurrency.max(1);
        let results = futures::stream::iter(objects.iter().cloned())
            .map(|object| {
                let strip = options.strip_prefix.clone();
                let dest_root = dest_root.to_path_buf();
                let locator = locator.clone();
                async move {
                    let relative = object.name.strip_prefix(&strip).unwrap_or(&object.name);
                    let local_path = dest_root.join(relative.trim_start_matches('/'));
                    let outcome = self.download(&locator, &object.name, &local_path).await;
                    BulkResult {
                        name: object.name.clone(),
                        result: outcome.map_err(|e| e.to_string()),
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(results)
    }
}
