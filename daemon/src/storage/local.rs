use std::path::Path;

use async_trait::async_trait;
use mmd_types::{ObjectEntry, ObjectLocator};

use mmd_common::Error;

use super::Backend;

/// `pvc://` locators name a volume already mounted into this daemon's
/// filesystem by an outside collaborator (§6.1 "no-op for engine"); there is
/// nothing for the engine to fetch.
pub struct NoopBackend;

#[async_trait]
impl Backend for NoopBackend {
    async fn list(&self, _locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        Ok(Vec::new())
    }

    async fn download(
        &self,
        _locator: &ObjectLocator,
        _object_name: &str,
        _local_path: &Path,
    ) -> Result<u64, Error> {
        Ok(0)
    }
}

/// `local://` locators name an absolute path already on this node's
/// filesystem; materialization is a copy (or a symlink, when the
/// destination doesn't already exist) rather than a network transfer.
pub struct LocalPathBackend;

#[async_trait]
impl Backend for LocalPathBackend {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        let path = locator
            .extra
            .get("path")
            .ok_or_else(|| Error::GenericError("local locator missing path".to_string()))?;
        let mut entries = Vec::new();
        let mut stack = vec![std::path::PathBuf::from(path)];
        while let Some(dir) = stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(_) => continue,
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else {
                    let metadata = entry.metadata().await?;
                    entries.push(ObjectEntry {
                        name: entry.path().to_string_lossy().to_string(),
                        size: metadata.len(),
                        etag: None,
                    });
                }
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
        tokio::fs::copy(object_name, local_path).await?;
        let metadata = tokio::fs::metadata(local_path).await?;
        Ok(metadata.len())
    }
}
