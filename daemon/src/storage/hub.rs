use std::path::Path;

use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use mmd_types::{ObjectEntry, ObjectLocator};
use tokio::sync::watch;

use mmd_common::Error;

use super::{AuthConfig, Backend};

/// Best-effort progress snapshot for a hub fetch (SPEC_FULL §1); never a
/// correctness property, only ever observed by the Status Publisher's
/// `setProgress`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubProgress {
    pub file: String,
    pub downloaded: u64,
    pub total: u64,
}

/// Backend for `hf://` locators (§6.1). The only provider the P2P
/// Coordinator (§4.E) wraps with lease arbitration; other providers are
/// fetched directly by the Download Engine.
pub struct HubBackend {
    api: Api,
}

impl HubBackend {
    pub fn new(auth: AuthConfig) -> Result<Self, Error> {
        let mut builder = ApiBuilder::new();
        if let Some(token) = auth.token {
            builder = builder.with_token(Some(token));
        }
        let api = builder.build().map_err(Error::from)?;
        Ok(HubBackend { api })
    }

    fn repo(&self, model_id: &str, revision: Option<&str>) -> hf_hub::api::tokio::ApiRepo {
        let repo = match revision {
            Some(rev) => Repo::with_revision(model_id.to_string(), RepoType::Model, rev.to_string()),
            None => Repo::new(model_id.to_string(), RepoType::Model),
        };
        self.api.repo(repo)
    }

    /// Resolves the commit sha for `modelID@revision` without downloading
    /// anything (§4.D.3 step 3 "fetch the content fingerprint ... from the
    /// hub metadata endpoint").
    pub async fn resolve_commit_sha(&self, model_id: &str, revision: Option<&str>) -> Result<String, Error> {
        let repo = self.repo(model_id, revision);
        let info = repo.info().await.map_err(Error::from)?;
        Ok(info.sha)
    }

    /// Lists every file in the repo's latest (or pinned) revision, and
    /// resolves `contentSha` by asking the hub for the revision's commit
    /// identifier (GLOSSARY "Content fingerprint").
    pub async fn fetch_model(
        &self,
        model_id: &str,
        revision: Option<&str>,
        dest_root: &Path,
        progress: Option<watch::Sender<HubProgress>>,
    ) -> Result<(Vec<String>, String), Error> {
        let repo = self.repo(model_id, revision);
        let info = repo.info().await.map_err(Error::from)?;
        let commit_sha = info.sha.clone();
        let mut paths = Vec::new();
        for sibling in &info.siblings {
            let local = repo.get(&sibling.rfilename).await.map_err(Error::from)?;
            let dest = dest_root.join(&sibling.rfilename);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&local, &dest).await?;
            if let Some(ref tx) = progress {
                let _ = tx.send(HubProgress {
                    file: sibling.rfilename.clone(),
                    downloaded: paths.len() as u64 + 1,
                    total: info.siblings.len() as u64,
                });
            }
            paths.push(sibling.rfilename.clone());
        }
        Ok((paths, commit_sha))
    }
}

#[async_trait]
impl Backend for HubBackend {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error> {
        let model_id = locator
            .extra
            .get("modelId")
            .ok_or_else(|| Error::InvalidHubUri("missing model id".to_string()))?;
        let revision = locator.extra.get("revision").map(String::as_str);
        let repo = self.repo(model_id, revision);
        let info = repo.info().await.map_err(Error::from)?;
        Ok(info
            .siblings
            .into_iter()
            .map(|s| ObjectEntry {
                name: s.rfilename,
                size: 0,
                etag: None,
            })
            .collect())
    }

    async fn download(
        &self,
        locator: &ObjectLocator,
        object_name: &str,
        local_path: &Path,
    ) -> Result<u64, Error> {
        let model_id = locator
            .extra
            .get("modelId")
            .ok_or_else(|| Error::InvalidHubUri("missing model id".to_string()))?;
        let revision = locator.extra.get("revision").map(String::as_str);
        let repo = self.repo(model_id, revision);
        let local = repo.get(object_name).await.map_err(Error::from)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&local, local_path).await?;
        let metadata = tokio::fs::metadata(local_path).await?;
        Ok(metadata.len())
    }
}
