//! Uniform fetch/list contract over cloud object stores, the hub, shared
//! volumes, and local paths (§4.C). A factory selects a backend from a
//! URI scheme; callers detect the `BulkDownload` extension by capability
//! query rather than downcasting.

mod azure;
mod gcs;
mod hub;
mod local;
mod s3;

use std::path::Path;

use async_trait::async_trait;
use mmd_types::{ObjectEntry, ObjectLocator, Provider};

use mmd_common::auth::{AwsAuthType, AzureAuthType, GcpAuthType, OciAuthType};
use mmd_common::Error;

/// Options shared across backends (§4.C). Unrecognized options are ignored
/// by whichever backend consumes this struct.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub concurrency: usize,
    pub threads: usize,
    pub chunk_size_mb: usize,
    pub size_threshold_mb: usize,
    pub strip_prefix: String,
    pub override_existing: bool,
}

/// Per-object outcome of a [`Backend::bulk_download`] call.
#[derive(Debug, Clone)]
pub struct BulkResult {
    pub name: String,
    pub result: Result<u64, String>,
}

/// Credential/region/extras bundle resolved from `storageParameters` and an
/// optional referenced `Secret` (§4.C "Backends are stateless factories").
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub auth_type: Option<String>,
    /// The provider's default-chain fallback for `auth_type`, when the
    /// resource left `auth` unspecified (§4.C, §7 Auth row). `None` when
    /// the resource named an explicit auth type, since an explicit choice
    /// has nothing to fall back to.
    pub fallback_auth_type: Option<String>,
    pub region: Option<String>,
    pub token: Option<String>,
    pub secret_key_name: Option<String>,
    pub extras: std::collections::BTreeMap<String, String>,
}

impl AuthConfig {
    /// Resolves `(primary, fallback)` auth-type strings for `provider` from
    /// the raw `auth` storage parameter, using each provider's default
    /// chain when unspecified. Providers without a typed auth chain (Hub,
    /// shared volume, local path) pass the raw value through unchanged.
    pub fn resolve_auth_type(provider: Option<Provider>, raw: Option<&str>) -> (Option<String>, Option<String>) {
        match provider {
            Some(Provider::Oci) => {
                let (primary, fallback) = OciAuthType::resolve(raw);
                (Some(primary.as_str().to_string()), fallback.map(|t| t.as_str().to_string()))
            }
            Some(Provider::Aws) => {
                let (primary, fallback) = AwsAuthType::resolve(raw);
                (Some(primary.as_str().to_string()), fallback.map(|t| t.as_str().to_string()))
            }
            Some(Provider::Gcp) => {
                let (primary, fallback) = GcpAuthType::resolve(raw);
                (Some(primary.as_str().to_string()), fallback.map(|t| t.as_str().to_string()))
            }
            Some(Provider::Azure) => {
                let (primary, fallback) = AzureAuthType::resolve(raw);
                (Some(primary.as_str().to_string()), fallback.map(|t| t.as_str().to_string()))
            }
            _ => (raw.map(str::to_string), None),
        }
    }

    /// Returns a copy of this config with `auth_type` swapped for its
    /// fallback, and no further fallback to try (§7 "try fallback auth; if
    /// still failing, propagate").
    pub fn with_fallback_applied(&self) -> Option<Self> {
        let fallback = self.fallback_auth_type.clone()?;
        Some(AuthConfig {
            auth_type: Some(fallback),
            fallback_auth_type: None,
            ..self.clone()
        })
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn list(&self, locator: &ObjectLocator) -> Result<Vec<ObjectEntry>, Error>;

    async fn download(
        &self,
        locator: &ObjectLocator,
        object_name: &str,
        local_path: &Path,
    ) -> Result<u64, Error>;

    /// `Some` only for backends that can parallelize internally; detection
    /// is a capability query rather than a type test (§4.C).
    fn supports_bulk(&self) -> bool {
        false
    }

    async fn bulk_download(
        &self,
        _locator: &ObjectLocator,
        _objects: &[ObjectEntry],
        _dest_root: &Path,
        _options: &TransferOptions,
    ) -> Result<Vec<BulkResult>, Error> {
        Err(Error::GenericError(
            "backend does not support bulk download".to_string(),
        ))
    }
}

/// Storage-type tag a URI resolves to (§4.D.1 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    ObjectStore,
    Hub,
    SharedVolume,
    LocalPath,
}

pub fn storage_kind(locator: &ObjectLocator) -> Result<StorageKind, Error> {
    match locator.provider {
        Some(Provider::Oci) | Some(Provider::Aws) | Some(Provider::Gcp) | Some(Provider::Azure) => {
            Ok(StorageKind::ObjectStore)
        }
        Some(Provider::Hub) => Ok(StorageKind::Hub),
        Some(Provider::SharedVolume) => Ok(StorageKind::SharedVolume),
        Some(Provider::LocalPath) => Ok(StorageKind::LocalPath),
        None => Err(Error::InvalidUri(mmd_types::ParseError::InvalidUri(
            "locator has no provider".to_string(),
        ))),
    }
}

/// Selects and constructs the backend for a locator's provider (§4.C
/// "Factory selects a backend from a URI scheme").
pub fn backend_for(locator: &ObjectLocator, auth: AuthConfig) -> Result<Box<dyn Backend>, Error> {
    match locator.provider {
        Some(Provider::Aws) => Ok(Box::new(s3::S3Backend::new_aws(auth)?)),
        Some(Provider::Oci) => Ok(Box::new(s3::S3Backend::new_oci(locator, auth)?)),
        Some(Provider::Gcp) => Ok(Box::new(gcs::GcsBackend::new(auth)?)),
        Some(Provider::Azure) => Ok(Box::new(azure::AzureBackend::new(locator, auth)?)),
        Some(Provider::Hub) => Ok(Box::new(hub::HubBackend::new(auth)?)),
        Some(Provider::SharedVolume) => Ok(Box::new(local::NoopBackend)),
        Some(Provider::LocalPath) => Ok(Box::new(local::LocalPathBackend)),
        None => Err(Error::GenericError("unresolved storage provider".to_string())),
    }
}

pub use hub::{HubBackend, HubProgress};
