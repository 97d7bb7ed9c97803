use k8s_openapi::api::core::v1::NodeAffinity;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::{BaseModel, ClusterBaseModel, DownloadPolicy, ModelStorageSpec, ModelStorageStatus};

/// Polymorphic handle the engine consumes, replacing the source's pair of
/// nilable fields (Design Notes §9 "Polymorphic resource handle"). Every
/// caller downstream of the Watcher works through this single type instead
/// of branching on which CRD produced the event.
#[derive(Debug, Clone)]
pub enum ModelResource {
    Namespaced {
        namespace: String,
        name: String,
        uid: String,
        meta: ObjectMeta,
        spec: ModelStorageSpec,
        status: Option<ModelStorageStatus>,
    },
    Cluster {
        name: String,
        uid: String,
        meta: ObjectMeta,
        spec: ModelStorageSpec,
        status: Option<ModelStorageStatus>,
    },
}

impl ModelResource {
    pub fn name(&self) -> &str {
        match self {
            ModelResource::Namespaced { name, .. } => name,
            ModelResource::Cluster { name, .. } => name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            ModelResource::Namespaced { namespace, .. } => Some(namespace),
            ModelResource::Cluster { .. } => None,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            ModelResource::Namespaced { uid, .. } => uid,
            ModelResource::Cluster { uid, .. } => uid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelResource::Namespaced { .. } => "basemodel",
            ModelResource::Cluster { .. } => "clusterbasemodel",
        }
    }

    pub fn storage(&self) -> &ModelStorageSpec {
        match self {
            ModelResource::Namespaced { spec, .. } => spec,
            ModelResource::Cluster { spec, .. } => spec,
        }
    }

    pub fn status(&self) -> Option<&ModelStorageStatus> {
        match self {
            ModelResource::Namespaced { status, .. } => status.as_ref(),
            ModelResource::Cluster { status, .. } => status.as_ref(),
        }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            ModelResource::Namespaced { meta, .. } => meta.labels.as_ref().unwrap_or(&EMPTY_MAP),
            ModelResource::Cluster { meta, .. } => meta.labels.as_ref().unwrap_or(&EMPTY_MAP),
        }
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        match self {
            ModelResource::Namespaced { meta, .. } => meta.annotations.as_ref().unwrap_or(&EMPTY_MAP),
            ModelResource::Cluster { meta, .. } => meta.annotations.as_ref().unwrap_or(&EMPTY_MAP),
        }
    }

    pub fn node_affinity(&self) -> Option<&NodeAffinity> {
        self.storage().node_affinity.as_ref()
    }

    pub fn node_selector(&self) -> &BTreeMap<String, String> {
        &self.storage().node_selector
    }

    pub fn download_policy(&self) -> DownloadPolicy {
        self.storage().download_policy
    }

    /// Non-`None` once the external controller has set a deletion timestamp;
    /// the Watcher uses this to route the resource to the `Delete` task path
    /// instead of `Download`/`DownloadOverride`.
    pub fn is_deleting(&self) -> bool {
        match self {
            ModelResource::Namespaced { meta, .. } => meta.deletion_timestamp.is_some(),
            ModelResource::Cluster { meta, .. } => meta.deletion_timestamp.is_some(),
        }
    }

    pub fn retained(&self) -> bool {
        self.labels()
            .get(crate::RETAIN_LABEL)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn skip_config_parse(&self) -> bool {
        self.labels()
            .get(crate::SKIP_CONFIG_PARSE_LABEL)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// `<kind>.<namespace?>.<name>`, cluster-scoped omitting the namespace
    /// segment (§6.3).
    pub fn model_key(&self) -> String {
        match self {
            ModelResource::Namespaced {
                namespace, name, ..
            } => format!("basemodel.{namespace}.{name}").to_lowercase(),
            ModelResource::Cluster { name, .. } => {
                format!("clusterbasemodel.{name}").to_lowercase()
            }
        }
    }
}

impl From<BaseModel> for ModelResource {
    fn from(bm: BaseModel) -> Self {
        let namespace = bm.namespace().unwrap_or_default();
        let uid = bm.uid().unwrap_or_default();
        let name = bm.name_any();
        ModelResource::Namespaced {
            namespace,
            name,
            uid,
            meta: bm.metadata,
            spec: bm.spec.storage,
            status: bm.status,
        }
    }
}

impl From<ClusterBaseModel> for ModelResource {
    fn from(cbm: ClusterBaseModel) -> Self {
        let uid = cbm.uid().unwrap_or_default();
        let name = cbm.name_any();
        ModelResource::Cluster {
            name,
            uid,
            meta: cbm.metadata,
            spec: cbm.spec.storage,
            status: cbm.status,
        }
    }
}

const EMPTY_MAP: BTreeMap<String, String> = BTreeMap::new();
