use k8s_openapi::api::core::v1::NodeAffinity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolution policy for hub-hosted artifacts that already exist locally.
///
/// Mirrors §3's `downloadPolicy` field. `AlwaysDownload` is the default so
/// that a freshly-applied resource materializes its own copy; opting into
/// `ReuseIfExists` is what unlocks the Artifact Reuse Manager (§4.F) and the
/// hub short-circuit in §4.D.3 step 3.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, JsonSchema)]
pub enum DownloadPolicy {
    #[default]
    AlwaysDownload,
    ReuseIfExists,
}

/// Fields shared verbatim by `BaseModelSpec` and `ClusterBaseModelSpec` (§3).
///
/// Both CRDs embed this via `#[serde(flatten)]` rather than duplicating the
/// field list, which keeps the two resource kinds in lockstep without a
/// shared base "class" (Rust has no struct inheritance, and the teacher's own
/// `Download`/`Executor` CRDs show the same flat-struct approach).
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct ModelStorageSpec {
    /// Scheme-prefixed locator, e.g. `s3://bucket/prefix` or `hf://owner/model`.
    #[serde(rename = "storageUri")]
    pub storage_uri: String,

    /// Explicit local target. When absent, the destination is derived as
    /// `rootDir + storageUri` by the Download Engine.
    #[serde(rename = "destinationPath", default, skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<String>,

    /// Recognized option names mapped to string values (§6.2): `auth`,
    /// `region`, `secretKey`, `token`, `project`, `account_name`,
    /// `compartment_id`, etc. Unrecognized keys are ignored by the backend
    /// that consumes them.
    #[serde(rename = "storageParameters", default)]
    pub storage_parameters: BTreeMap<String, String>,

    /// Name of an external `Secret` holding credentials/tokens for this
    /// model's storage backend.
    #[serde(rename = "storageSecretName", default, skip_serializing_if = "Option::is_none")]
    pub storage_secret_name: Option<String>,

    /// Required node labels; every key must match the node's label with that
    /// exact value for the node to be eligible.
    #[serde(rename = "nodeSelector", default)]
    pub node_selector: BTreeMap<String, String>,

    /// Rule tree with required-during-scheduling terms. Reuses
    /// `k8s_openapi`'s `NodeAffinity` directly since its
    /// `In`/`NotIn`/`Exists`/`DoesNotExist`/`Gt`/`Lt` semantics are exactly
    /// what §4.A specifies.
    #[serde(rename = "nodeAffinity", default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,

    /// `AlwaysDownload` (default) or `ReuseIfExists`.
    #[serde(rename = "downloadPolicy", default)]
    pub download_policy: DownloadPolicy,

    /// Opaque to the engine; informational.
    #[serde(rename = "modelFormat", default, skip_serializing_if = "Option::is_none")]
    pub model_format: Option<String>,

    /// Opaque to the engine except for the `type` key, which selects the
    /// shape-filter path (§4.D.2 step 3) when the task carries an active
    /// `shapeFilter`.
    #[serde(rename = "additionalMetadata", default)]
    pub additional_metadata: BTreeMap<String, String>,
}

/// Status fields shared by both CRDs. The node-local state (label + catalog
/// entry) is the real source of truth per §6.3; this status block is a
/// best-effort cluster-visible summary the daemon may also patch, separate
/// from the per-node label.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct ModelStorageStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Namespaced model artifact resource (§3 `NamespacedModel`).
#[derive(CustomResource, Default, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "models.materializer.dev",
    version = "v1",
    kind = "BaseModel",
    plural = "basemodels",
    status = "ModelStorageStatus",
    namespaced
)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
#[kube(shortname = "bm")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lastUpdated\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct BaseModelSpec {
    #[serde(flatten)]
    pub storage: ModelStorageSpec,
}

/// Cluster-scoped model artifact resource (§3 `ClusterModel`).
#[derive(CustomResource, Default, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "models.materializer.dev",
    version = "v1",
    kind = "ClusterBaseModel",
    plural = "clusterbasemodels",
    status = "ModelStorageStatus",
    shortname = "cbm"
)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lastUpdated\", \"name\": \"AGE\", \"type\": \"date\" }"
)]
pub struct ClusterBaseModelSpec {
    #[serde(flatten)]
    pub storage: ModelStorageSpec,
}

/// Retention label: when present and `true` (case-insensitive) on the
/// resource or its cluster-scoped sibling, filesystem deletion is skipped
/// (§4.D.5 step 3).
pub const RETAIN_LABEL: &str = "reserve-model-artifact";

/// Annotation instructing the Download Engine to skip metadata-file parsing
/// after materialization (§3 labels/annotations policy hints).
pub const SKIP_CONFIG_PARSE_LABEL: &str = "skip-config-parse";
