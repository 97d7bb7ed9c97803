//! Shared Kubernetes plumbing, error types, and pure-logic helpers used by
//! the daemon: the crate-wide [`Error`], per-node [`eligibility`]
//! evaluation, storage credential [`auth`] type resolution, and thin
//! [`k8s`] wrappers around secret/node lookups.

pub mod auth;
mod eligibility;
mod error;
pub mod k8s;
mod labels;

pub use eligibility::{is_eligible, NodeInfo};
pub use error::{Error, ErrorKind};
pub use labels::{node_label_key, NodeLabelState};

/// Default label prefix for per-model node labels (§6.3).
pub const DEFAULT_LABEL_PREFIX: &str = "models.materializer.dev";

/// Name of the data key inside the per-node catalog ConfigMap holding the
/// serialized [`mmd_types::Catalog`] document.
pub const CATALOG_DATA_KEY: &str = "catalog.json";

/// Name prefix for the per-node catalog ConfigMap, suffixed with the node
/// name.
pub const CATALOG_CONFIGMAP_PREFIX: &str = "model-catalog";

pub fn catalog_configmap_name(node_name: &str) -> String {
    format!("{CATALOG_CONFIGMAP_PREFIX}-{node_name}")
}
