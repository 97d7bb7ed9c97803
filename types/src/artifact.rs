use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An entry returned by a backend's list operation (GLOSSARY).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Materialization state of an [`ArtifactRecord`]; `Ready` is only reachable
/// after Integrity Verifier returns an empty failure map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ArtifactStatus {
    Ready,
    Updating,
    Failed,
}

/// Structured model info parsed out of the materialized tree's config file,
/// when parsing wasn't skipped via `skip-config-parse` (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_config: Option<serde_json::Value>,
}

/// The artifact graph fragment owned by a single record: its content
/// fingerprint (hub-sourced only) and its reuse edges (Design Notes §9
/// "Artifact graph" — stored as string-keyed edges, never direct pointers,
/// so the catalog stays trivially serializable).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactGraph {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_sha: String,
    #[serde(default)]
    pub parent_paths: BTreeMap<String, String>,
    #[serde(default)]
    pub children_paths: Vec<String>,
}

/// Best-effort transfer progress (GLOSSARY, §4.H `setProgress`). Never a
/// correctness property — dropped silently when its owning context is
/// cancelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub total_files: u64,
    pub completed_files: u64,
    pub speed_bps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// Persistent per-model entry in the node-scoped catalog (GLOSSARY).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArtifactStatus>,
    #[serde(default)]
    pub metadata: ModelMetadata,
    #[serde(default)]
    pub artifact: ArtifactGraph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressInfo>,
}

impl ArtifactRecord {
    pub fn is_ready(&self) -> bool {
        self.status == Some(ArtifactStatus::Ready)
    }
}

/// Node-scoped catalog document: model key to materialized-artifact record,
/// serialized as the sole value of the catalog ConfigMap's data key.
pub type Catalog = BTreeMap<String, ArtifactRecord>;
