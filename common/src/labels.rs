use mmd_types::ArtifactStatus;

/// Value of the per-model node label (§6.3). Absence of the label means the
/// model is not present on this node; there is no `NotPresent` variant
/// because that state is represented by the label's absence, not a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLabelState {
    Ready,
    Updating,
    Failed,
}

impl NodeLabelState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabelState::Ready => "Ready",
            NodeLabelState::Updating => "Updating",
            NodeLabelState::Failed => "Failed",
        }
    }
}

impl From<ArtifactStatus> for NodeLabelState {
    fn from(status: ArtifactStatus) -> Self {
        match status {
            ArtifactStatus::Ready => NodeLabelState::Ready,
            ArtifactStatus::Updating => NodeLabelState::Updating,
            ArtifactStatus::Failed => NodeLabelState::Failed,
        }
    }
}

/// Derives the node label key for a model key, sanitizing it to fit
/// Kubernetes label-key constraints (63 chars per segment, no path
/// separators in the name segment).
pub fn node_label_key(model_key: &str, prefix: &str) -> String {
    format!("{prefix}/{model_key}")
}
