use std::path::Path;

use mmd_types::ModelMetadata;
use tracing::debug;

/// Best-effort parse of a materialized tree's `config.json` (the de facto
/// convention for hub-hosted models) into structured [`ModelMetadata`].
/// Absence or malformed JSON is not an error — metadata is informational
/// (§3, §4.D.2 step 6 "external collaborator").
pub async fn parse_model_metadata(destination_path: &Path) -> Option<ModelMetadata> {
    let config_path = destination_path.join("config.json");
    let raw = match tokio::fs::read_to_string(&config_path).await {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(err) => {
            debug!(path = %config_path.display(), error = %err, "config.json present but not valid json");
            return None;
        }
    };

    let architecture = value
        .get("architectures")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let framework = match value.get("framework").and_then(|v| v.as_str()) {
        Some(framework) => Some(framework.to_string()),
        None if tokio::fs::try_exists(destination_path.join("pytorch_model.bin"))
            .await
            .unwrap_or(false) =>
        {
            Some("pytorch".to_string())
        }
        None => None,
    };

    Some(ModelMetadata {
        model_type: value.get("model_type").and_then(|v| v.as_str()).map(str::to_string),
        architecture,
        parameter_size: value
            .get("num_parameters")
            .and_then(|v| v.as_u64())
            .map(|n| n.to_string()),
        framework,
        format: None,
        capabilities: Vec::new(),
        quantization: value.get("quantization_config").and_then(|v| v.get("quant_method")).and_then(|v| v.as_str()).map(str::to_string),
        raw_config: Some(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_model_type_and_architecture() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("config.json"),
            r#"{"model_type": "llama", "architectures": ["LlamaForCausalLM"]}"#,
        )
        .await
        .unwrap();
        let metadata = parse_model_metadata(dir.path()).await.unwrap();
        assert_eq!(metadata.model_type.as_deref(), Some("llama"));
        assert_eq!(metadata.architecture.as_deref(), Some("LlamaForCausalLM"));
    }

    #[tokio::test]
    async fn missing_config_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_model_metadata(dir.path()).await.is_none());
    }
}
