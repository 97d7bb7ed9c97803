use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use mmd_types::ObjectEntry;
use tracing::warn;

use crate::metrics::Metrics;

/// Per-object verification failure, keyed by the object's name. An empty map
/// from [`verify`] means every object passed (§4.I).
pub type FailureMap = BTreeMap<String, String>;

/// Stats the materialized file for each listed object and compares its size
/// against the reported size; a checksum match is attempted only when an
/// etag is present, and failing to validate one is not itself a failure —
/// size agreement is the core contract.
pub async fn verify(
    objects: &[ObjectEntry],
    destination_path: &Path,
    strip_prefix: &str,
    provider_tag: &str,
    metrics: &Metrics,
) -> FailureMap {
    let started = Instant::now();
    let mut failures = FailureMap::new();
    let mut checksum_mismatch = false;

    for object in objects {
        let relative = object
            .name
            .strip_prefix(strip_prefix)
            .unwrap_or(&object.name)
            .trim_start_matches('/');
        let local_path = destination_path.join(relative);

        let metadata = match tokio::fs::metadata(&local_path).await {
            Ok(m) => m,
            Err(err) => {
                failures.insert(object.name.clone(), format!("missing local file: {err}"));
                continue;
            }
        };

        if metadata.len() != object.size {
            failures.insert(
                object.name.clone(),
                format!("size mismatch: local {} != reported {}", metadata.len(), object.size),
            );
            continue;
        }

        if let Some(etag) = &object.etag {
            match verify_checksum(&local_path, etag).await {
                Ok(()) => {}
                Err(ChecksumOutcome::Unavailable(reason)) => {
                    warn!(object = %object.name, reason, "checksum validation unavailable, accepting size match");
                }
                Err(ChecksumOutcome::Mismatch(reason)) => {
                    checksum_mismatch = true;
                    failures.insert(object.name.clone(), reason);
                }
            }
        }
    }

    let result_label = if failures.is_empty() { "success" } else { "failure" };
    metrics
        .verifications_total
        .with_label_values(&[result_label])
        .inc();
    metrics
        .verification_duration_seconds
        .with_label_values(&[provider_tag])
        .observe(started.elapsed().as_secs_f64());
    if checksum_mismatch {
        metrics.md5_failed_total.inc();
    }

    failures
}

enum ChecksumOutcome {
    Unavailable(String),
    Mismatch(String),
}

/// Best-effort MD5 comparison against an S3-style etag. A multipart-upload
/// etag (`"<hash>-<parts>"`) can't be validated this way and is skipped
/// rather than treated as a mismatch.
async fn verify_checksum(local_path: &Path, etag: &str) -> Result<(), ChecksumOutcome> {
    let etag = etag.trim_matches('"');
    if etag.contains('-') {
        return Err(ChecksumOutcome::Unavailable(
            "multipart etag, cannot validate without per-part hashing".to_string(),
        ));
    }
    let bytes = tokio::fs::read(local_path)
        .await
        .map_err(|e| ChecksumOutcome::Unavailable(e.to_string()))?;
    let digest = format!("{:x}", md5::compute(bytes));
    if digest == etag {
        Ok(())
    } else {
        Err(ChecksumOutcome::Mismatch(format!(
            "md5 mismatch: local {digest} != etag {etag}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Metrics::new();
        let objects = vec![ObjectEntry {
            name: "prefix/model.bin".to_string(),
            size: 10,
            etag: None,
        }];
        let failures = verify(&objects, dir.path(), "prefix/", "test", &metrics).await;
        assert_eq!(failures.len(), 1);
        assert!(failures.contains_key("prefix/model.bin"));
    }

    #[tokio::test]
    async fn matching_size_is_success() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("model.bin"), b"0123456789").await.unwrap();
        let metrics = Metrics::new();
        let objects = vec![ObjectEntry {
            name: "prefix/model.bin".to_string(),
            size: 10,
            etag: None,
        }];
        let failures = verify(&objects, dir.path(), "prefix/", "test", &metrics).await;
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn size_mismatch_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("model.bin"), b"short").await.unwrap();
        let metrics = Metrics::new();
        let objects = vec![ObjectEntry {
            name: "prefix/model.bin".to_string(),
            size: 999,
            etag: None,
        }];
        let failures = verify(&objects, dir.path(), "prefix/", "test", &metrics).await;
        assert_eq!(failures.len(), 1);
    }
}
