use mmd_types::Catalog;

/// Given the node-scoped catalog, locates an existing artifact with the same
/// content fingerprint the caller can symlink to instead of re-downloading
/// (§4.F). `requesting_key` is excluded from the search so a record never
/// matches itself; `requesting_namespace` is `None` for cluster-scoped
/// callers.
///
/// Ordering policy: the cluster-scoped partition is preferred (it maximizes
/// sharing across namespaces), then the requester's own namespace partition.
pub fn find_reuse_candidate(
    catalog: &Catalog,
    fingerprint: &str,
    requesting_key: &str,
    requesting_namespace: Option<&str>,
) -> Option<(String, String)> {
    let candidates: Vec<(&String, &mmd_types::ArtifactRecord)> = catalog
        .iter()
        .filter(|(key, record)| {
            key.as_str() != requesting_key && record.artifact.content_sha == fingerprint
        })
        .collect();

    let pick = |predicate: &dyn Fn(&str) -> bool| {
        candidates
            .iter()
            .find(|(key, _)| predicate(key))
            .map(|(key, record)| (key.to_string(), record))
    };

    let cluster_hit = pick(&|key| key.starts_with("clusterbasemodel."));
    let namespace_hit = requesting_namespace.and_then(|ns| {
        let prefix = format!("basemodel.{}.", ns.to_lowercase());
        pick(&|key| key.starts_with(&prefix))
    });

    let (matched_key, record) = cluster_hit.or(namespace_hit)?;
    let parent_path = record.artifact.parent_paths.get(&matched_key)?.clone();
    Some((matched_key, parent_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmd_types::{ArtifactGraph, ArtifactRecord};
    use std::collections::BTreeMap;

    fn record_with_sha(sha: &str, owner_key: &str, path: &str) -> ArtifactRecord {
        let mut parent_paths = BTreeMap::new();
        parent_paths.insert(owner_key.to_string(), path.to_string());
        ArtifactRecord {
            artifact: ArtifactGraph {
                content_sha: sha.to_string(),
                parent_paths,
                children_paths: Vec::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_cluster_scoped_match_over_namespace() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "clusterbasemodel.shared".to_string(),
            record_with_sha("sha-1", "clusterbasemodel.shared", "/data/shared"),
        );
        catalog.insert(
            "basemodel.team-a.other".to_string(),
            record_with_sha("sha-1", "basemodel.team-a.other", "/data/team-a"),
        );

        let hit = find_reuse_candidate(&catalog, "sha-1", "basemodel.team-a.mine", Some("team-a")).unwrap();
        assert_eq!(hit.0, "clusterbasemodel.shared");
        assert_eq!(hit.1, "/data/shared");
    }

    #[test]
    fn rejects_self_match() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "basemodel.team-a.mine".to_string(),
            record_with_sha("sha-1", "basemodel.team-a.mine", "/data/mine"),
        );
        let hit = find_reuse_candidate(&catalog, "sha-1", "basemodel.team-a.mine", Some("team-a"));
        assert!(hit.is_none());
    }

    #[test]
    fn falls_back_to_namespace_partition() {
        let mut catalog = Catalog::new();
        catalog.insert(
            "basemodel.team-a.other".to_string(),
            record_with_sha("sha-1", "basemodel.team-a.other", "/data/team-a"),
        );
        let hit = find_reuse_candidate(&catalog, "sha-1", "basemodel.team-a.mine", Some("team-a")).unwrap();
        assert_eq!(hit.0, "basemodel.team-a.other");
    }
}
