use k8s_openapi::api::core::v1::{NodeSelectorRequirement, NodeSelectorTerm};
use std::collections::BTreeMap;

use mmd_types::ModelResource;

/// Snapshot of the fields of a `Node` that eligibility evaluation needs,
/// refreshed by the Watcher before every re-evaluation (§4.A).
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Per-node eligibility: the conjunction of `nodeSelector` and
/// `nodeAffinity` described in §4.A. Absence of both selectors means every
/// node is eligible.
pub fn is_eligible(resource: &ModelResource, node: &NodeInfo) -> bool {
    if !selector_matches(resource.node_selector(), node) {
        return false;
    }
    match resource.node_affinity() {
        Some(affinity) => affinity_matches(affinity, node),
        None => true,
    }
}

fn selector_matches(selector: &BTreeMap<String, String>, node: &NodeInfo) -> bool {
    selector
        .iter()
        .all(|(k, v)| node.labels.get(k).map(|nv| nv == v).unwrap_or(false))
}

fn affinity_matches(
    affinity: &k8s_openapi::api::core::v1::NodeAffinity,
    node: &NodeInfo,
) -> bool {
    let Some(required) = affinity.required_during_scheduling_ignored_during_execution.as_ref()
    else {
        return true;
    };
    // Terms combine as OR.
    required
        .node_selector_terms
        .iter()
        .any(|term| term_matches(term, node))
}

fn term_matches(term: &NodeSelectorTerm, node: &NodeInfo) -> bool {
    let expr_match = term
        .match_expressions
        .as_ref()
        .map(|exprs| exprs.iter().all(|e| requirement_matches(e, &node.labels)))
        .unwrap_or(true);
    let field_match = term
        .match_fields
        .as_ref()
        .map(|fields| fields.iter().all(|f| field_requirement_matches(f, node)))
        .unwrap_or(true);
    expr_match && field_match
}

fn field_requirement_matches(req: &NodeSelectorRequirement, node: &NodeInfo) -> bool {
    if req.key != "metadata.name" {
        return false;
    }
    let mut synthetic = BTreeMap::new();
    synthetic.insert("metadata.name".to_string(), node.name.clone());
    requirement_matches(req, &synthetic)
}

fn requirement_matches(req: &NodeSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.clone().unwrap_or_default();
    let actual = labels.get(&req.key);
    match req.operator.as_str() {
        "Exists" => actual.is_some(),
        "DoesNotExist" => actual.is_none(),
        "In" => actual.map(|v| values.iter().any(|c| c == v)).unwrap_or(false),
        "NotIn" => actual.map(|v| !values.iter().any(|c| c == v)).unwrap_or(true),
        "Gt" => compare_numeric_or_lex(actual, values.first(), |a, b| a > b, |a, b| a > b),
        "Lt" => compare_numeric_or_lex(actual, values.first(), |a, b| a < b, |a, b| a < b),
        _ => false,
    }
}

/// `Gt`/`Lt` parse both sides as integers when possible, falling back to
/// lexicographic comparison (§4.A item 2).
fn compare_numeric_or_lex(
    actual: Option<&String>,
    expected: Option<&String>,
    num_cmp: impl Fn(i64, i64) -> bool,
    lex_cmp: impl Fn(&str, &str) -> bool,
) -> bool {
    let (Some(actual), Some(expected)) = (actual, expected) else {
        return false;
    };
    match (actual.parse::<i64>(), expected.parse::<i64>()) {
        (Ok(a), Ok(b)) => num_cmp(a, b),
        _ => lex_cmp(actual.as_str(), expected.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAffinity, NodeSelector};
    use mmd_types::{BaseModel, BaseModelSpec, ModelStorageSpec};

    fn node(labels: &[(&str, &str)]) -> NodeInfo {
        NodeInfo {
            name: "node-a".to_string(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn resource_with_selector(selector: BTreeMap<String, String>) -> ModelResource {
        let mut bm = BaseModel::new(
            "demo",
            BaseModelSpec {
                storage: ModelStorageSpec {
                    storage_uri: "s3://bucket/prefix".to_string(),
                    node_selector: selector,
                    ..Default::default()
                },
            },
        );
        bm.metadata.namespace = Some("default".to_string());
        bm.metadata.uid = Some("uid-1".to_string());
        ModelResource::from(bm)
    }

    #[test]
    fn no_constraints_is_eligible() {
        let resource = resource_with_selector(BTreeMap::new());
        assert!(is_eligible(&resource, &node(&[])));
    }

    #[test]
    fn node_selector_requires_exact_match() {
        let mut sel = BTreeMap::new();
        sel.insert("gpu".to_string(), "a100".to_string());
        let resource = resource_with_selector(sel);
        assert!(is_eligible(&resource, &node(&[("gpu", "a100")])));
        assert!(!is_eligible(&resource, &node(&[("gpu", "a10")])));
        assert!(!is_eligible(&resource, &node(&[])));
    }

    #[test]
    fn affinity_gt_uses_numeric_comparison() {
        let mut bm = BaseModel::new(
            "demo",
            BaseModelSpec {
                storage: ModelStorageSpec {
                    storage_uri: "s3://bucket/prefix".to_string(),
                    node_affinity: Some(NodeAffinity {
                        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                            node_selector_terms: vec![NodeSelectorTerm {
                                match_expressions: Some(vec![NodeSelectorRequirement {
                                    key: "cpu".to_string(),
                                    operator: "Gt".to_string(),
                                    values: Some(vec!["4".to_string()]),
                                }]),
                                match_fields: None,
                            }],
                        }),
                        preferred_during_scheduling_ignored_during_execution: None,
                    }),
                    ..Default::default()
                },
            },
        );
        bm.metadata.namespace = Some("default".to_string());
        let resource = ModelResource::from(bm);
        assert!(is_eligible(&resource, &node(&[("cpu", "8")])));
        assert!(!is_eligible(&resource, &node(&[("cpu", "2")])));
    }
}
