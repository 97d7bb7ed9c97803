use k8s_openapi::api::core::v1::{Node, Secret};
use kube::{api::Api, Client};

use crate::Error;
use crate::eligibility::NodeInfo;

/// Returns the decoded string value for `key` inside `secret`, if present.
///
/// Mirrors the teacher's `get_secret_value`: `Secret.data` holds base64
/// bytes already decoded into `ByteString` by `k8s-openapi`, so this is a
/// lossy-free UTF-8 conversion, not a base64 decode.
pub fn get_secret_value(secret: &Secret, key: &str) -> Result<Option<String>, Error> {
    Ok(match secret.data {
        Some(ref data) => match data.get(key) {
            Some(bytes) => Some(std::str::from_utf8(&bytes.0)?.to_string()),
            None => None,
        },
        None => None,
    })
}

pub async fn get_secret(
    client: Client,
    namespace: &str,
    name: &str,
) -> Result<Option<Secret>, Error> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(s) => Ok(Some(s)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetches the current node and reduces it to the subset of fields
/// eligibility evaluation needs (§4.A); refreshed by the Watcher before
/// every re-evaluation.
pub async fn get_node_info(client: Client, node_name: &str) -> Result<NodeInfo, Error> {
    let api: Api<Node> = Api::all(client);
    let node = api.get(node_name).await?;
    let labels = node
        .metadata
        .labels
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect();
    Ok(NodeInfo {
        name: node_name.to_string(),
        labels,
    })
}
