use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use mmd_common::Error;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::status::StatusPublisher;
use crate::storage::HubBackend;

const MANAGER_NAME: &str = "model-materializer";
const LEASE_DURATION_SECS: i32 = 60;
const RENEW_FRACTION: u32 = 3;
const PEER_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const WAIT_TICK: Duration = Duration::from_secs(5);
const ABSOLUTE_WAIT_CEILING: Duration = Duration::from_secs(10 * 60);
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// `hashOf(modelID + "@" + revision)` (GLOSSARY "Content fingerprint").
pub fn fingerprint(model_id: &str, revision: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"@");
    hasher.update(revision.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque collaborator the coordinator consults for peer availability and
/// transfer (§4.E "opaque boolean query against a peer-index service"). No
/// concrete peer-index service ships with this daemon; [`NoPeerIndex`] is
/// the default until one is wired in, which simply means every fetch goes
/// straight to the hub.
#[async_trait]
pub trait PeerIndex: Send + Sync {
    async fn peers_available(&self, fingerprint: &str) -> bool;
    async fn fetch_from_peer(&self, fingerprint: &str, dest: &Path) -> Result<(), Error>;
    async fn start_serving(&self, fingerprint: &str, path: &Path) -> Result<(), Error>;
}

pub struct NoPeerIndex;

#[async_trait]
impl PeerIndex for NoPeerIndex {
    async fn peers_available(&self, _fingerprint: &str) -> bool {
        false
    }

    async fn fetch_from_peer(&self, _fingerprint: &str, _dest: &Path) -> Result<(), Error> {
        Err(Error::GenericError("no peer-index configured".to_string()))
    }

    async fn start_serving(&self, _fingerprint: &str, _path: &Path) -> Result<(), Error> {
        Ok(())
    }
}

enum FetchOutcome {
    Seeding(Vec<String>),
    Abort,
}

/// Arbitrates which node fetches a given hub-hosted model from the source
/// and which peer-fetch instead, per §4.E's state table.
pub struct Coordinator {
    client: Client,
    namespace: String,
    node_name: String,
    peer_index: Arc<dyn PeerIndex>,
    hub: Arc<HubBackend>,
    status: Arc<StatusPublisher>,
}

impl Coordinator {
    pub fn new(
        client: Client,
        namespace: String,
        node_name: String,
        peer_index: Arc<dyn PeerIndex>,
        hub: Arc<HubBackend>,
        status: Arc<StatusPublisher>,
    ) -> Self {
        Coordinator {
            client,
            namespace,
            node_name,
            peer_index,
            hub,
            status,
        }
    }

    /// Drives the state machine to completion for a single `{modelID,
    /// revision, destinationPath}` tuple, keyed by the owning resource's
    /// `lease_name` (deterministic from resource UID per §6.4). `model_key`
    /// is only used to address best-effort progress updates back through
    /// the Status Publisher; it plays no role in the state machine itself.
    pub async fn materialize(
        &self,
        lease_name: &str,
        model_key: &str,
        model_id: &str,
        revision: Option<&str>,
        destination_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, String), Error> {
        let fp = fingerprint(model_id, revision.unwrap_or("latest"));

        if tokio::fs::try_exists(destination_path).await.unwrap_or(false) {
            info!(fingerprint = %fp, "destination already present, treating as recovered seed");
            let paths = list_existing(destination_path).await?;
            let _ = self.peer_index.start_serving(&fp, destination_path).await;
            return Ok((paths, fp));
        }

        match self.try_acquire_lease(lease_name).await? {
            LeaseOutcome::Acquired(renewal) => {
                let result = self.fetch_from_hub(model_key, model_id, revision, destination_path).await;
                match result {
                    Ok(paths) => {
                        renewal.finish(true).await;
                        let _ = self.peer_index.start_serving(&fp, destination_path).await;
                        Ok((paths, fp))
                    }
                    Err(err) => {
                        renewal.finish(false).await;
                        Err(err)
                    }
                }
            }
            LeaseOutcome::HeldByOther => {
                match self
                    .wait_for_completion(&fp, lease_name, model_key, model_id, revision, destination_path, cancel)
                    .await?
                {
                    FetchOutcome::Seeding(paths) => {
                        let _ = self.peer_index.start_serving(&fp, destination_path).await;
                        Ok((paths, fp))
                    }
                    FetchOutcome::Abort => Err(Error::Cancelled),
                }
            }
        }
    }

    async fn try_acquire_lease(&self, lease_name: &str) -> Result<LeaseOutcome, Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let lease = match api.get(lease_name).await {
            Ok(l) => l,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!(lease = lease_name, "lease object does not exist yet, waiting for controller to create it");
                return Ok(LeaseOutcome::HeldByOther);
            }
            Err(e) => return Err(e.into()),
        };

        let spec = lease.spec.clone().unwrap_or_default();
        let expired = spec
            .renew_time
            .as_ref()
            .zip(spec.lease_duration_seconds)
            .map(|(renew, duration)| {
                renew.0 + chrono::Duration::seconds(duration as i64) < chrono::Utc::now()
            })
            .unwrap_or(true);
        let unheld = spec.holder_identity.as_deref().unwrap_or("").is_empty();

        if !(unheld || expired) {
            return Ok(LeaseOutcome::HeldByOther);
        }

        let now = MicroTime(chrono::Utc::now());
        let patch = serde_json::json!({
            "spec": {
                "holderIdentity": format!("{MANAGER_NAME}/{}", self.node_name),
                "acquireTime": now,
                "renewTime": now,
                "leaseDurationSeconds": LEASE_DURATION_SECS,
            }
        });
        match api
            .patch(lease_name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(LeaseOutcome::Acquired(self.spawn_renewal(lease_name))),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(LeaseOutcome::HeldByOther),
            Err(e) => Err(e.into()),
        }
    }

    fn spawn_renewal(&self, lease_name: &str) -> LeaseRenewal {
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let lease_name = lease_name.to_string();
        let token = CancellationToken::new();
        let renew_token = token.clone();
        let handle = tokio::spawn(async move {
            let api: Api<Lease> = Api::namespaced(client, &namespace);
            let interval = Duration::from_secs((LEASE_DURATION_SECS as u64 / RENEW_FRACTION as u64).max(1));
            loop {
                tokio::select! {
                    _ = renew_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let now = MicroTime(chrono::Utc::now());
                        let patch = serde_json::json!({ "spec": { "renewTime": now } });
                        if let Err(err) = api
                            .patch(&lease_name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch))
                            .await
                        {
                            warn!(lease = %lease_name, error = %err, "lease renewal failed");
                        }
                    }
                }
            }
        });
        LeaseRenewal {
            token,
            handle: Some(handle),
            client: self.client.clone(),
            namespace: self.namespace.clone(),
            lease_name: lease_name.to_string(),
        }
    }

    /// Fetches from the hub, forwarding the backend's best-effort progress
    /// snapshots to the Status Publisher as they arrive. Forwarding failures
    /// are swallowed: progress is informational and never affects whether
    /// the fetch itself succeeds.
    async fn fetch_from_hub(
        &self,
        model_key: &str,
        model_id: &str,
        revision: Option<&str>,
        destination_path: &Path,
    ) -> Result<Vec<String>, Error> {
        tokio::fs::create_dir_all(destination_path).await?;

        let (progress_tx, mut progress_rx) = tokio::sync::watch::channel(crate::storage::HubProgress::default());
        let status = self.status.clone();
        let model_key = model_key.to_string();
        let forward = tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                let snapshot = progress_rx.borrow().clone();
                let info = mmd_types::ProgressInfo {
                    phase: Some(snapshot.file),
                    total_bytes: 0,
                    completed_bytes: 0,
                    total_files: snapshot.total,
                    completed_files: snapshot.downloaded,
                    speed_bps: 0.0,
                    last_updated: Some(chrono::Utc::now()),
                };
                let _ = status.set_progress(&model_key, info).await;
            }
        });

        let result = self
            .hub
            .fetch_model(model_id, revision, destination_path, Some(progress_tx))
            .await;
        forward.abort();
        let (paths, _commit_sha) = result?;
        Ok(paths)
    }

    async fn wait_for_completion(
        &self,
        fp: &str,
        lease_name: &str,
        model_key: &str,
        model_id: &str,
        revision: Option<&str>,
        destination_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, Error> {
        let deadline = Instant::now() + ABSOLUTE_WAIT_CEILING;
        let mut last_progress_log = Instant::now();
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Ok(FetchOutcome::Abort);
            }
            if Instant::now() >= deadline {
                warn!(fingerprint = fp, "absolute wait ceiling exceeded, fetching from hub directly");
                let paths = self.fetch_from_hub(model_key, model_id, revision, destination_path).await?;
                return Ok(FetchOutcome::Seeding(paths));
            }
            if self.lease_expired_without_completion(lease_name).await? {
                warn!(fingerprint = fp, "lease expired without completion, fetching from hub directly");
                let paths = self.fetch_from_hub(model_key, model_id, revision, destination_path).await?;
                return Ok(FetchOutcome::Seeding(paths));
            }
            if self.peer_index.peers_available(fp).await {
                match tokio::time::timeout(
                    PEER_FETCH_TIMEOUT,
                    self.peer_index.fetch_from_peer(fp, destination_path),
                )
                .await
                {
                    Ok(Ok(())) => {
                        let paths = list_existing(destination_path).await?;
                        return Ok(FetchOutcome::Seeding(paths));
                    }
                    Ok(Err(err)) => warn!(fingerprint = fp, error = %err, "peer fetch failed, continuing to wait"),
                    Err(_) => warn!(fingerprint = fp, "peer fetch timed out, continuing to wait"),
                }
            }

            if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!(fingerprint = fp, elapsed_secs = started.elapsed().as_secs(), "still waiting on peer/lease holder");
                last_progress_log = Instant::now();
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(FetchOutcome::Abort),
                _ = tokio::time::sleep(WAIT_TICK) => {}
            }
        }
    }

    async fn lease_expired_without_completion(&self, lease_name: &str) -> Result<bool, Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let lease = match api.get(lease_name).await {
            Ok(l) => l,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let complete = lease
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get("status"))
            .map(|v| v == "complete")
            .unwrap_or(false);
        if complete {
            return Ok(false);
        }
        let spec = lease.spec.unwrap_or_default();
        Ok(spec
            .renew_time
            .zip(spec.lease_duration_seconds)
            .map(|(renew, duration)| renew.0 + chrono::Duration::seconds(duration as i64) < chrono::Utc::now())
            .unwrap_or(true))
    }
}

enum LeaseOutcome {
    Acquired(LeaseRenewal),
    HeldByOther,
}

/// Owns the renewal background task; `finish` stops it and performs the
/// documented exit action (§4.E "on the task's exit path the lease is
/// released on failure or explicitly marked complete on success").
struct LeaseRenewal {
    token: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
    client: Client,
    namespace: String,
    lease_name: String,
}

impl LeaseRenewal {
    async fn finish(mut self, success: bool) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = if success {
            serde_json::json!({ "metadata": { "labels": { "status": "complete" } } })
        } else {
            serde_json::json!({ "spec": { "holderIdentity": "" } })
        };
        if let Err(err) = api
            .patch(&self.lease_name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch))
            .await
        {
            warn!(lease = %self.lease_name, error = %err, "failed to finalize lease state");
        }
    }
}

impl Drop for LeaseRenewal {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn list_existing(destination_path: &Path) -> Result<Vec<String>, Error> {
    let mut paths = Vec::new();
    let mut stack = vec![PathBuf::from(destination_path)];
    while let Some(dir) = stack.pop() {
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(_) => continue,
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else {
                paths.push(entry.path().to_string_lossy().to_string());
            }
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_scoped_to_revision() {
        let a = fingerprint("org/model", "main");
        let b = fingerprint("org/model", "main");
        let c = fingerprint("org/model", "v2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
