use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use mmd_common::Error;

/// CLI flags / env vars for the materializer daemon (SPEC_FULL §2 "Config
/// validation"). Every field accepts an env var fallback, matching how
/// cluster operators typically wire this into a DaemonSet container.
#[derive(Debug, Parser)]
#[command(name = "model-materializerd", about = "Per-node ML model artifact materializer")]
pub struct Config {
    /// Name of the Kubernetes `Node` object this daemon is running on.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Namespace the catalog ConfigMap and hub-fetch leases live in.
    #[arg(long, env = "MMD_NAMESPACE", default_value = "mmd-system")]
    pub namespace: String,

    /// Root of the local filesystem tree artifacts are materialized under.
    #[arg(long, env = "MMD_ROOT_DIR", default_value = "/var/lib/model-materializer")]
    pub root_dir: PathBuf,

    /// Prefix applied to per-model node labels.
    #[arg(long, env = "MMD_LABEL_PREFIX", default_value = "model-materializer.io")]
    pub label_prefix: String,

    /// Number of concurrent download workers sharing the download channel.
    #[arg(long, env = "MMD_DOWNLOAD_WORKERS", default_value_t = 4)]
    pub download_workers: usize,

    /// Bounded capacity of the download task channel.
    #[arg(long, env = "MMD_DOWNLOAD_QUEUE_DEPTH", default_value_t = 256)]
    pub download_queue_depth: usize,

    /// Bounded capacity of the delete task channel.
    #[arg(long, env = "MMD_DELETE_QUEUE_DEPTH", default_value_t = 256)]
    pub delete_queue_depth: usize,

    /// Address the Prometheus `/metrics` endpoint binds to.
    #[arg(long, env = "MMD_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,

    /// Address the `/healthz` endpoint binds to.
    #[arg(long, env = "MMD_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,
}

impl Config {
    /// Actionable validation beyond what clap's type system already
    /// enforces (SPEC_FULL §2).
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_name.trim().is_empty() {
            return Err(Error::UserInputError("--node-name/NODE_NAME must not be empty".to_string()));
        }
        if self.download_workers == 0 {
            return Err(Error::UserInputError("--download-workers must be greater than zero".to_string()));
        }
        if self.download_queue_depth == 0 {
            return Err(Error::UserInputError("--download-queue-depth must be greater than zero".to_string()));
        }
        if self.delete_queue_depth == 0 {
            return Err(Error::UserInputError("--delete-queue-depth must be greater than zero".to_string()));
        }
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::UserInputError("--root-dir must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            node_name: "node-1".to_string(),
            namespace: "mmd-system".to_string(),
            root_dir: PathBuf::from("/var/lib/model-materializer"),
            label_prefix: "model-materializer.io".to_string(),
            download_workers: 4,
            download_queue_depth: 256,
            delete_queue_depth: 256,
            metrics_addr: "0.0.0.0:9090".parse().unwrap(),
            health_addr: "0.0.0.0:8080".parse().unwrap(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn empty_node_name_fails() {
        let mut config = base_config();
        config.node_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_fails() {
        let mut config = base_config();
        config.download_workers = 0;
        assert!(config.validate().is_err());
    }
}
