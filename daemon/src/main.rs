mod cancellation;
mod channels;
mod config;
mod engine;
mod health;
mod metadata;
mod metrics;
mod p2p;
mod reuse;
mod status;
mod storage;
mod verify;
mod watcher;

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use channels::{spawn_workers, TaskChannels};
use config::Config;
use engine::DownloadEngine;
use metrics::Metrics;
use p2p::{Coordinator, NoPeerIndex};
use status::StatusPublisher;
use storage::HubBackend;
use watcher::ResourceWatcher;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    if let Err(err) = config.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    if let Err(err) = health::check_root_dir(&config.root_dir).await {
        error!(error = %err, "startup health probe failed, refusing to start");
        std::process::exit(1);
    }

    let client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    let node_info = mmd_common::k8s::get_node_info(client.clone(), &config.node_name)
        .await
        .expect("failed to read node info at startup");

    let metrics = Arc::new(Metrics::new());
    let status = Arc::new(StatusPublisher::new(
        client.clone(),
        config.node_name.clone(),
        config.label_prefix.clone(),
        config.namespace.clone(),
    ));
    let cancellation = Arc::new(cancellation::CancellationRegistry::new());

    let hub = Arc::new(HubBackend::new(storage::AuthConfig::default()).expect("failed to build hub client"));
    let coordinator = Arc::new(Coordinator::new(
        client.clone(),
        config.namespace.clone(),
        config.node_name.clone(),
        Arc::new(NoPeerIndex),
        hub,
        status.clone(),
    ));

    let engine = Arc::new(DownloadEngine::new(
        client.clone(),
        config.root_dir.clone(),
        status.clone(),
        cancellation.clone(),
        metrics.clone(),
        coordinator,
    ));

    let (channels, download_rx, delete_rx) = TaskChannels::new(config.download_queue_depth, config.delete_queue_depth);
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(
        engine,
        metrics.clone(),
        download_rx,
        delete_rx,
        config.download_workers,
        shutdown.clone(),
    );

    let watcher = Arc::new(ResourceWatcher::new(
        client.clone(),
        config.node_name.clone(),
        node_info,
        channels.download_tx.clone(),
        channels.delete_tx.clone(),
    ));

    let metrics_task = tokio::spawn(metrics::serve(metrics.clone(), config.metrics_addr));
    let health_task = tokio::spawn(health::serve(Arc::new(config.root_dir.clone()), config.health_addr));

    let gauge_shutdown = shutdown.clone();
    let gauge_metrics = metrics.clone();
    let gauge_cancellation = cancellation.clone();
    let gauge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = gauge_shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    gauge_metrics.inflight_tasks.set(gauge_cancellation.len().await as i64);
                }
            }
        }
    });

    let watch_shutdown = shutdown.clone();
    let watch_task = tokio::spawn(async move {
        tokio::select! {
            result = watcher.run() => {
                if let Err(err) = result {
                    error!(error = %err, "resource watcher exited with a fatal error, terminating");
                    std::process::exit(1);
                }
            }
            _ = watch_shutdown.cancelled() => {
                info!("resource watcher stopping for shutdown");
            }
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutdown signal received, draining pending deletes");
    shutdown.cancel();

    // Let the watch loop observe the cancellation and exit on its own so its
    // Sender clones are dropped; only then does the delete channel close and
    // the delete worker's drain-to-closure loop below actually terminate.
    let _ = watch_task.await;
    metrics_task.abort();
    health_task.abort();
    gauge_task.abort();
    drop(channels);

    for handle in workers {
        let _ = handle.await;
    }
    info!("shutdown complete");
}
