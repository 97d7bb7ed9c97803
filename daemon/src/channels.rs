use std::sync::Arc;

use mmd_types::Task;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::metrics::Metrics;

/// Implemented by the Download Engine; kept as a trait so the channel
/// plumbing here doesn't need to know the engine's concrete dependencies
/// (storage backends, cancellation registry, status publisher).
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle_download(&self, task: Task);
    async fn handle_delete(&self, task: Task);
}

/// The two bounded Task Channels (§4.B): Download is drained by N worker
/// tasks, Delete by exactly one dedicated worker, so a saturated download
/// pool never delays a pending delete.
pub struct TaskChannels {
    pub download_tx: mpsc::Sender<Task>,
    pub delete_tx: mpsc::Sender<Task>,
}

impl TaskChannels {
    pub fn new(download_depth: usize, delete_depth: usize) -> (Self, mpsc::Receiver<Task>, mpsc::Receiver<Task>) {
        let (download_tx, download_rx) = mpsc::channel(download_depth);
        let (delete_tx, delete_rx) = mpsc::channel(delete_depth);
        (
            TaskChannels {
                download_tx,
                delete_tx,
            },
            download_rx,
            delete_rx,
        )
    }
}

/// Spawns `worker_count` download workers and one delete worker against the
/// given handler. On `shutdown`, download workers stop pulling new tasks
/// immediately; the delete worker keeps draining its channel until it is
/// both closed and empty, so in-flight deletes always finish (SPEC_FULL
/// "Graceful shutdown").
pub fn spawn_workers<H: TaskHandler>(
    handler: Arc<H>,
    metrics: Arc<Metrics>,
    download_rx: mpsc::Receiver<Task>,
    delete_rx: mpsc::Receiver<Task>,
    worker_count: usize,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::with_capacity(worker_count + 1);

    let download_rx = Arc::new(tokio::sync::Mutex::new(download_rx));
    for worker_id in 0..worker_count {
        let handler = handler.clone();
        let download_rx = download_rx.clone();
        let shutdown = shutdown.clone();
        let metrics = metrics.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let task = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    task = async { download_rx.lock().await.recv().await } => task,
                };
                let Some(task) = task else { break };
                let span = info_span!("download_task", model = %task.model_key(), worker = worker_id);
                metrics.active_download_workers.inc();
                handler.handle_download(task).instrument(span).await;
                metrics.active_download_workers.dec();
            }
            info!(worker = worker_id, "download worker exiting");
        }));
    }

    {
        let handler = handler.clone();
        let mut delete_rx = delete_rx;
        handles.push(tokio::spawn(async move {
            while let Some(task) = delete_rx.recv().await {
                let span = info_span!("delete_task", model = %task.model_key());
                handler.handle_delete(task).instrument(span).await;
            }
            info!("delete worker exiting, queue drained");
        }));
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmd_types::{BaseModel, ModelStorageSpec, TaskType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        downloads: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle_download(&self, _task: Task) {
            self.downloads.fetch_add(1, Ordering::SeqCst);
        }

        async fn handle_delete(&self, _task: Task) {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_task(task_type: TaskType) -> Task {
        let bm = BaseModel::new(
            "demo",
            mmd_types::BaseModelSpec {
                storage: ModelStorageSpec {
                    storage_uri: "s3://bucket/prefix".to_string(),
                    ..Default::default()
                },
            },
        );
        Task::new(task_type, bm.into())
    }

    #[tokio::test]
    async fn delete_channel_drains_while_downloads_are_busy() {
        let handler = Arc::new(CountingHandler {
            downloads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        });
        let (channels, download_rx, delete_rx) = TaskChannels::new(4, 4);
        let shutdown = CancellationToken::new();
        let metrics = Arc::new(Metrics::new());
        let handles = spawn_workers(handler.clone(), metrics, download_rx, delete_rx, 2, shutdown.clone());

        channels
            .delete_tx
            .send(sample_task(TaskType::Delete))
            .await
            .unwrap();
        channels
            .download_tx
            .send(sample_task(TaskType::Download))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(channels);
        shutdown.cancel();
        for handle in handles {
            let _ = handle.await;
        }

        assert_eq!(handler.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(handler.deletes.load(Ordering::SeqCst), 1);
    }
}
