use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::{error, info};

/// Exact metric names and labels are pinned by §4.K; these are pure data
/// sinks, nothing downstream ever branches on a reading.
pub struct Metrics {
    pub downloads_success_total: IntCounter,
    pub downloads_failed_total: IntCounterVec,
    pub verifications_total: CounterVec,
    pub md5_failed_total: IntCounter,
    pub bytes_total: IntCounter,
    pub rate_limit_total: IntCounter,
    pub download_duration_seconds: HistogramVec,
    pub verification_duration_seconds: HistogramVec,
    pub active_download_workers: IntGauge,
    pub inflight_tasks: IntGauge,
    registry: Registry,
}

impl Metrics {
    /// Builds every collector against a private [`Registry`] rather than the
    /// `prometheus` crate's process-global default one (the `register_*!`
    /// convenience macros always target the latter), so constructing more
    /// than one `Metrics` in the same process — as the test suite across
    /// several modules does — never collides on a duplicate metric name.
    pub fn new() -> Self {
        let registry = Registry::new();

        let downloads_success_total =
            IntCounter::new("downloads_success_total", "Successful model download completions").unwrap();
        let downloads_failed_total = IntCounterVec::new(
            Opts::new("downloads_failed_total", "Failed model download completions"),
            &["error_type"],
        )
        .unwrap();
        let verifications_total = CounterVec::new(
            Opts::new("verifications_total", "Integrity verification outcomes"),
            &["result"],
        )
        .unwrap();
        let md5_failed_total = IntCounter::new("md5_failed_total", "Checksum verification failures").unwrap();
        let bytes_total = IntCounter::new("bytes_total", "Total bytes transferred").unwrap();
        let rate_limit_total =
            IntCounter::new("rate_limit_total", "Rate-limit responses observed from a backend").unwrap();
        let download_duration_seconds = HistogramVec::new(
            HistogramOpts::new("download_duration_seconds", "End-to-end download task duration"),
            &["provider"],
        )
        .unwrap();
        let verification_duration_seconds = HistogramVec::new(
            HistogramOpts::new("verification_duration_seconds", "Integrity Verifier latency"),
            &["provider"],
        )
        .unwrap();
        let active_download_workers =
            IntGauge::new("active_download_workers", "Download workers currently processing a task").unwrap();
        let inflight_tasks =
            IntGauge::new("inflight_tasks", "Tasks registered in the Cancellation Registry").unwrap();

        for c in [
            Box::new(downloads_success_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(downloads_failed_total.clone()),
            Box::new(verifications_total.clone()),
            Box::new(md5_failed_total.clone()),
            Box::new(bytes_total.clone()),
            Box::new(rate_limit_total.clone()),
            Box::new(download_duration_seconds.clone()),
            Box::new(verification_duration_seconds.clone()),
            Box::new(active_download_workers.clone()),
            Box::new(inflight_tasks.clone()),
        ] {
            let _ = registry.register(c);
        }

        Metrics {
            downloads_success_total,
            downloads_failed_total,
            verifications_total,
            md5_failed_total,
            bytes_total,
            rate_limit_total,
            download_duration_seconds,
            verification_duration_seconds,
            active_download_workers,
            inflight_tasks,
            registry,
        }
    }

    pub fn record_error(&self, metric_tag: &str) {
        self.downloads_failed_total.with_label_values(&[metric_tag]).inc();
        if metric_tag == "rate_limit_error" {
            self.rate_limit_total.inc();
        }
        if metric_tag == "md5_verification_error" {
            self.md5_failed_total.inc();
        }
    }

    fn gather(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %err, "failed to encode metrics");
        }
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics` on `addr` until the process exits. Grounded in the
/// teacher's use of a bare `hyper::Server` for its own sidecar HTTP needs,
/// generalized here to a Prometheus exposition endpoint.
pub async fn serve(metrics: Arc<Metrics>, addr: SocketAddr) {
    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let body = match req.uri().path() {
                        "/metrics" => metrics.gather(),
                        _ => return Ok::<_, Infallible>(
                            Response::builder().status(404).body(Body::empty()).unwrap(),
                        ),
                    };
                    Ok(Response::new(Body::from(body)))
                }
            }))
        }
    });

    info!(%addr, "serving metrics");
    if let Err(err) = Server::bind(&addr).serve(make_svc).await {
        error!(error = %err, "metrics server exited");
    }
}
