//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vgen_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vgen_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vgen_http_requests_in_flight";

    // Task metrics
    pub const TASKS_CREATED_TOTAL: &str = "vgen_tasks_created_total";
    pub const TASK_REGISTRY_SIZE: &str = "vgen_task_registry_size";

    // Callback metrics
    pub const CALLBACKS_TOTAL: &str = "vgen_callbacks_total";
    pub const ARTIFACT_BYTES_INGESTED_TOTAL: &str = "vgen_artifact_bytes_ingested_total";

    // Delivery metrics
    pub const DELIVERIES_TOTAL: &str = "vgen_deliveries_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vgen_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record task registered.
pub fn record_task_created() {
    counter!(names::TASKS_CREATED_TOTAL).increment(1);
}

/// Update registry size gauge.
pub fn set_registry_size(size: usize) {
    gauge!(names::TASK_REGISTRY_SIZE).set(size as f64);
}

/// Record a callback outcome (`accepted`, `rejected`, `failed`).
pub fn record_callback(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::CALLBACKS_TOTAL, &labels).increment(1);
}

/// Record bytes of a published artifact.
pub fn record_artifact_ingested(size_bytes: u64) {
    counter!(names::ARTIFACT_BYTES_INGESTED_TOTAL).increment(size_bytes);
}

/// Record a delivery response (`full` or `partial`).
pub fn record_delivery(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::DELIVERIES_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static TASK_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/tasks|/api/video|/api/video-status)/[^/]+").expect("static regex")
});

/// Sanitize path for metrics labels (replace task IDs).
fn sanitize_path(path: &str) -> String {
    TASK_PATH.replace(path, "$1/:task_id").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
