//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    create_task, get_task, get_video, get_video_status, health, ready, video_callback,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Room for multipart boundaries and the text fields around the video part.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Small JSON requests: rate-limited, time-boxed, tight body cap
    let json_routes = Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/:task_id", get(get_task))
        .route("/api/video-status/:task_id", get(get_video_status))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Uploads are bounded by the artifact cap instead of axum's 2MB default
    let callback_limit = usize::try_from(state.content.max_artifact_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let callback_routes = Router::new()
        .route("/api/video-callback", post(video_callback))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(callback_limit));

    // Downloads can run as long as the client keeps reading
    let delivery_routes = Router::new().route("/api/video/:task_id", get(get_video));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(json_routes)
        .merge(callback_routes)
        .merge(delivery_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
