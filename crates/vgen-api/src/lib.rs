//! Axum HTTP API server.
//!
//! This crate provides:
//! - Task submission and an in-memory task registry
//! - Multipart worker callbacks published to local storage
//! - Range-capable artifact delivery and status polling
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod range;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{CallbackIngestor, TaskRegistry};
pub use state::AppState;
