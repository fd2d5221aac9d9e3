//! API configuration.

use std::time::Duration;

/// Media type accepted for uploaded artifacts unless overridden.
pub const DEFAULT_ARTIFACT_CONTENT_TYPE: &str = "video/mp4";

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second (per client IP, JSON routes)
    pub rate_limit_rps: u32,
    /// Request timeout for JSON routes
    pub request_timeout: Duration,
    /// Max request body size for JSON routes
    pub max_body_size: usize,
    /// Media type the callback's `video` part must declare
    pub artifact_content_type: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
            artifact_content_type: DEFAULT_ARTIFACT_CONTENT_TYPE.to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            artifact_content_type: std::env::var("ARTIFACT_CONTENT_TYPE")
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or(defaults.artifact_content_type),
        }
    }
}
