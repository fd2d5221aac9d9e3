//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vgen_storage::StorageError;

use crate::services::RegistryError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Range not satisfiable: {reason}")]
    InvalidRange { reason: String, size: u64 },

    #[error("Rate limited")]
    RateLimited,

    #[error("Data inconsistency: {0}")]
    Inconsistency(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }

    pub fn invalid_range(reason: impl Into<String>, size: u64) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
            size,
        }
    }

    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::Inconsistency(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Inconsistency(_) | ApiError::Internal(_) | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) | ApiError::Storage(StorageError::NotFound(_)) => "not_found",
            ApiError::BadRequest(_)
            | ApiError::Validation(_)
            | ApiError::Storage(StorageError::InvalidKey(_)) => "invalid_request",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::PayloadTooLarge(_) | ApiError::Storage(StorageError::TooLarge { .. }) => {
                "payload_too_large"
            }
            ApiError::InvalidRange { .. } => "invalid_range",
            ApiError::RateLimited => "rate_limited",
            ApiError::Inconsistency(_) => "inconsistency",
            ApiError::Storage(_) => "storage_failure",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => ApiError::not_found(format!("Task not found: {}", id)),
            RegistryError::InvalidRequest(msg) => ApiError::Validation(msg),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/// True when `ENVIRONMENT` names production.
fn hides_internal_details() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|env| is_production(&env))
        .unwrap_or(false)
}

fn is_production(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status.is_server_error() && hides_internal_details() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: Some(self.code().to_string()),
        };

        let mut response = (status, Json(body)).into_response();

        if let ApiError::InvalidRange { size, .. } = self {
            if let Ok(value) = format!("bytes */{}", size).parse() {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}
