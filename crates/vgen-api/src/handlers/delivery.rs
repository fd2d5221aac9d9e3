//! Artifact delivery with byte-range support.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tracing::{debug, error};

use vgen_models::TaskId;
use vgen_storage::StorageError;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::range::parse_range;
use crate::state::AppState;

/// Stream a task's artifact, whole or as a single byte range.
pub async fn get_video(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let task_id = TaskId::parse(&task_id).map_err(ApiError::bad_request)?;

    let record = state.metadata.get(&task_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found("Video not found")
        } else {
            ApiError::Storage(e)
        }
    })?;

    // The record exists, so the blob must too.
    let size = state
        .content
        .size_of(&record.filepath)
        .await
        .map_err(|e| missing_blob(&task_id, &record.filepath, e))?;

    let range_header = headers
        .get(header::RANGE)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::invalid_range("malformed range", size))
        })
        .transpose()?;

    let (status, start, len, content_range) = match range_header {
        Some(value) => {
            let range = parse_range(value, size)?;
            debug!(task_id = %task_id, range = %range.content_range(), "Serving partial content");
            (
                StatusCode::PARTIAL_CONTENT,
                range.start,
                range.length(),
                Some(range.content_range()),
            )
        }
        None => (StatusCode::OK, 0, size, None),
    };

    let stream = state
        .content
        .open_range(&record.filepath, start, len)
        .await
        .map_err(|e| missing_blob(&task_id, &record.filepath, e))?;

    let mut response_builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, record.content_type.as_str())
        .header(header::CONTENT_LENGTH, len)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"generated_video_{}.mp4\"", task_id),
        )
        .header("Cross-Origin-Resource-Policy", "cross-origin");

    if let Some(content_range) = content_range {
        response_builder = response_builder.header(header::CONTENT_RANGE, content_range);
        metrics::record_delivery("partial");
    } else {
        metrics::record_delivery("full");
    }

    response_builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

fn missing_blob(task_id: &TaskId, path: &std::path::Path, e: StorageError) -> ApiError {
    if e.is_not_found() {
        error!(
            task_id = %task_id,
            path = %path.display(),
            "Metadata references a missing artifact"
        );
        ApiError::inconsistency(format!("Artifact for task {} is missing", task_id))
    } else {
        ApiError::Storage(e)
    }
}
