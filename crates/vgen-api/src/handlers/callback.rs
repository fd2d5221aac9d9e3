//! Worker callback handler.
//!
//! `POST /api/video-callback` takes `multipart/form-data` with a binary
//! `video` part and text fields `task_id`, `status`, `duration`, `message`
//! in any order. The video part is streamed to disk as it arrives.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::CallbackSubmission;
use crate::state::AppState;

/// Callback acknowledgement.
#[derive(Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

/// Receive a finished artifact from the worker.
pub async fn video_callback(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    let result = receive(&state, multipart).await;

    match &result {
        Ok(_) => metrics::record_callback("accepted"),
        Err(e) if e.status_code().is_client_error() => {
            warn!(error = %e, "Video callback rejected");
            metrics::record_callback("rejected");
        }
        Err(_) => metrics::record_callback("failed"),
    }

    result
}

async fn receive(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let submission = read_submission(state, &mut multipart).await?;

    let record = state.ingestor.ingest(submission).await?;

    Ok(Json(CallbackResponse {
        success: true,
        message: "Video received successfully".to_string(),
        download_url: record.download_url,
    }))
}

async fn read_submission(
    state: &AppState,
    multipart: &mut Multipart,
) -> ApiResult<CallbackSubmission> {
    let mut submission = CallbackSubmission::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "video" => {
                if submission.artifact.is_some() {
                    return Err(ApiError::bad_request("Only one video part is accepted"));
                }

                let expected = &state.config.artifact_content_type;
                let declared = field.content_type().map(media_type_essence);
                if declared.as_deref() != Some(expected.as_str()) {
                    return Err(ApiError::unsupported_media_type(format!(
                        "video part must be {}, got {}",
                        expected,
                        declared.as_deref().unwrap_or("no content type")
                    )));
                }

                let mut upload = state.content.begin_upload().await?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    upload.write_chunk(&chunk).await?;
                }
                debug!(bytes = upload.bytes_written(), "Video part received");

                submission.artifact = Some((upload, expected.clone()));
            }
            "task_id" => submission.task_id = Some(text(field).await?),
            "status" => submission.status = Some(text(field).await?),
            "duration" => submission.duration = Some(text(field).await?),
            "message" => submission.message = Some(text(field).await?),
            other => debug!(field = other, "Ignoring unknown callback field"),
        }
    }

    Ok(submission)
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(multipart_error)
}

/// `video/MP4; codecs="avc1"` → `video/mp4`
fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
