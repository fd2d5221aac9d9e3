//! Task status polling endpoint.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use vgen_models::{ArtifactMetadata, Task, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Status of a task as seen by polling clients.
#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub task_id: TaskId,
    pub status: String,
    pub duration: Option<f64>,
    #[serde(rename = "downloadUrl")]
    pub download_url: Option<String>,
    #[serde(rename = "receivedAt")]
    pub received_at: Option<DateTime<Utc>>,
}

impl From<ArtifactMetadata> for VideoStatusResponse {
    fn from(record: ArtifactMetadata) -> Self {
        Self {
            task_id: record.task_id,
            status: record.status,
            duration: record.duration,
            download_url: Some(record.download_url),
            received_at: Some(record.received_at),
        }
    }
}

impl From<Task> for VideoStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status.as_str().to_string(),
            duration: None,
            download_url: None,
            received_at: None,
        }
    }
}

/// Get task status.
///
/// A stored callback record wins; otherwise the registry's view of a
/// task that has not been called back yet.
pub async fn get_video_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<VideoStatusResponse>> {
    let task_id = TaskId::parse(&task_id).map_err(ApiError::bad_request)?;

    match state.metadata.get(&task_id).await {
        Ok(record) => return Ok(Json(record.into())),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(ApiError::Storage(e)),
    }

    let task = state
        .registry
        .get(&task_id)
        .await
        .map_err(|_| ApiError::not_found("Video not found"))?;

    Ok(Json(task.into()))
}
