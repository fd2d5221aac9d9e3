//! Task submission handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use vgen_models::{CreateTaskRequest, Task, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Submit a generation job.
///
/// The task stays `pending` until the worker calls back.
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let task = state.registry.create(&request).await?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Get a task snapshot from the registry.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task_id = TaskId::parse(&task_id).map_err(ApiError::bad_request)?;
    let task = state.registry.get(&task_id).await?;
    Ok(Json(task))
}
