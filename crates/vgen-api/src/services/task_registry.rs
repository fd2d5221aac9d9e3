//! In-memory task lifecycle registry.
//!
//! Tracks every submitted task from `pending` to a terminal state for the
//! lifetime of the process. Once a callback is accepted the Metadata Store
//! holds the durable record; the registry is not persisted.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use vgen_models::{download_url, CreateTaskRequest, Task, TaskId, TaskStatus};

use crate::metrics;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Task {id} is already {status}")]
    AlreadyTerminal { id: TaskId, status: TaskStatus },

    #[error("Cannot move task {id} to {status}")]
    InvalidTransition { id: TaskId, status: TaskStatus },
}

/// Shared registry of tasks keyed by ID.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the request and register a new pending task.
    pub async fn create(&self, request: &CreateTaskRequest) -> Result<Task, RegistryError> {
        request.validate().map_err(RegistryError::InvalidRequest)?;

        let task = Task::new(
            request.script.as_deref().unwrap_or_default().trim(),
            request.search_query.as_deref().unwrap_or_default().trim(),
        );

        let len = {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.task_id.clone(), task.clone());
            tasks.len()
        };

        metrics::record_task_created();
        metrics::set_registry_size(len);
        info!(task_id = %task.task_id, "Task registered");

        Ok(task)
    }

    /// Look up a task.
    pub async fn get(&self, id: &TaskId) -> Result<Task, RegistryError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Move a pending task to `status`.
    ///
    /// Terminal states are final: a transition out of one is rejected with
    /// [`RegistryError::AlreadyTerminal`] and leaves the task untouched.
    /// `message` is kept as the failure reason when `status` is `Failed`.
    pub async fn transition(
        &self,
        id: &TaskId,
        status: TaskStatus,
        message: Option<String>,
    ) -> Result<Task, RegistryError> {
        if !status.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                status,
            });
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if task.is_terminal() {
            return Err(RegistryError::AlreadyTerminal {
                id: id.clone(),
                status: task.status,
            });
        }

        if status == TaskStatus::Completed {
            task.complete(download_url(id));
        } else {
            task.fail(message);
        }

        info!(task_id = %id, status = %task.status, "Task transitioned");
        Ok(task.clone())
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(script: &str, query: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            script: Some(script.to_string()),
            search_query: Some(query.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_is_pending() {
        let registry = TaskRegistry::new();
        let task = registry.create(&request("a script", "sunsets")).await.unwrap();

        let got = registry.get(&task.task_id).await.unwrap();
        assert_eq!(got.status, TaskStatus::Pending);
        assert_eq!(got.script, "a script");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let registry = TaskRegistry::new();
        let err = registry
            .create(&CreateTaskRequest {
                script: Some("s".into()),
                search_query: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidRequest(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let registry = TaskRegistry::new();
        let id = TaskId::from("missing");

        assert!(matches!(registry.get(&id).await, Err(RegistryError::NotFound(_))));
        assert!(matches!(
            registry.transition(&id, TaskStatus::Completed, None).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_to_completed_is_final() {
        let registry = TaskRegistry::new();
        let task = registry.create(&request("s", "q")).await.unwrap();
        let id = task.task_id.clone();

        let done = registry.transition(&id, TaskStatus::Completed, None).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.video_url, Some(format!("/api/video/{}", id)));

        let err = registry
            .transition(&id, TaskStatus::Failed, Some("late".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AlreadyTerminal { status: TaskStatus::Completed, .. }
        ));
        assert_eq!(registry.get(&id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_pending_to_failed_keeps_message() {
        let registry = TaskRegistry::new();
        let task = registry.create(&request("s", "q")).await.unwrap();

        let failed = registry
            .transition(&task.task_id, TaskStatus::Failed, Some("render crashed".into()))
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("render crashed"));
        assert!(failed.video_url.is_none());
    }

    #[tokio::test]
    async fn test_transition_to_pending_is_rejected() {
        let registry = TaskRegistry::new();
        let task = registry.create(&request("s", "q")).await.unwrap();

        let err = registry
            .transition(&task.task_id, TaskStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }
}
