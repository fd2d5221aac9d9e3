//! Task definitions for generation jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a task identifier.
pub const MAX_TASK_ID_LEN: usize = 64;

/// Unique identifier for a generation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID (UUID v4, 122 random bits).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse and validate a caller-supplied identifier.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if is_valid_task_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!("Invalid task ID: {:?}", s))
        }
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Validate task ID format.
///
/// Task IDs end up as file names, so only ASCII alphanumerics, `-` and `_`
/// are accepted, 1-64 chars.
pub fn is_valid_task_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_TASK_ID_LEN {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Download reference served for a task's artifact.
pub fn download_url(task_id: &TaskId) -> String {
    format!("/api/video/{}", task_id)
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting for the external worker to call back
    #[default]
    Pending,
    /// Artifact delivered
    Completed,
    /// Worker reported failure
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Map the free-form status declared by a callback to a terminal state.
    ///
    /// `failed`, `failure` and `error` (any case) mean failure; anything else,
    /// including no status at all, means the artifact is the finished result.
    pub fn from_declared(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("failed") | Some("failure") | Some("error") => TaskStatus::Failed,
            _ => TaskStatus::Completed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generation task tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Unique task ID
    pub task_id: TaskId,

    /// Current status
    pub status: TaskStatus,

    /// Script the video is generated from
    pub script: String,

    /// Footage search query
    pub search_query: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Set once the task reaches a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Download reference, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Worker message, set on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Task {
    /// Create a new pending task with a fresh identifier.
    pub fn new(script: impl Into<String>, search_query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            status: TaskStatus::Pending,
            script: script.into(),
            search_query: search_query.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            video_url: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the task completed with its download reference.
    pub fn complete(&mut self, video_url: impl Into<String>) {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.video_url = Some(video_url.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the task failed.
    pub fn fail(&mut self, message: Option<String>) {
        let now = Utc::now();
        self.status = TaskStatus::Failed;
        self.error_message = message;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

/// Request body for task submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub search_query: Option<String>,
}

impl CreateTaskRequest {
    /// Validate the request.
    pub fn validate(&self) -> Result<(), String> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

        if !present(&self.script) || !present(&self.search_query) {
            return Err("Script and search query are required".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(is_valid_task_id(a.as_str()));
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_task_id_validation() {
        assert!(is_valid_task_id("abc123"));
        assert!(is_valid_task_id("anything-never-submitted"));
        assert!(is_valid_task_id("task_01"));
        assert!(!is_valid_task_id(""));
        assert!(!is_valid_task_id("../etc/passwd"));
        assert!(!is_valid_task_id("has space"));
        assert!(!is_valid_task_id("has.dot"));
        assert!(!is_valid_task_id(&"a".repeat(65)));

        assert_eq!(TaskId::parse("  abc  ").unwrap().as_str(), "abc");
        assert!(TaskId::parse("a/b").is_err());
    }

    #[test]
    fn test_declared_status_mapping() {
        assert_eq!(TaskStatus::from_declared(None), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_declared(Some("completed")), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_declared(Some("success")), TaskStatus::Completed);
        assert_eq!(TaskStatus::from_declared(Some("FAILED")), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_declared(Some(" error ")), TaskStatus::Failed);
    }

    #[test]
    fn test_task_transitions() {
        let mut task = Task::new("script", "query");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.is_terminal());
        assert!(task.completed_at.is_none());

        let url = download_url(&task.task_id);
        task.complete(url.clone());
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.video_url.as_deref(), Some(url.as_str()));
        assert!(task.is_terminal());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateTaskRequest {
            script: Some("a script".into()),
            search_query: Some("ocean waves".into()),
        };
        assert!(ok.validate().is_ok());

        let missing = CreateTaskRequest {
            script: Some("a script".into()),
            search_query: None,
        };
        assert!(missing.validate().is_err());

        let blank = CreateTaskRequest {
            script: Some("   ".into()),
            search_query: Some("q".into()),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TaskStatus::Pending).unwrap(), "\"pending\"");
        let task = Task::new("s", "q");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("video_url").is_none());
    }
}
