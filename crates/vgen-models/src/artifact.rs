//! Artifact metadata persisted once a callback has been accepted.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskStatus};

/// Declared outcome and storage location of a task's artifact.
///
/// One record per task. A redelivered callback replaces the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub task_id: TaskId,

    /// Status string as declared by the worker, stored verbatim
    pub status: String,

    /// Declared video duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Free-text message from the worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Stored blob file name
    pub filename: String,

    /// Stored blob path
    pub filepath: PathBuf,

    /// Declared media type of the uploaded part
    pub content_type: String,

    pub size_bytes: u64,

    /// Hex SHA-256 of the stored bytes
    pub sha256: String,

    pub received_at: DateTime<Utc>,

    pub download_url: String,
}

impl ArtifactMetadata {
    /// Registry state implied by the declared status.
    pub fn outcome(&self) -> TaskStatus {
        TaskStatus::from_declared(Some(&self.status))
    }
}
