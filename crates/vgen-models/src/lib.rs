//! Shared data models for the vgen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation tasks and their lifecycle states
//! - Artifact metadata recorded from worker callbacks

pub mod artifact;
pub mod task;

// Re-export common types
pub use artifact::ArtifactMetadata;
pub use task::{download_url, is_valid_task_id, CreateTaskRequest, Task, TaskId, TaskStatus, MAX_TASK_ID_LEN};
