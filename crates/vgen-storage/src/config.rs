//! Storage configuration.

use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};

/// Default cap on a single uploaded artifact (512 MiB).
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 512 * 1024 * 1024;

/// Configuration for local artifact storage.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding metadata and content
    pub root: PathBuf,
    /// Maximum accepted artifact size in bytes
    pub max_artifact_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("uploads"),
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }
}

impl StorageConfig {
    /// Create config rooted at `root` with the default size cap.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let root = std::env::var("UPLOAD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        let max_artifact_bytes = match std::env::var("MAX_ARTIFACT_BYTES") {
            Ok(v) => v.trim().parse().map_err(|_| {
                StorageError::config_error(format!("MAX_ARTIFACT_BYTES is not a byte count: {}", v))
            })?,
            Err(_) => DEFAULT_MAX_ARTIFACT_BYTES,
        };

        if max_artifact_bytes == 0 {
            return Err(StorageError::config_error("MAX_ARTIFACT_BYTES must be positive"));
        }

        Ok(Self {
            root,
            max_artifact_bytes,
        })
    }

    /// Directory holding one JSON record per task.
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    /// Directory holding artifact blobs.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join("videos")
    }
}
