//! Worker callback ingestion.
//!
//! A callback delivers the finished artifact plus the worker's declared
//! outcome. The artifact is published to content storage first; the metadata
//! record that points at it is written only after that succeeds, and the
//! registry is updated last.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use vgen_models::{download_url, ArtifactMetadata, TaskId, TaskStatus};
use vgen_storage::{ContentStore, IncomingArtifact, MetadataStore};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::task_locks::TaskLocks;
use crate::services::task_registry::{RegistryError, TaskRegistry};

/// Status recorded when the worker does not declare one.
pub const DEFAULT_DECLARED_STATUS: &str = "completed";

/// Fields collected from a callback request.
#[derive(Default)]
pub struct CallbackSubmission {
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub duration: Option<String>,
    pub message: Option<String>,
    /// Received artifact and its declared media type
    pub artifact: Option<(IncomingArtifact, String)>,
}

/// Publishes callback artifacts and their metadata.
#[derive(Clone)]
pub struct CallbackIngestor {
    metadata: Arc<MetadataStore>,
    content: Arc<ContentStore>,
    registry: TaskRegistry,
    locks: TaskLocks,
}

impl CallbackIngestor {
    pub fn new(
        metadata: Arc<MetadataStore>,
        content: Arc<ContentStore>,
        registry: TaskRegistry,
    ) -> Self {
        Self {
            metadata,
            content,
            registry,
            locks: TaskLocks::new(),
        }
    }

    /// Validate a submission and publish it.
    ///
    /// Any error before the metadata write leaves no record behind; a
    /// metadata write failure also removes the blob this call published.
    pub async fn ingest(&self, submission: CallbackSubmission) -> ApiResult<ArtifactMetadata> {
        let CallbackSubmission {
            task_id,
            status,
            duration,
            message,
            artifact,
        } = submission;

        let (artifact, content_type) =
            artifact.ok_or_else(|| ApiError::bad_request("No video file received"))?;

        let task_id = match task_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => TaskId::parse(id).map_err(ApiError::bad_request)?,
            _ => return Err(ApiError::bad_request("task_id is required")),
        };

        let duration = parse_duration(duration.as_deref())?;
        let status = status
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_DECLARED_STATUS.to_string());
        let message = message.filter(|m| !m.trim().is_empty());

        let received_at = Utc::now();
        let _guard = self.locks.lock(&task_id).await;

        let blob = artifact
            .publish(&self.content, &task_id, received_at)
            .await
            .map_err(|e| {
                error!(task_id = %task_id, error = %e, "Failed to store artifact");
                ApiError::Storage(e)
            })?;

        let record = ArtifactMetadata {
            task_id: task_id.clone(),
            status,
            duration,
            message,
            filename: blob.filename,
            filepath: blob.path,
            content_type,
            size_bytes: blob.size_bytes,
            sha256: blob.sha256,
            received_at,
            download_url: download_url(&task_id),
        };

        if let Err(e) = self.metadata.put(&task_id, &record).await {
            error!(task_id = %task_id, error = %e, "Failed to write metadata, discarding artifact");
            if let Err(cleanup) = self.content.remove(&record.filepath).await {
                warn!(
                    task_id = %task_id,
                    path = %record.filepath.display(),
                    error = %cleanup,
                    "Failed to remove unpublished artifact"
                );
            }
            return Err(ApiError::Storage(e));
        }

        self.sync_registry(&record).await;

        metrics::record_artifact_ingested(record.size_bytes);
        info!(
            task_id = %task_id,
            status = %record.status,
            size_bytes = record.size_bytes,
            filename = %record.filename,
            "Video callback stored"
        );

        Ok(record)
    }

    /// Bring the registry in line with an accepted record.
    ///
    /// The metadata record is authoritative once written, so registry
    /// disagreements are logged rather than failing the callback.
    async fn sync_registry(&self, record: &ArtifactMetadata) {
        let outcome = record.outcome();
        let message = (outcome == TaskStatus::Failed)
            .then(|| record.message.clone())
            .flatten();

        match self.registry.transition(&record.task_id, outcome, message).await {
            Ok(_) => {}
            Err(RegistryError::NotFound(id)) => {
                debug!(task_id = %id, "Callback for a task not in the registry");
            }
            Err(RegistryError::AlreadyTerminal { id, status }) => {
                warn!(
                    task_id = %id,
                    registry_status = %status,
                    declared_status = %record.status,
                    "Redelivered callback for a finished task; metadata replaced"
                );
            }
            Err(e) => warn!(task_id = %record.task_id, error = %e, "Registry update rejected"),
        }
    }
}

fn parse_duration(raw: Option<&str>) -> ApiResult<Option<f64>> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(None),
    };

    match raw.parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Ok(Some(d)),
        _ => Err(ApiError::bad_request(format!("Invalid duration: {:?}", raw))),
    }
}
