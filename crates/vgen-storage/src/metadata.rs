//! Durable per-task artifact metadata.
//!
//! Each task owns one JSON file, `{dir}/{task_id}.json`. Writes go to a
//! sibling temp file which is synced and then renamed over the record, so a
//! reader sees either the previous record or the new one, never a torn file.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use vgen_models::{is_valid_task_id, ArtifactMetadata, TaskId};

use crate::error::{StorageError, StorageResult};

/// File-backed metadata store keyed by task ID.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    /// Open the store, creating its directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::config_error(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task_id: &TaskId) -> StorageResult<PathBuf> {
        if !is_valid_task_id(task_id.as_str()) {
            return Err(StorageError::InvalidKey(task_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", task_id)))
    }

    /// Write the record for `task_id`, replacing any previous one.
    pub async fn put(&self, task_id: &TaskId, metadata: &ArtifactMetadata) -> StorageResult<()> {
        let path = self.record_path(task_id)?;
        let json = serde_json::to_vec_pretty(metadata)?;

        // Creating the directory again covers an operator wiping it at runtime.
        fs::create_dir_all(&self.dir).await?;

        let tmp = self
            .dir
            .join(format!("{}.json.{}.tmp", task_id, Uuid::new_v4().simple()));

        if let Err(e) = write_synced(&tmp, &json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::write_failed(format!(
                "metadata for {}: {}",
                task_id, e
            )));
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::write_failed(format!(
                "publishing metadata for {}: {}",
                task_id, e
            )));
        }

        debug!(task_id = %task_id, path = %path.display(), "Stored artifact metadata");
        Ok(())
    }

    /// Read the record for `task_id`.
    pub async fn get(&self, task_id: &TaskId) -> StorageResult<ArtifactMetadata> {
        let path = self.record_path(task_id)?;
        let bytes = fs::read(&path)
            .await
            .map_err(|e| StorageError::from_io(e, task_id.as_str()))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(task_id = %task_id, error = %e, "Corrupt metadata record");
            StorageError::read_failed(format!("metadata for {}: {}", task_id, e))
        })
    }

    /// Check whether a record exists for `task_id`.
    pub async fn exists(&self, task_id: &TaskId) -> bool {
        match self.record_path(task_id) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Confirm the directory accepts writes.
    pub async fn check_writable(&self) -> StorageResult<()> {
        ensure_dir_writable(&self.dir).await
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Create and remove a scratch file in `dir`.
pub(crate) async fn ensure_dir_writable(dir: &Path) -> StorageResult<()> {
    let scratch = dir.join(format!(".write-check-{}", Uuid::new_v4().simple()));
    fs::write(&scratch, b"ok")
        .await
        .map_err(|e| StorageError::write_failed(format!("{}: {}", dir.display(), e)))?;
    fs::remove_file(&scratch).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample(task_id: &str, duration: f64) -> ArtifactMetadata {
        ArtifactMetadata {
            task_id: TaskId::from(task_id),
            status: "completed".into(),
            duration: Some(duration),
            message: Some("done".into()),
            filename: format!("{}_1.mp4", task_id),
            filepath: PathBuf::from(format!("/tmp/{}_1.mp4", task_id)),
            content_type: "video/mp4".into(),
            size_bytes: 10,
            sha256: "ab".into(),
            received_at: Utc::now(),
            download_url: format!("/api/video/{}", task_id),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path().join("metadata")).await.unwrap();
        let id = TaskId::from("task-1");

        store.put(&id, &sample("task-1", 3.0)).await.unwrap();

        let got = store.get(&id).await.unwrap();
        assert_eq!(got.duration, Some(3.0));
        assert!(store.exists(&id).await);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();

        let err = store.get(&TaskId::from("nope")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists(&TaskId::from("nope")).await);
    }

    #[tokio::test]
    async fn test_last_write_wins_and_no_temp_files_left() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();
        let id = TaskId::from("task-2");

        store.put(&id, &sample("task-2", 1.0)).await.unwrap();
        store.put(&id, &sample("task-2", 2.0)).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap().duration, Some(2.0));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["task-2.json".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();

        let err = store
            .put(&TaskId::from("../escape"), &sample("x", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_read_failure() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();

        let err = store.get(&TaskId::from("bad")).await.unwrap_err();
        assert!(matches!(err, StorageError::ReadFailed(_)));
    }

    #[tokio::test]
    async fn test_check_writable() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).await.unwrap();
        store.check_writable().await.unwrap();
    }
}
