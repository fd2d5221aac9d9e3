//! Artifact blob storage on the local filesystem.
//!
//! Uploads stream into `{root}/.incoming/{uuid}.part` and are renamed to
//! `{root}/{task_id}_{millis}.mp4` only once complete. Reads are ranged and
//! streamed straight from the file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use vgen_models::{is_valid_task_id, TaskId};

use crate::error::{StorageError, StorageResult};
use crate::metadata::ensure_dir_writable;

const INCOMING_DIR: &str = ".incoming";

/// Body stream over a byte window of a stored artifact.
pub type ArtifactStream = ReaderStream<Take<File>>;

/// Blob store rooted at a content directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    max_artifact_bytes: u64,
}

impl ContentStore {
    /// Open the store, creating the content and incoming directories.
    pub async fn open(root: impl Into<PathBuf>, max_artifact_bytes: u64) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(INCOMING_DIR)).await.map_err(|e| {
            StorageError::config_error(format!("Failed to create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            max_artifact_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_artifact_bytes(&self) -> u64 {
        self.max_artifact_bytes
    }

    /// Blob file name for a task's artifact received at `received_at`.
    pub fn blob_filename(task_id: &TaskId, received_at: DateTime<Utc>) -> String {
        format!("{}_{}.mp4", task_id, received_at.timestamp_millis())
    }

    /// Start receiving a new artifact.
    pub async fn begin_upload(&self) -> StorageResult<IncomingArtifact> {
        let incoming = self.root.join(INCOMING_DIR);
        fs::create_dir_all(&incoming).await?;

        let path = incoming.join(format!("{}.part", Uuid::new_v4()));
        let file = File::create(&path)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Receiving artifact");

        Ok(IncomingArtifact {
            path,
            file: Some(file),
            hasher: Sha256::new(),
            written: 0,
            limit: self.max_artifact_bytes,
            published: false,
        })
    }

    /// Size in bytes of a stored blob.
    pub async fn size_of(&self, path: &Path) -> StorageResult<u64> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display().to_string()))?;
        if !meta.is_file() {
            return Err(StorageError::not_found(path.display().to_string()));
        }
        Ok(meta.len())
    }

    /// Open `len` bytes of a blob starting at `start` as a stream.
    pub async fn open_range(&self, path: &Path, start: u64, len: u64) -> StorageResult<ArtifactStream> {
        let mut file = File::open(path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display().to_string()))?;

        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| StorageError::read_failed(format!("{}: {}", path.display(), e)))?;
        }

        Ok(ReaderStream::new(file.take(len)))
    }

    /// Remove a blob. Missing files are not an error.
    pub async fn remove(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Confirm the directory accepts writes.
    pub async fn check_writable(&self) -> StorageResult<()> {
        ensure_dir_writable(&self.root).await
    }
}

/// A stored, fully written artifact.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// An artifact being received.
///
/// Dropping it without calling [`IncomingArtifact::publish`] removes the
/// partial file.
pub struct IncomingArtifact {
    path: PathBuf,
    file: Option<File>,
    hasher: Sha256,
    written: u64,
    limit: u64,
    published: bool,
}

impl IncomingArtifact {
    /// Append a chunk, enforcing the size cap.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let next = self.written + chunk.len() as u64;
        if next > self.limit {
            return Err(StorageError::TooLarge { limit: self.limit });
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::write_failed("upload already finished"))?;
        file.write_all(chunk)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", self.path.display(), e)))?;

        self.hasher.update(chunk);
        self.written = next;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Sync the data and move it to `{root}/{task_id}_{millis}.mp4`.
    pub async fn publish(
        mut self,
        store: &ContentStore,
        task_id: &TaskId,
        received_at: DateTime<Utc>,
    ) -> StorageResult<StoredBlob> {
        if !is_valid_task_id(task_id.as_str()) {
            return Err(StorageError::InvalidKey(task_id.to_string()));
        }

        let mut file = self
            .file
            .take()
            .ok_or_else(|| StorageError::write_failed("upload already finished"))?;
        file.flush().await?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", self.path.display(), e)))?;
        drop(file);

        let mut filename = ContentStore::blob_filename(task_id, received_at);
        let mut dest = store.root.join(&filename);
        // Same task, same millisecond: never replace a blob another record may point at.
        if fs::try_exists(&dest).await.unwrap_or(false) {
            let suffix = Uuid::new_v4().simple().to_string();
            filename = format!("{}_{}_{}.mp4", task_id, received_at.timestamp_millis(), &suffix[..8]);
            dest = store.root.join(&filename);
        }

        fs::rename(&self.path, &dest).await.map_err(|e| {
            StorageError::write_failed(format!("publishing {}: {}", dest.display(), e))
        })?;
        self.published = true;

        let sha256 = format!("{:x}", std::mem::take(&mut self.hasher).finalize());

        Ok(StoredBlob {
            filename,
            path: dest,
            size_bytes: self.written,
            sha256,
        })
    }
}

impl Drop for IncomingArtifact {
    fn drop(&mut self) {
        drop(self.file.take());
        // Blocking unlink: the partial file is gone once the drop returns.
        if !self.published {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload");
                }
            }
        }
    }
}
