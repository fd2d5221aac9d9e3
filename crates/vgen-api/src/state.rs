//! Application state.

use std::sync::Arc;

use vgen_storage::{ContentStore, MetadataStore, StorageConfig, StorageResult};

use crate::config::ApiConfig;
use crate::services::{CallbackIngestor, TaskRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub metadata: Arc<MetadataStore>,
    pub content: Arc<ContentStore>,
    pub registry: TaskRegistry,
    pub ingestor: CallbackIngestor,
}

impl AppState {
    /// Open the stores under `storage.root` and wire up the services.
    pub async fn new(config: ApiConfig, storage: StorageConfig) -> StorageResult<Self> {
        let metadata = Arc::new(MetadataStore::open(storage.metadata_dir()).await?);
        let content = Arc::new(
            ContentStore::open(storage.content_dir(), storage.max_artifact_bytes).await?,
        );
        let registry = TaskRegistry::new();
        let ingestor = CallbackIngestor::new(
            Arc::clone(&metadata),
            Arc::clone(&content),
            registry.clone(),
        );

        Ok(Self {
            config,
            metadata,
            content,
            registry,
            ingestor,
        })
    }
}
