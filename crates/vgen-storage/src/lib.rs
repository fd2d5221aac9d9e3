//! Local artifact storage.
//!
//! This crate provides:
//! - Durable per-task metadata records with atomic replace
//! - Streamed, size-capped artifact uploads published by rename
//! - Ranged artifact reads as byte streams

pub mod config;
pub mod content;
pub mod error;
pub mod metadata;

pub use config::{StorageConfig, DEFAULT_MAX_ARTIFACT_BYTES};
pub use content::{ArtifactStream, ContentStore, IncomingArtifact, StoredBlob};
pub use error::{StorageError, StorageResult};
pub use metadata::MetadataStore;
