//! Artifact Persistence
//!
//! The in-memory registry is the source of truth while a session runs. Stores only mirror
//! it, and every write goes through [`BestEffortSink`], which logs failures and never
//! reports them back to the state transition that caused the write.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryArtifactStore;
pub use sled_store::SledArtifactStore;

use crate::artifact::Artifact;
use crate::error::StorageError;
use crate::types::ArtifactId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Artifact store interface
pub trait ArtifactStore: Send + Sync {
    fn upsert(&self, artifact: &Artifact) -> Result<(), StorageError>;
    fn delete(&self, id: &ArtifactId) -> Result<(), StorageError>;
    fn list_all(&self) -> Result<Vec<Artifact>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Keep artifacts in memory only.
    #[serde(default)]
    pub ephemeral: bool,
    /// Database directory. Relative paths resolve against the workspace.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".easel/artifacts")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ephemeral: false,
            path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_path(&self, workspace: &std::path::Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace.join(&self.path)
        }
    }

    /// Open the configured store.
    pub fn open(&self, workspace: &std::path::Path) -> Result<Arc<dyn ArtifactStore>, StorageError> {
        if self.ephemeral {
            return Ok(Arc::new(MemoryArtifactStore::new()));
        }
        let path = self.resolve_path(workspace);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Arc::new(SledArtifactStore::new(path)?))
    }
}

/// Fire-and-forget writer in front of an optional store.
#[derive(Clone, Default)]
pub struct BestEffortSink {
    store: Option<Arc<dyn ArtifactStore>>,
}

impl BestEffortSink {
    pub fn new(store: Option<Arc<dyn ArtifactStore>>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn persist(&self, artifact: &Artifact) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.upsert(artifact) {
            warn!(
                artifact_id = %artifact.id,
                status = %artifact.status,
                error = %err,
                "failed to persist artifact"
            );
        }
    }

    pub fn persist_all<'a>(&self, artifacts: impl IntoIterator<Item = &'a Artifact>) {
        for artifact in artifacts {
            self.persist(artifact);
        }
    }

    pub fn remove(&self, id: &ArtifactId) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.delete(id) {
            warn!(artifact_id = %id, error = %err, "failed to delete persisted artifact");
        }
    }

    /// Read everything back. A failed read yields an empty list.
    pub fn load(&self) -> Vec<Artifact> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.list_all() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to load persisted artifacts");
                Vec::new()
            }
        }
    }
}
