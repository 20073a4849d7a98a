//! In-memory artifact store for tests and ephemeral sessions.

use super::ArtifactStore;
use crate::artifact::Artifact;
use crate::error::StorageError;
use crate::types::ArtifactId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    records: RwLock<BTreeMap<ArtifactId, Artifact>>,
    failing: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to simulate an unavailable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, id: &ArtifactId) -> Option<Artifact> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("memory store set to fail".to_string()));
        }
        Ok(())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn upsert(&self, artifact: &Artifact) -> Result<(), StorageError> {
        self.check()?;
        self.records.write().insert(artifact.id, artifact.clone());
        Ok(())
    }

    fn delete(&self, id: &ArtifactId) -> Result<(), StorageError> {
        self.check()?;
        self.records.write().remove(id);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Artifact>, StorageError> {
        self.check()?;
        Ok(self.records.read().values().cloned().collect())
    }
}
