//! Sled-backed artifact store.

use super::ArtifactStore;
use crate::artifact::Artifact;
use crate::error::StorageError;
use crate::types::ArtifactId;
use std::path::Path;

const ARTIFACT_PREFIX: &[u8] = b"artifact:";

fn backend_error(context: &str, e: sled::Error) -> StorageError {
    StorageError::Backend(format!("{}: {}", context, e))
}

fn artifact_key(id: &ArtifactId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ARTIFACT_PREFIX.len() + 16);
    key.extend_from_slice(ARTIFACT_PREFIX);
    key.extend_from_slice(id.as_uuid().as_bytes());
    key
}

/// Sled-based implementation of ArtifactStore
pub struct SledArtifactStore {
    db: sled::Db,
}

impl SledArtifactStore {
    /// Open (or create) the database directory at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| backend_error("Failed to open sled database", e))?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| backend_error("Failed to flush artifact store", e))?;
        Ok(())
    }
}

impl ArtifactStore for SledArtifactStore {
    fn upsert(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let value = bincode::serialize(artifact)
            .map_err(|e| StorageError::Encoding(format!("artifact {}: {}", artifact.id, e)))?;
        self.db
            .insert(artifact_key(&artifact.id), value)
            .map_err(|e| backend_error("Failed to write artifact", e))?;
        Ok(())
    }

    fn delete(&self, id: &ArtifactId) -> Result<(), StorageError> {
        self.db
            .remove(artifact_key(id))
            .map_err(|e| backend_error("Failed to delete artifact", e))?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Artifact>, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(ARTIFACT_PREFIX) {
            let (_, value) = item.map_err(|e| backend_error("Failed to iterate store", e))?;
            let record: Artifact = bincode::deserialize(&value)
                .map_err(|e| StorageError::Encoding(format!("Failed to decode artifact: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }
}
