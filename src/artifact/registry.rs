//! In-memory artifact collection: the single source of truth for a session.
//!
//! All mutations are synchronous. Callers hold the registry behind a lock only for the
//! duration of one call and never across an await point.

use super::{
    Approval, Artifact, ArtifactKind, ArtifactStatus, DiscardReason, FailureOrigin, WriteOutcome,
};
use crate::backend::ImagePayload;
use crate::error::ApiError;
use crate::request::GenerationSpec;
use crate::types::ArtifactId;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub const INTERRUPTED_DETAIL: &str = "Generation was interrupted before it finished";

#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    artifacts: BTreeMap<ArtifactId, Artifact>,
    /// Ids that existed at some point; derivatives may only point at these.
    known: HashSet<ArtifactId>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(id)
    }

    /// All artifacts in creation order.
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.artifacts.values().cloned().collect()
    }

    pub fn has_existed(&self, id: &ArtifactId) -> bool {
        self.known.contains(id)
    }

    pub fn find_active_primary(&self, request_key: &str) -> Option<&Artifact> {
        self.artifacts.values().find(|a| {
            a.kind == ArtifactKind::Primary && a.request_key == request_key && a.is_active()
        })
    }

    fn insert(&mut self, artifact: Artifact) -> Artifact {
        self.known.insert(artifact.id);
        self.artifacts.insert(artifact.id, artifact.clone());
        artifact
    }

    fn get_mut(&mut self, id: &ArtifactId) -> Result<&mut Artifact, ApiError> {
        self.artifacts
            .get_mut(id)
            .ok_or(ApiError::ArtifactNotFound(*id))
    }

    /// Create a `generating` primary for `request_key`, unless one is already active.
    pub fn begin_primary(
        &mut self,
        request_key: &str,
        spec: GenerationSpec,
        now_ms: u64,
    ) -> Result<Artifact, ApiError> {
        if let Some(existing) = self.find_active_primary(request_key) {
            return Err(ApiError::DuplicatePrimary {
                request_key: request_key.to_string(),
                existing: existing.id,
            });
        }
        let artifact = Artifact::new_primary(request_key, spec, now_ms);
        debug!(artifact_id = %artifact.id, request_key, "Primary artifact created");
        Ok(self.insert(artifact))
    }

    fn check_parent(&self, parent_id: &ArtifactId) -> Result<(), ApiError> {
        match self.artifacts.get(parent_id) {
            Some(parent) if parent.kind == ArtifactKind::Primary => Ok(()),
            Some(_) => Err(ApiError::InvalidRequest(format!(
                "derivatives must reference a primary artifact, {} is a derivative",
                parent_id
            ))),
            None => Err(ApiError::ArtifactNotFound(*parent_id)),
        }
    }

    /// Register a `pending` derivative placeholder of `parent_id`.
    pub fn reserve_derivative(
        &mut self,
        parent_id: ArtifactId,
        request_key: &str,
        spec: GenerationSpec,
        now_ms: u64,
    ) -> Result<Artifact, ApiError> {
        self.check_parent(&parent_id)?;
        let artifact = Artifact::new_derivative(parent_id, request_key, spec, now_ms);
        debug!(
            artifact_id = %artifact.id,
            parent_id = %parent_id,
            request_key,
            "Derivative artifact reserved"
        );
        Ok(self.insert(artifact))
    }

    /// Create a derivative and move it straight to `generating`.
    pub fn begin_derivative(
        &mut self,
        parent_id: ArtifactId,
        request_key: &str,
        spec: GenerationSpec,
        now_ms: u64,
    ) -> Result<Artifact, ApiError> {
        let reserved = self.reserve_derivative(parent_id, request_key, spec, now_ms)?;
        self.start_pending(&reserved.id, now_ms)
    }

    /// `pending -> generating`.
    pub fn start_pending(&mut self, id: &ArtifactId, now_ms: u64) -> Result<Artifact, ApiError> {
        let artifact = self.get_mut(id)?;
        artifact.start(now_ms)?;
        Ok(artifact.clone())
    }

    /// Count one client invocation. False when the episode is no longer current.
    pub fn record_attempt(&mut self, id: &ArtifactId, token: u64, now_ms: u64) -> bool {
        match self.artifacts.get_mut(id) {
            Some(artifact) => artifact.record_attempt(token, now_ms),
            None => false,
        }
    }

    /// Whether `id` is still in the `generating` episode identified by `token`.
    pub fn is_in_flight(&self, id: &ArtifactId, token: u64) -> bool {
        self.artifacts
            .get(id)
            .map(|a| a.is_generating(token))
            .unwrap_or(false)
    }

    pub fn complete(
        &mut self,
        id: &ArtifactId,
        token: u64,
        payload: ImagePayload,
        now_ms: u64,
    ) -> WriteOutcome {
        let outcome = match self.artifacts.get_mut(id) {
            Some(artifact) => artifact.complete(token, payload, now_ms),
            None => WriteOutcome::Discarded(DiscardReason::Missing),
        };
        self.log_discard(id, "completion", outcome);
        outcome
    }

    pub fn fail(
        &mut self,
        id: &ArtifactId,
        token: u64,
        detail: impl Into<String>,
        now_ms: u64,
    ) -> WriteOutcome {
        let outcome = match self.artifacts.get_mut(id) {
            Some(artifact) => artifact.fail(token, detail, now_ms),
            None => WriteOutcome::Discarded(DiscardReason::Missing),
        };
        self.log_discard(id, "failure", outcome);
        outcome
    }

    fn log_discard(&self, id: &ArtifactId, what: &str, outcome: WriteOutcome) {
        if let WriteOutcome::Discarded(reason) = outcome {
            debug!(artifact_id = %id, reason = ?reason, "Discarded late {}", what);
        }
    }

    /// Fail an in-flight artifact regardless of attempt token.
    pub fn force_fail(
        &mut self,
        id: &ArtifactId,
        detail: &str,
        origin: FailureOrigin,
        now_ms: u64,
    ) -> Result<Artifact, ApiError> {
        let artifact = self.get_mut(id)?;
        artifact.force_fail(detail, origin, now_ms)?;
        Ok(artifact.clone())
    }

    pub fn set_approval(
        &mut self,
        id: &ArtifactId,
        decision: Approval,
        now_ms: u64,
    ) -> Result<Artifact, ApiError> {
        let artifact = self.get_mut(id)?;
        artifact.set_approval(decision, now_ms)?;
        Ok(artifact.clone())
    }

    /// Explicit user retry. A failed primary may only come back if no other primary for
    /// the same request key became active in the meantime.
    pub fn retry(&mut self, id: &ArtifactId, now_ms: u64) -> Result<Artifact, ApiError> {
        let (kind, request_key, parent_id) = {
            let artifact = self.artifacts.get(id).ok_or(ApiError::ArtifactNotFound(*id))?;
            (artifact.kind, artifact.request_key.clone(), artifact.parent_id)
        };
        if kind == ArtifactKind::Primary {
            if let Some(other) = self.find_active_primary(&request_key) {
                if other.id != *id {
                    return Err(ApiError::DuplicatePrimary {
                        request_key,
                        existing: other.id,
                    });
                }
            }
        }
        if let Some(parent_id) = parent_id {
            self.check_parent(&parent_id)?;
        }
        let artifact = self.get_mut(id)?;
        artifact.retry(now_ms)?;
        Ok(artifact.clone())
    }

    /// Remove `id` and every artifact whose parent is `id`.
    pub fn delete(&mut self, id: &ArtifactId) -> Result<Vec<Artifact>, ApiError> {
        let root = self
            .artifacts
            .remove(id)
            .ok_or(ApiError::ArtifactNotFound(*id))?;
        let children: Vec<ArtifactId> = self
            .artifacts
            .values()
            .filter(|a| a.parent_id == Some(*id))
            .map(|a| a.id)
            .collect();
        let mut removed = vec![root];
        for child in children {
            if let Some(artifact) = self.artifacts.remove(&child) {
                removed.push(artifact);
            }
        }
        debug!(artifact_id = %id, removed = removed.len(), "Deleted artifact");
        Ok(removed)
    }

    /// Force-fail every `generating` artifact whose episode is older than `threshold_ms`.
    pub fn sweep_stuck(&mut self, now_ms: u64, threshold_ms: u64, detail: &str) -> Vec<Artifact> {
        let mut swept = Vec::new();
        for artifact in self.artifacts.values_mut() {
            if artifact.status != ArtifactStatus::Generating {
                continue;
            }
            let since = artifact.generating_since_ms.unwrap_or(artifact.created_at_ms);
            if now_ms.saturating_sub(since) <= threshold_ms {
                continue;
            }
            if artifact.force_fail(detail, FailureOrigin::Stuck, now_ms).is_ok() {
                swept.push(artifact.clone());
            }
        }
        swept
    }

    /// Load persisted records. Records saved mid-flight belong to a session that is gone,
    /// so they come back as interrupted failures. Returns the records that were rewritten.
    pub fn hydrate(&mut self, records: Vec<Artifact>, now_ms: u64) -> Vec<Artifact> {
        let mut rewritten = Vec::new();
        for mut artifact in records {
            if matches!(
                artifact.status,
                ArtifactStatus::Pending | ArtifactStatus::Generating
            ) {
                // force_fail only rejects terminal statuses, which are excluded above.
                let _ = artifact.force_fail(INTERRUPTED_DETAIL, FailureOrigin::Interrupted, now_ms);
                rewritten.push(artifact.clone());
            }
            if let Err(problem) = artifact.check() {
                warn!(artifact_id = %artifact.id, problem = %problem, "Skipping inconsistent record");
                continue;
            }
            self.insert(artifact);
        }
        rewritten
    }

    /// Collection-wide invariants: per-artifact consistency and one active primary per key.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut active_keys = HashSet::new();
        for artifact in self.artifacts.values() {
            artifact.check()?;
            if artifact.kind == ArtifactKind::Primary
                && artifact.is_active()
                && !active_keys.insert(artifact.request_key.as_str())
            {
                return Err(format!(
                    "more than one active primary for request '{}'",
                    artifact.request_key
                ));
            }
            if let Some(parent) = artifact.parent_id {
                if !self.known.contains(&parent) {
                    return Err(format!(
                        "artifact {} references unknown parent {}",
                        artifact.id, parent
                    ));
                }
            }
        }
        Ok(())
    }
}
