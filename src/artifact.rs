//! Artifact record and status/approval state machine.
//!
//! Status moves `pending -> generating -> completed | failed`; the only ways out of a
//! terminal status are an explicit user retry (back to `generating`) or deletion. Approval
//! is a separate axis that may only leave `waiting` while the artifact is `completed`.
//!
//! Every entry into `generating` starts a new attempt episode identified by
//! `attempt_token`. Results are applied only when they carry the current token and the
//! artifact is still `generating`; anything else is a late write and is discarded.

pub mod registry;

pub use registry::ArtifactRegistry;

use crate::backend::ImagePayload;
use crate::error::ApiError;
use crate::request::GenerationSpec;
use crate::types::ArtifactId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Primary,
    Derivative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ArtifactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Generating => "generating",
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    Waiting,
    Approved,
    Rejected,
}

impl Approval {
    pub fn as_str(self) -> &'static str {
        match self {
            Approval::Waiting => "waiting",
            Approval::Approved => "approved",
            Approval::Rejected => "rejected",
        }
    }
}

/// Why an artifact ended up `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    /// The backend (or the client's timeout race) reported a failure.
    Generation,
    /// The watchdog gave up waiting on it.
    Stuck,
    /// A previous session ended while it was in flight.
    Interrupted,
}

/// Result of applying a late-arriving generation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The artifact re-entered `generating` since this attempt started.
    StaleAttempt,
    /// The artifact already left `generating` (force-failed, retried, ...).
    NotGenerating(ArtifactStatus),
    /// The artifact was deleted while the call was in flight.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub parent_id: Option<ArtifactId>,
    pub request_key: String,
    pub kind: ArtifactKind,
    pub status: ArtifactStatus,
    pub approval: Approval,
    pub payload: Option<ImagePayload>,
    pub error_detail: Option<String>,
    pub failure_origin: Option<FailureOrigin>,
    /// Number of generation client invocations, across all attempt episodes.
    pub attempts_made: u32,
    pub spec: GenerationSpec,
    pub created_at_ms: u64,
    /// When the current `generating` episode began; `None` while pending.
    pub generating_since_ms: Option<u64>,
    pub updated_at_ms: u64,
    pub attempt_token: u64,
}

impl Artifact {
    fn base(
        kind: ArtifactKind,
        parent_id: Option<ArtifactId>,
        request_key: String,
        spec: GenerationSpec,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            parent_id,
            request_key,
            kind,
            status: ArtifactStatus::Pending,
            approval: Approval::Waiting,
            payload: None,
            error_detail: None,
            failure_origin: None,
            attempts_made: 0,
            spec,
            created_at_ms: now_ms,
            generating_since_ms: None,
            updated_at_ms: now_ms,
            attempt_token: 0,
        }
    }

    /// New primary, already `generating`.
    pub fn new_primary(request_key: impl Into<String>, spec: GenerationSpec, now_ms: u64) -> Self {
        let mut artifact = Self::base(
            ArtifactKind::Primary,
            None,
            request_key.into(),
            spec,
            now_ms,
        );
        artifact.enter_generating(now_ms);
        artifact
    }

    /// New derivative placeholder, `pending` until its task starts.
    pub fn new_derivative(
        parent_id: ArtifactId,
        request_key: impl Into<String>,
        spec: GenerationSpec,
        now_ms: u64,
    ) -> Self {
        Self::base(
            ArtifactKind::Derivative,
            Some(parent_id),
            request_key.into(),
            spec,
            now_ms,
        )
    }

    /// Anything but `failed` counts against the one-active-primary-per-key rule.
    pub fn is_active(&self) -> bool {
        self.status != ArtifactStatus::Failed
    }

    pub fn is_generating(&self, token: u64) -> bool {
        self.status == ArtifactStatus::Generating && self.attempt_token == token
    }

    fn enter_generating(&mut self, now_ms: u64) -> u64 {
        self.status = ArtifactStatus::Generating;
        self.approval = Approval::Waiting;
        self.payload = None;
        self.error_detail = None;
        self.failure_origin = None;
        self.attempt_token += 1;
        self.generating_since_ms = Some(now_ms);
        self.updated_at_ms = now_ms;
        self.attempt_token
    }

    /// `pending -> generating`. Returns the attempt token for this episode.
    pub fn start(&mut self, now_ms: u64) -> Result<u64, ApiError> {
        if self.status != ArtifactStatus::Pending {
            return Err(self.invalid("start", self.status));
        }
        Ok(self.enter_generating(now_ms))
    }

    /// Explicit user retry: `completed | failed -> generating`.
    pub fn retry(&mut self, now_ms: u64) -> Result<u64, ApiError> {
        match self.status {
            ArtifactStatus::Completed | ArtifactStatus::Failed => Ok(self.enter_generating(now_ms)),
            other => Err(self.invalid("retry", other)),
        }
    }

    /// Count one client invocation for the given episode. Returns false for stale episodes.
    pub fn record_attempt(&mut self, token: u64, now_ms: u64) -> bool {
        if !self.is_generating(token) {
            return false;
        }
        self.attempts_made += 1;
        self.updated_at_ms = now_ms;
        true
    }

    fn check_write(&self, token: u64) -> Option<DiscardReason> {
        if self.status != ArtifactStatus::Generating {
            Some(DiscardReason::NotGenerating(self.status))
        } else if self.attempt_token != token {
            Some(DiscardReason::StaleAttempt)
        } else {
            None
        }
    }

    pub fn complete(&mut self, token: u64, payload: ImagePayload, now_ms: u64) -> WriteOutcome {
        if let Some(reason) = self.check_write(token) {
            return WriteOutcome::Discarded(reason);
        }
        self.status = ArtifactStatus::Completed;
        self.payload = Some(payload);
        self.updated_at_ms = now_ms;
        WriteOutcome::Applied
    }

    pub fn fail(&mut self, token: u64, detail: impl Into<String>, now_ms: u64) -> WriteOutcome {
        if let Some(reason) = self.check_write(token) {
            return WriteOutcome::Discarded(reason);
        }
        self.mark_failed(detail.into(), FailureOrigin::Generation, now_ms);
        WriteOutcome::Applied
    }

    /// Fail regardless of attempt token; used by the watchdog and on hydration.
    pub fn force_fail(
        &mut self,
        detail: impl Into<String>,
        origin: FailureOrigin,
        now_ms: u64,
    ) -> Result<(), ApiError> {
        match self.status {
            ArtifactStatus::Pending | ArtifactStatus::Generating => {
                self.mark_failed(detail.into(), origin, now_ms);
                Ok(())
            }
            other => Err(self.invalid("force-fail", other)),
        }
    }

    fn mark_failed(&mut self, detail: String, origin: FailureOrigin, now_ms: u64) {
        self.status = ArtifactStatus::Failed;
        self.approval = Approval::Waiting;
        self.payload = None;
        self.error_detail = Some(detail);
        self.failure_origin = Some(origin);
        self.updated_at_ms = now_ms;
    }

    /// Set the approval decision. Only legal while `completed`; re-setting is idempotent.
    pub fn set_approval(&mut self, decision: Approval, now_ms: u64) -> Result<(), ApiError> {
        if decision == Approval::Waiting {
            return Err(ApiError::InvalidRequest(
                "approval can only be set to approved or rejected".to_string(),
            ));
        }
        if self.status != ArtifactStatus::Completed {
            return Err(self.invalid("set approval", self.status));
        }
        self.approval = decision;
        self.updated_at_ms = now_ms;
        Ok(())
    }

    /// Consistency of the per-artifact invariants.
    pub fn check(&self) -> Result<(), String> {
        if self.approval != Approval::Waiting && self.status != ArtifactStatus::Completed {
            return Err(format!(
                "artifact {} is {} but approval is {}",
                self.id,
                self.status,
                self.approval.as_str()
            ));
        }
        if self.payload.is_some() != (self.status == ArtifactStatus::Completed) {
            return Err(format!("artifact {} payload does not match {}", self.id, self.status));
        }
        if self.error_detail.is_some() != (self.status == ArtifactStatus::Failed) {
            return Err(format!(
                "artifact {} error detail does not match {}",
                self.id, self.status
            ));
        }
        if (self.kind == ArtifactKind::Derivative) != self.parent_id.is_some() {
            return Err(format!("artifact {} kind does not match parent link", self.id));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str, from: ArtifactStatus) -> ApiError {
        ApiError::InvalidTransition {
            id: self.id,
            from,
            action,
        }
    }
}
