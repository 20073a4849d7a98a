//! Error types for the Easel creative generation orchestrator.

use crate::artifact::ArtifactStatus;
use crate::types::ArtifactId;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact record not found: {0}")]
    RecordNotFound(ArtifactId),

    #[error("Failed to encode artifact record: {0}")]
    Encoding(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Raw failure reported by a generation backend (or by the client's own timeout race).
///
/// The classifier turns these into a taxonomy entry; nothing else inspects them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Backend responded with status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Backend returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("{0}")]
    Backend(String),
}

impl GenerationError {
    /// Message text used by substring heuristics.
    pub fn message(&self) -> &str {
        match self {
            GenerationError::Status { message, .. } => message,
            GenerationError::Transport(message) => message,
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::MalformedOutput(message) => message,
            GenerationError::Backend(message) => message,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            GenerationError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Orchestrator API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Invalid transition for artifact {id}: cannot {action} while {from}")]
    InvalidTransition {
        id: ArtifactId,
        from: ArtifactStatus,
        action: &'static str,
    },

    #[error("Request '{request_key}' already has an active primary artifact {existing}")]
    DuplicatePrimary {
        request_key: String,
        existing: ArtifactId,
    },

    #[error("Invalid work request: {0}")]
    InvalidRequest(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
