//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain errors to a one-line message for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::InvalidTransition { id, from, action } => {
            format!("Artifact {} is {}; cannot {}", id, from, action)
        }
        ApiError::DuplicatePrimary {
            request_key,
            existing,
        } => format!(
            "'{}' already has an active artifact ({}); delete or retry it instead",
            request_key, existing
        ),
        other => other.to_string(),
    }
}
