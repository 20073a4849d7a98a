//! Error Classifier
//!
//! Maps a raw [`GenerationError`] onto a fixed taxonomy and looks up whether that category
//! is retried and whether the user can fix it. Backends that only hand back strings are
//! matched with case-insensitive substring heuristics; those heuristics live here and
//! nowhere else.
//!
//! The retry table is data, not code: [`ClassificationPolicy`] defaults to the table below
//! and individual categories can be overridden from configuration.
//!
//! | category           | retryable | recoverable |
//! |--------------------|-----------|-------------|
//! | invalid-credential | no        | yes         |
//! | quota-exceeded     | yes       | yes         |
//! | rate-limited       | yes       | yes         |
//! | timeout            | yes       | yes         |
//! | service-overloaded | yes       | yes         |
//! | malformed-output   | yes       | yes         |
//! | permission-denied  | no        | yes         |
//! | model-unavailable  | no        | no          |
//! | unknown            | yes       | yes         |

use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    InvalidCredential,
    QuotaExceeded,
    RateLimited,
    Timeout,
    ServiceOverloaded,
    MalformedOutput,
    PermissionDenied,
    ModelUnavailable,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::InvalidCredential,
        ErrorCategory::QuotaExceeded,
        ErrorCategory::RateLimited,
        ErrorCategory::Timeout,
        ErrorCategory::ServiceOverloaded,
        ErrorCategory::MalformedOutput,
        ErrorCategory::PermissionDenied,
        ErrorCategory::ModelUnavailable,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::InvalidCredential => "invalid-credential",
            ErrorCategory::QuotaExceeded => "quota-exceeded",
            ErrorCategory::RateLimited => "rate-limited",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ServiceOverloaded => "service-overloaded",
            ErrorCategory::MalformedOutput => "malformed-output",
            ErrorCategory::PermissionDenied => "permission-denied",
            ErrorCategory::ModelUnavailable => "model-unavailable",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Look up a category by its kebab-case name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str().eq_ignore_ascii_case(name))
    }

    /// Categories that justify a hop to the backup backend.
    pub fn is_capacity(self) -> bool {
        matches!(
            self,
            ErrorCategory::QuotaExceeded | ErrorCategory::ServiceOverloaded
        )
    }

    fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::InvalidCredential => {
                "The image service rejected the API key. Check the configured credentials."
            }
            ErrorCategory::QuotaExceeded => {
                "The image service quota is exhausted. Try again later or raise the quota."
            }
            ErrorCategory::RateLimited => "Too many requests were sent. Retrying more slowly.",
            ErrorCategory::Timeout => "The image service took too long to respond.",
            ErrorCategory::ServiceOverloaded => {
                "The image service is overloaded right now. Try again shortly."
            }
            ErrorCategory::MalformedOutput => "The image service did not return a usable image.",
            ErrorCategory::PermissionDenied => {
                "The configured account is not allowed to use this model. Check its permissions."
            }
            ErrorCategory::ModelUnavailable => {
                "The configured image model does not exist or is no longer available."
            }
            ErrorCategory::Unknown => "Image generation failed for an unexpected reason.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry/recovery flags for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub retryable: bool,
    pub recoverable: bool,
}

impl Disposition {
    const fn new(retryable: bool, recoverable: bool) -> Self {
        Self {
            retryable,
            recoverable,
        }
    }
}

/// Category -> disposition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationPolicy {
    table: HashMap<ErrorCategory, Disposition>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        let table = ErrorCategory::ALL
            .iter()
            .map(|category| (*category, Self::default_disposition(*category)))
            .collect();
        Self { table }
    }
}

impl ClassificationPolicy {
    /// Transient capacity problems are retried; credential and permission problems are not,
    /// but the user can fix them; a missing model needs an operator.
    pub const fn default_disposition(category: ErrorCategory) -> Disposition {
        match category {
            ErrorCategory::InvalidCredential => Disposition::new(false, true),
            ErrorCategory::QuotaExceeded => Disposition::new(true, true),
            ErrorCategory::RateLimited => Disposition::new(true, true),
            ErrorCategory::Timeout => Disposition::new(true, true),
            ErrorCategory::ServiceOverloaded => Disposition::new(true, true),
            ErrorCategory::MalformedOutput => Disposition::new(true, true),
            ErrorCategory::PermissionDenied => Disposition::new(false, true),
            ErrorCategory::ModelUnavailable => Disposition::new(false, false),
            ErrorCategory::Unknown => Disposition::new(true, true),
        }
    }

    pub fn with_overrides(overrides: &HashMap<ErrorCategory, Disposition>) -> Self {
        let mut policy = Self::default();
        for (category, disposition) in overrides {
            policy.table.insert(*category, *disposition);
        }
        policy
    }

    pub fn disposition(&self, category: ErrorCategory) -> Disposition {
        self.table
            .get(&category)
            .copied()
            .unwrap_or_else(|| Self::default_disposition(category))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
    pub recoverable: bool,
    pub user_message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    policy: ClassificationPolicy,
}

impl Classifier {
    pub fn new(policy: ClassificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    pub fn classify(&self, error: &GenerationError) -> Classification {
        let category = categorize(error);
        let disposition = self.policy.disposition(category);
        Classification {
            category,
            retryable: disposition.retryable,
            recoverable: disposition.recoverable,
            user_message: category.user_message().to_string(),
        }
    }
}

/// Pure categorization: structured variants first, then a recognized status code, then
/// message text.
pub fn categorize(error: &GenerationError) -> ErrorCategory {
    match error {
        GenerationError::Timeout { .. } => return ErrorCategory::Timeout,
        GenerationError::MalformedOutput(_) => return ErrorCategory::MalformedOutput,
        _ => {}
    }

    let message = error.message().to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));
    let quota_text = || has(&["quota", "resource exhausted", "resource_exhausted"]);

    match error.status_code() {
        Some(401) => return ErrorCategory::InvalidCredential,
        Some(403) => return ErrorCategory::PermissionDenied,
        Some(404) => return ErrorCategory::ModelUnavailable,
        Some(429) if quota_text() => return ErrorCategory::QuotaExceeded,
        Some(429) => return ErrorCategory::RateLimited,
        Some(503) => return ErrorCategory::ServiceOverloaded,
        _ => {}
    }

    // Status errors already carry their code; digits in their body are noise.
    let code = |code: &str| error.status_code().is_none() && contains_code(&message, code);

    if code("401") || has(&["api key", "api_key", "unauthenticated", "invalid credential"]) {
        return ErrorCategory::InvalidCredential;
    }
    if quota_text() {
        return ErrorCategory::QuotaExceeded;
    }
    if code("429") || has(&["rate limit", "rate-limit", "too many requests"]) {
        return ErrorCategory::RateLimited;
    }
    if code("503") || has(&["overloaded", "unavailable"]) {
        return ErrorCategory::ServiceOverloaded;
    }
    if has(&["timeout", "timed out", "deadline"]) {
        return ErrorCategory::Timeout;
    }
    if code("403") || has(&["permission", "forbidden"]) {
        return ErrorCategory::PermissionDenied;
    }
    if code("404") || has(&["not found"]) {
        return ErrorCategory::ModelUnavailable;
    }
    if has(&["no image", "malformed", "invalid response", "unexpected response"]) {
        return ErrorCategory::MalformedOutput;
    }
    ErrorCategory::Unknown
}

/// True when `code` appears in `message` as a standalone number.
fn contains_code(message: &str, code: &str) -> bool {
    message.match_indices(code).any(|(at, _)| {
        let before = message[..at].chars().next_back();
        let after = message[at + code.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}
