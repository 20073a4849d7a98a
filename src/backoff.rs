//! Backoff Policy and the generic retry loop.
//!
//! `delay(n) = min(max_delay, base_delay * multiplier^n) + jitter`, where `n` is the number
//! of retries already made and jitter is uniform in `[0, jitter_ms]`.

use crate::artifact::ArtifactKind;
use crate::classifier::{Classification, Classifier};
use crate::error::GenerationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry budget and delay curve for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (so at most `max_retries + 1` invocations).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound of the random addend.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryPolicy {
    /// Budget for slow primary generation calls.
    pub fn long_running() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 4000,
            ..Self::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_ms = 0;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be >= 1.0 (got {})",
                self.backoff_multiplier
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let factor = multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let raw = self.base_delay_ms as f64 * factor;
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `attempt`, including jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Largest delay this policy can ever produce.
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms + self.jitter_ms)
    }
}

/// Retry budgets per call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::long_running")]
    pub primary: RetryPolicy,
    #[serde(default)]
    pub derivative: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            primary: RetryPolicy::long_running(),
            derivative: RetryPolicy::default(),
        }
    }
}

impl RetryConfig {
    pub fn for_kind(&self, kind: ArtifactKind) -> &RetryPolicy {
        match kind {
            ArtifactKind::Primary => &self.primary,
            ArtifactKind::Derivative => &self.derivative,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.primary
            .validate()
            .map_err(|e| format!("retry.primary: {}", e))?;
        self.derivative
            .validate()
            .map_err(|e| format!("retry.derivative: {}", e))
    }
}

/// Terminal failure of a retried operation. Carries the last error seen.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error: GenerationError,
    pub classification: Classification,
    pub attempts: u32,
    /// The guard asked to stop before the budget was used up.
    pub abandoned: bool,
}

/// Run `op` until it succeeds, hits a non-retryable error, exhausts the policy, or
/// `keep_going` returns false. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut, G>(
    policy: &RetryPolicy,
    classifier: &Classifier,
    mut keep_going: G,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
    G: FnMut() -> bool,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let classification = classifier.classify(&error);
        let retries_used = attempt - 1;
        if !classification.retryable {
            debug!(
                attempt,
                category = %classification.category,
                error = %error,
                "Non-retryable generation error"
            );
            return Err(RetryFailure {
                error,
                classification,
                attempts: attempt,
                abandoned: false,
            });
        }
        if retries_used >= policy.max_retries {
            warn!(
                attempts = attempt,
                category = %classification.category,
                error = %error,
                "Retry budget exhausted"
            );
            return Err(RetryFailure {
                error,
                classification,
                attempts: attempt,
                abandoned: false,
            });
        }

        let delay = policy.delay(retries_used);
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            category = %classification.category,
            error = %error,
            "Retrying generation after backoff"
        );
        sleep(delay).await;

        if !keep_going() {
            debug!(attempt, "Retry abandoned by caller");
            return Err(RetryFailure {
                error,
                classification,
                attempts: attempt,
                abandoned: true,
            });
        }
    }
}
