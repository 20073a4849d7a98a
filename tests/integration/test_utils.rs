//! Shared test utilities for integration tests
//!
//! Scripted backends and session builders. Sessions built here use retry policies without
//! jitter so paused-clock tests can reason about exact delays.

use async_trait::async_trait;
use easel::artifact::{Artifact, ArtifactStatus};
use easel::backend::{GeneratedImage, GenerationBackend, ImagePayload};
use easel::backoff::{RetryConfig, RetryPolicy};
use easel::classifier::Classifier;
use easel::client::{ClientConfig, GenerationClient};
use easel::error::GenerationError;
use easel::persistence::ArtifactStore;
use easel::queue::QueueConfig;
use easel::request::{GenerationSpec, UnitOfWork};
use easel::session::{CreativeSession, SessionConfig};
use easel::types::SessionClock;
use easel::watchdog::WatchdogConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What a scripted backend does for one call.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(GenerationError),
    /// Succeed after sleeping this long.
    Slow(Duration),
    /// Never settle.
    Hang,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub at: Instant,
    pub reference_count: usize,
}

/// Backend whose behavior is scripted per prompt. Prompts without a script (or whose
/// script has run out) succeed.
pub struct ScriptedBackend {
    name: String,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
    in_flight: Mutex<usize>,
    peak_in_flight: Mutex<usize>,
    max_refs: Option<usize>,
}

impl ScriptedBackend {
    pub fn new(name: &str) -> Arc<Self> {
        Self::build(name, None)
    }

    pub fn with_reference_limit(name: &str, limit: usize) -> Arc<Self> {
        Self::build(name, Some(limit))
    }

    fn build(name: &str, max_refs: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(0),
            peak_in_flight: Mutex::new(0),
            max_refs,
        })
    }

    /// Queue steps for `prompt`, consumed one per call.
    pub fn script(&self, prompt: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .entry(prompt.to_string())
            .or_default()
            .extend(steps);
    }

    /// Every call for `prompt` fails with `error`.
    pub fn always_fail(&self, prompt: &str, error: GenerationError) {
        self.script(prompt, std::iter::repeat(Step::Fail(error)).take(64));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.prompt.clone()).collect()
    }

    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.prompt == prompt).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        *self.peak_in_flight.lock()
    }

    fn image(&self, prompt: &str) -> GeneratedImage {
        GeneratedImage {
            payload: ImagePayload::Url(format!(
                "https://{}.example/{}.png",
                self.name,
                prompt.replace(' ', "-")
            )),
            backend: self.name.clone(),
        }
    }
}

struct InFlight<'a>(&'a ScriptedBackend);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0.in_flight.lock() -= 1;
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, spec: &GenerationSpec) -> Result<GeneratedImage, GenerationError> {
        self.calls.lock().push(Call {
            prompt: spec.prompt.clone(),
            at: Instant::now(),
            reference_count: spec.reference_assets.len(),
        });
        {
            let mut in_flight = self.in_flight.lock();
            *in_flight += 1;
            let mut peak = self.peak_in_flight.lock();
            *peak = (*peak).max(*in_flight);
        }
        let _guard = InFlight(self);

        let step = self
            .scripts
            .lock()
            .get_mut(&spec.prompt)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed);
        match step {
            Step::Succeed => Ok(self.image(&spec.prompt)),
            Step::Fail(error) => Err(error),
            Step::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.image(&spec.prompt))
            }
            Step::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reshape(&self, spec: &GenerationSpec) -> GenerationSpec {
        let mut spec = spec.clone();
        if let Some(limit) = self.max_refs {
            spec.reference_assets.truncate(limit);
        }
        spec
    }
}

pub fn status(code: u16, message: &str) -> GenerationError {
    GenerationError::Status {
        code,
        message: message.to_string(),
    }
}

pub fn unauthorized() -> GenerationError {
    status(401, "API key not valid")
}

pub fn quota() -> GenerationError {
    status(429, "RESOURCE_EXHAUSTED: quota exceeded for images")
}

pub fn overloaded() -> GenerationError {
    status(503, "The model is overloaded")
}

/// Small, jitter-free retry budgets.
pub fn fast_retry() -> RetryConfig {
    let policy = RetryPolicy {
        max_retries: 2,
        base_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2.0,
        jitter_ms: 0,
    };
    RetryConfig {
        primary: policy,
        derivative: policy,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        retry: fast_retry(),
        queue: QueueConfig {
            pacing_ms: 1000,
            variation_concurrency: 3,
        },
        watchdog: WatchdogConfig::default(),
    }
}

pub struct Harness {
    pub session: CreativeSession,
    pub primary: Arc<ScriptedBackend>,
    pub backup: Option<Arc<ScriptedBackend>>,
}

pub struct HarnessBuilder {
    config: SessionConfig,
    client: ClientConfig,
    backup: bool,
    backup_ref_limit: Option<usize>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: session_config(),
            client: ClientConfig::default(),
            backup: false,
            backup_ref_limit: None,
            store: None,
        }
    }

    pub fn with_backup(mut self) -> Self {
        self.backup = true;
        self
    }

    pub fn with_backup_reference_limit(mut self, limit: usize) -> Self {
        self.backup = true;
        self.backup_ref_limit = Some(limit);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn client(mut self, f: impl FnOnce(&mut ClientConfig)) -> Self {
        f(&mut self.client);
        self
    }

    pub fn build(self) -> Harness {
        let primary = ScriptedBackend::new("primary");
        let backup = if self.backup {
            Some(match self.backup_ref_limit {
                Some(limit) => ScriptedBackend::with_reference_limit("backup", limit),
                None => ScriptedBackend::new("backup"),
            })
        } else {
            None
        };
        let client = GenerationClient::new(
            primary.clone(),
            backup
                .clone()
                .map(|b| b as Arc<dyn GenerationBackend>),
            Classifier::default(),
            self.client,
        );
        let mut builder = CreativeSession::builder(client)
            .with_config(self.config)
            .with_clock(SessionClock::starting_at(1_000_000));
        if let Some(store) = self.store {
            builder = builder.with_store(store);
        }
        Harness {
            session: builder.build(),
            primary,
            backup,
        }
    }
}

pub fn unit(key: &str, prompt: &str) -> UnitOfWork {
    UnitOfWork::primary(key, GenerationSpec::new(prompt))
}

pub fn by_key(artifacts: &[Artifact], key: &str) -> Artifact {
    artifacts
        .iter()
        .find(|a| a.request_key == key)
        .cloned()
        .unwrap_or_else(|| panic!("no artifact for key {}", key))
}

pub fn statuses(artifacts: &[Artifact]) -> Vec<(String, ArtifactStatus)> {
    artifacts
        .iter()
        .map(|a| (a.request_key.clone(), a.status))
        .collect()
}

/// Serializes tests that touch process-wide environment variables.
pub static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Sets environment variables for the guard's lifetime.
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, Option<&str>)]) -> Self {
        let saved = vars
            .iter()
            .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
            .collect();
        for (name, value) in vars {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}
