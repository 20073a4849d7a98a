//! Creative Session
//!
//! The orchestrator surface a user interface drives: enqueue batches, ask them to stop,
//! approve, delete and retry artifacts, and watch a live view of the collection. A session
//! owns the artifact registry, the stop signals of its running batches, and its watchdog.

pub mod state;

pub use state::{BatchFlag, BatchGuard, SessionState, SessionView};

use crate::artifact::{Approval, Artifact, ArtifactKind, FailureOrigin, WriteOutcome};
use crate::backoff::{retry_with_backoff, RetryConfig};
use crate::client::GenerationClient;
use crate::error::ApiError;
use crate::persistence::{ArtifactStore, BestEffortSink};
use crate::queue::{QueueConfig, RunSummary, Sequencer, StopSignal, Task, TaskOutcome};
use crate::request::{GenerationSpec, UnitOfWork, WorkTarget};
use crate::types::{ArtifactId, SessionClock};
use crate::watchdog::{Watchdog, WatchdogConfig, WatchdogHandle};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Detail for derivatives whose batch was stopped before they started.
pub const STOPPED_DETAIL: &str = "Stopped before generation started";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub watchdog: WatchdogConfig,
}

/// Result of one `enqueue` or `generate_variations` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub summary: RunSummary,
    /// Artifacts created by this batch, in creation order.
    pub artifacts: Vec<ArtifactId>,
    /// Request keys that already had an active primary.
    pub duplicates: Vec<String>,
}

#[derive(Default)]
struct BatchLedger {
    artifacts: Vec<ArtifactId>,
    duplicates: Vec<String>,
}

struct SessionInner {
    client: GenerationClient,
    state: Arc<SessionState>,
    config: SessionConfig,
    sequencer: Sequencer,
    stops: Mutex<Vec<StopSignal>>,
    watchdog: Mutex<Option<WatchdogHandle>>,
}

/// Handle to a running session. Clones share the same session.
#[derive(Clone)]
pub struct CreativeSession {
    inner: Arc<SessionInner>,
}

pub struct SessionBuilder {
    client: GenerationClient,
    store: Option<Arc<dyn ArtifactStore>>,
    config: SessionConfig,
    clock: Option<SessionClock>,
}

impl SessionBuilder {
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: SessionClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> CreativeSession {
        let sink = BestEffortSink::new(self.store);
        let clock = self.clock.unwrap_or_default();
        let sequencer = Sequencer::from_config(&self.config.queue);
        CreativeSession {
            inner: Arc::new(SessionInner {
                client: self.client,
                state: Arc::new(SessionState::new(sink, clock)),
                config: self.config,
                sequencer,
                stops: Mutex::new(Vec::new()),
                watchdog: Mutex::new(None),
            }),
        }
    }
}

impl CreativeSession {
    pub fn builder(client: GenerationClient) -> SessionBuilder {
        SessionBuilder {
            client,
            store: None,
            config: SessionConfig::default(),
            clock: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.inner.state
    }

    fn ensure_live(&self) -> Result<(), ApiError> {
        if self.inner.state.is_live() {
            Ok(())
        } else {
            Err(ApiError::SessionClosed)
        }
    }

    fn register_stop(&self) -> StopSignal {
        let stop = StopSignal::new();
        self.inner.stops.lock().push(stop.clone());
        stop
    }

    fn release_stop(&self, stop: &StopSignal) {
        self.inner
            .stops
            .lock()
            .retain(|s| !s.same_as(stop));
    }

    /// Run `units` through one sequencer pass. Artifacts are created as each unit is dequeued.
    pub async fn enqueue(&self, units: Vec<UnitOfWork>) -> Result<BatchReport, ApiError> {
        self.ensure_live()?;
        for unit in &units {
            unit.validate()?;
        }

        let stop = self.register_stop();
        let ledger = Arc::new(Mutex::new(BatchLedger::default()));
        let tasks: Vec<Task> = units
            .into_iter()
            .map(|unit| {
                Arc::clone(&self.inner)
                    .unit_task(unit, stop.clone(), Arc::clone(&ledger))
                    .boxed()
            })
            .collect();

        info!(units = tasks.len(), "Batch enqueued");
        let summary = {
            let _batch = self.inner.state.enter_batch();
            self.inner.sequencer.run(tasks, &stop).await
        };
        self.release_stop(&stop);

        let ledger = std::mem::take(&mut *ledger.lock());
        Ok(BatchReport {
            summary,
            artifacts: ledger.artifacts,
            duplicates: ledger.duplicates,
        })
    }

    /// Generate derivatives of `parent_id` in parallel, at most `variation_concurrency` at a
    /// time. All derivatives are reserved as `pending` before any call is made.
    pub async fn generate_variations(
        &self,
        parent_id: ArtifactId,
        variations: Vec<GenerationSpec>,
    ) -> Result<BatchReport, ApiError> {
        self.ensure_live()?;
        if variations.iter().any(|spec| spec.prompt.trim().is_empty()) {
            return Err(ApiError::InvalidRequest(
                "variation prompt cannot be empty".to_string(),
            ));
        }

        let state = &self.inner.state;
        let now = state.now_ms();
        let reserved: Vec<Artifact> = state.mutate(|registry| {
            let parent_key = registry
                .get(&parent_id)
                .map(|parent| parent.request_key.clone())
                .ok_or(ApiError::ArtifactNotFound(parent_id))?;
            variations
                .into_iter()
                .enumerate()
                .map(|(n, spec)| {
                    let key = format!("{}/v{}", parent_key, n + 1);
                    registry.reserve_derivative(parent_id, &key, spec, now)
                })
                .collect::<Result<Vec<_>, ApiError>>()
        })?;
        state.sink().persist_all(&reserved);

        let stop = self.register_stop();
        let ids: Vec<ArtifactId> = reserved.iter().map(|a| a.id).collect();
        info!(parent_id = %parent_id, variations = ids.len(), "Variation batch started");

        let limit = self.inner.config.queue.variation_concurrency.max(1);
        let outcomes: Vec<(usize, TaskOutcome)> = {
            let _batch = state.enter_batch();
            futures::stream::iter(ids.iter().copied().enumerate())
                .map(|(index, id)| {
                    let inner = Arc::clone(&self.inner);
                    let stop = stop.clone();
                    async move { (index, inner.variation_task(id, stop).await) }
                })
                .buffer_unordered(limit)
                .collect()
                .await
        };
        self.release_stop(&stop);

        let mut summary = RunSummary {
            stopped: stop.is_triggered(),
            ..RunSummary::default()
        };
        for (index, outcome) in outcomes {
            match outcome {
                TaskOutcome::Completed => summary.completed += 1,
                TaskOutcome::Failed => summary.failed += 1,
                TaskOutcome::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                TaskOutcome::Discarded => summary.discarded += 1,
            }
            summary.started += 1;
            summary.order.push(index);
        }

        Ok(BatchReport {
            summary,
            artifacts: ids,
            duplicates: Vec::new(),
        })
    }

    /// Ask every running batch to stop before its next task.
    pub fn request_stop(&self) {
        let stops = self.inner.stops.lock();
        for stop in stops.iter() {
            stop.trigger();
        }
        info!(batches = stops.len(), "Stop requested");
    }

    pub fn set_approval(&self, id: &ArtifactId, decision: Approval) -> Result<Artifact, ApiError> {
        let state = &self.inner.state;
        let now = state.now_ms();
        let artifact = state.mutate(|registry| registry.set_approval(id, decision, now))?;
        state.sink().persist(&artifact);
        debug!(artifact_id = %id, approval = decision.as_str(), "Approval updated");
        Ok(artifact)
    }

    /// Delete `id` and its derivatives. Returns the removed ids.
    pub fn delete(&self, id: &ArtifactId) -> Result<Vec<ArtifactId>, ApiError> {
        let state = &self.inner.state;
        let removed = state.mutate(|registry| registry.delete(id))?;
        let ids: Vec<ArtifactId> = removed.iter().map(|a| a.id).collect();
        for removed_id in &ids {
            state.sink().remove(removed_id);
        }
        info!(artifact_id = %id, removed = ids.len(), "Artifact deleted");
        Ok(ids)
    }

    /// Explicit user retry of a completed or failed artifact.
    pub async fn retry(&self, id: &ArtifactId) -> Result<TaskOutcome, ApiError> {
        self.ensure_live()?;
        let state = &self.inner.state;
        let now = state.now_ms();
        let artifact = state.mutate(|registry| registry.retry(id, now))?;
        state.sink().persist(&artifact);
        info!(artifact_id = %id, "Retrying artifact");

        let stop = self.register_stop();
        let outcome = {
            let _batch = state.enter_batch();
            self.inner.drive(&artifact, &stop).await
        };
        self.release_stop(&stop);
        Ok(outcome)
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.inner.state.read(|registry| registry.snapshot())
    }

    pub fn artifact(&self, id: &ArtifactId) -> Option<Artifact> {
        self.inner.state.read(|registry| registry.get(id).cloned())
    }

    pub fn batch_in_progress(&self) -> bool {
        self.inner.state.batch().is_set()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.state.subscribe()
    }

    /// Load persisted artifacts. Records left mid-flight by an earlier session come back as
    /// failed. Returns the number of records loaded.
    pub fn hydrate(&self) -> Result<usize, ApiError> {
        self.ensure_live()?;
        let state = &self.inner.state;
        let records = state.sink().load();
        let now = state.now_ms();
        let loaded = records.len();
        let rewritten = state.mutate(|registry| registry.hydrate(records, now));
        state.sink().persist_all(&rewritten);
        if !rewritten.is_empty() {
            info!(interrupted = rewritten.len(), "Marked interrupted artifacts as failed");
        }
        Ok(loaded)
    }

    /// Start the stuck-job watchdog. A second call is a no-op.
    pub fn start_watchdog(&self) -> Result<(), ApiError> {
        self.ensure_live()?;
        let mut slot = self.inner.watchdog.lock();
        if slot.is_none() {
            let watchdog = Watchdog::new(Arc::clone(&self.inner.state), self.inner.config.watchdog);
            *slot = Some(watchdog.start());
        }
        Ok(())
    }

    /// One watchdog pass at the session's current time.
    pub fn sweep_stuck(&self) -> Vec<Artifact> {
        let state = &self.inner.state;
        Watchdog::new(Arc::clone(state), self.inner.config.watchdog).sweep(state.now_ms())
    }

    /// Shut the session down. Running batches stop at their next boundary and any result
    /// arriving afterwards is discarded.
    pub async fn close(&self) {
        self.inner.state.shut_down();
        self.request_stop();
        let handle = self.inner.watchdog.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        info!("Session closed");
    }
}

impl SessionInner {
    async fn unit_task(
        self: Arc<Self>,
        unit: UnitOfWork,
        stop: StopSignal,
        ledger: Arc<Mutex<BatchLedger>>,
    ) -> TaskOutcome {
        if !self.state.is_live() {
            return TaskOutcome::Discarded;
        }
        let now = self.state.now_ms();
        let UnitOfWork {
            request_key,
            spec,
            target,
        } = unit;
        let created = self.state.mutate(|registry| match target {
            WorkTarget::Primary => registry.begin_primary(&request_key, spec, now),
            WorkTarget::Derivative { parent_id } => {
                registry.begin_derivative(parent_id, &request_key, spec, now)
            }
        });

        let artifact = match created {
            Ok(artifact) => artifact,
            Err(ApiError::DuplicatePrimary { existing, .. }) => {
                debug!(request_key = %request_key, existing = %existing, "Skipping duplicate primary");
                ledger.lock().duplicates.push(request_key);
                return TaskOutcome::Skipped;
            }
            Err(err) => {
                warn!(request_key = %request_key, error = %err, "Unit of work rejected");
                return TaskOutcome::Failed;
            }
        };
        self.state.sink().persist(&artifact);
        ledger.lock().artifacts.push(artifact.id);

        self.drive(&artifact, &stop).await
    }

    async fn variation_task(self: Arc<Self>, id: ArtifactId, stop: StopSignal) -> TaskOutcome {
        let now = self.state.now_ms();
        if stop.is_triggered() || !self.state.is_live() {
            let stopped = self.state.mutate(|registry| {
                registry.force_fail(&id, STOPPED_DETAIL, FailureOrigin::Interrupted, now)
            });
            if let Ok(artifact) = stopped {
                self.state.sink().persist(&artifact);
            }
            return TaskOutcome::Skipped;
        }

        let artifact = match self.state.mutate(|registry| registry.start_pending(&id, now)) {
            Ok(artifact) => artifact,
            Err(err) => {
                // Deleted while waiting for a slot.
                debug!(artifact_id = %id, error = %err, "Variation no longer startable");
                return TaskOutcome::Skipped;
            }
        };
        self.state.sink().persist(&artifact);
        self.drive(&artifact, &stop).await
    }

    /// Whether a result for this attempt episode should still be applied.
    fn is_current(&self, id: &ArtifactId, token: u64) -> bool {
        self.state.is_live() && self.state.read(|registry| registry.is_in_flight(id, token))
    }

    /// Run the retried client call for one `generating` episode and apply the result.
    async fn drive(&self, artifact: &Artifact, stop: &StopSignal) -> TaskOutcome {
        let id = artifact.id;
        let token = artifact.attempt_token;
        let kind: ArtifactKind = artifact.kind;
        let spec = &artifact.spec;
        let client = &self.client;
        let state = &self.state;
        let policy = self.config.retry.for_kind(kind);

        let result = retry_with_backoff(
            policy,
            client.classifier(),
            || self.is_current(&id, token) && !stop.is_triggered(),
            |attempt| {
                state.mutate(|registry| registry.record_attempt(&id, token, state.now_ms()));
                debug!(artifact_id = %id, attempt, "Calling generation client");
                client.generate(spec, kind)
            },
        )
        .await;

        if !state.is_live() {
            debug!(artifact_id = %id, "Session closed, discarding result");
            return TaskOutcome::Discarded;
        }

        let now = state.now_ms();
        match result {
            Ok(image) => {
                let backend = image.backend;
                match state.mutate(|registry| registry.complete(&id, token, image.payload, now)) {
                    WriteOutcome::Applied => {
                        info!(artifact_id = %id, backend = %backend, "Artifact completed");
                        self.persist_current(&id);
                        TaskOutcome::Completed
                    }
                    WriteOutcome::Discarded(_) => TaskOutcome::Discarded,
                }
            }
            Err(failure) => {
                let detail = if failure.abandoned {
                    format!(
                        "Stopped before retries finished. Last error: {}",
                        failure.error
                    )
                } else {
                    format!(
                        "{} Last error: {}",
                        failure.classification.user_message, failure.error
                    )
                };
                match state.mutate(|registry| registry.fail(&id, token, detail, now)) {
                    WriteOutcome::Applied => {
                        warn!(
                            artifact_id = %id,
                            category = %failure.classification.category,
                            attempts = failure.attempts,
                            error = %failure.error,
                            "Artifact failed"
                        );
                        self.persist_current(&id);
                        TaskOutcome::Failed
                    }
                    WriteOutcome::Discarded(_) => TaskOutcome::Discarded,
                }
            }
        }
    }

    fn persist_current(&self, id: &ArtifactId) {
        if let Some(artifact) = self.state.read(|registry| registry.get(id).cloned()) {
            self.state.sink().persist(&artifact);
        }
    }
}
