//! Job Queue / Sequencer
//!
//! Runs an ordered list of tasks strictly one at a time with a fixed pause between them.
//! A [`StopSignal`] is checked before each task starts; once it is set, the rest of the list
//! is abandoned. A task that fails (or panics) never stops the run.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Cooperative cancellation token. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    triggered: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Whether both handles share one flag.
    pub fn same_as(&self, other: &StopSignal) -> bool {
        Arc::ptr_eq(&self.triggered, &other.triggered)
    }
}

/// How a single task ended, as reported by the task itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    /// The task decided there was nothing to do.
    Skipped,
    /// The task produced a result that was no longer wanted.
    Discarded,
}

pub type Task = BoxFuture<'static, TaskOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause between consecutive tasks.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Parallel limit for the variation path (the sequencer itself is always serial).
    #[serde(default = "default_variation_concurrency")]
    pub variation_concurrency: usize,
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_variation_concurrency() -> usize {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            variation_concurrency: default_variation_concurrency(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.variation_concurrency == 0 {
            return Err("variation_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
    /// Tasks that ran and skipped themselves, plus tasks never started because of a stop.
    pub skipped: usize,
    pub discarded: usize,
    pub stopped: bool,
    /// Indices of started tasks, in execution order.
    pub order: Vec<usize>,
}

impl RunSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed => self.failed += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Discarded => self.discarded += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    pacing: Duration,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

impl Sequencer {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(Duration::from_millis(config.pacing_ms))
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Drive `tasks` in order. Always resolves; failures are counted, not propagated.
    pub async fn run(&self, tasks: Vec<Task>, stop: &StopSignal) -> RunSummary {
        let total = tasks.len();
        let mut summary = RunSummary::default();
        info!(tasks = total, pacing_ms = self.pacing.as_millis() as u64, "Sequencer run started");

        for (index, task) in tasks.into_iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
            if stop.is_triggered() {
                summary.stopped = true;
                summary.skipped += total - index;
                info!(
                    next_task = index,
                    abandoned = total - index,
                    "Stop requested, abandoning remaining tasks"
                );
                break;
            }

            summary.started += 1;
            summary.order.push(index);
            debug!(task = index, "Task started");

            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(task = index, "Task panicked, counting it as failed");
                    TaskOutcome::Failed
                }
            };
            debug!(task = index, outcome = ?outcome, "Task finished");
            summary.record(outcome);
        }

        info!(
            started = summary.started,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            stopped = summary.stopped,
            "Sequencer run finished"
        );
        summary
    }
}
