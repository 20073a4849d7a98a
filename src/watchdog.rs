//! Stuck-Job Watchdog
//!
//! Periodically force-fails artifacts that have been `generating` for longer than the
//! stuck threshold. This covers calls whose own timeout race never settles. The watchdog
//! never touches the network; it only rewrites records and clears the batch flag.

use crate::artifact::Artifact;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Failure detail for swept artifacts. Distinct from backend error text.
pub const STUCK_DETAIL: &str = "Generation stalled and was stopped after waiting too long";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: u64,
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_stuck_threshold_ms() -> u64 {
    180_000
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stuck_threshold_ms: default_stuck_threshold_ms(),
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than zero".to_string());
        }
        if self.stuck_threshold_ms < self.interval_ms {
            return Err(format!(
                "stuck_threshold_ms ({}) should not be shorter than interval_ms ({})",
                self.stuck_threshold_ms, self.interval_ms
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Watchdog {
    state: Arc<SessionState>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(state: Arc<SessionState>, config: WatchdogConfig) -> Self {
        Self { state, config }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// One pass at `now_ms`. Returns the artifacts it failed.
    pub fn sweep(&self, now_ms: u64) -> Vec<Artifact> {
        let threshold = self.config.stuck_threshold_ms;
        let swept = self
            .state
            .mutate(|registry| registry.sweep_stuck(now_ms, threshold, STUCK_DETAIL));
        if swept.is_empty() {
            return swept;
        }

        for artifact in &swept {
            warn!(
                artifact_id = %artifact.id,
                request_key = %artifact.request_key,
                threshold_ms = threshold,
                "Artifact stuck in generation, marked failed"
            );
        }
        self.state.sink().persist_all(&swept);
        if self.state.batch().clear() {
            info!("Cleared batch-in-progress flag after stuck sweep");
        }
        self.state.publish();
        swept
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    pub fn start(self) -> WatchdogHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let period = Duration::from_millis(self.config.interval_ms);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_ms = self.config.interval_ms, "Watchdog started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(self.state.now_ms());
                    }
                    _ = signal.notified() => break,
                }
            }
            debug!("Watchdog stopped");
        });

        WatchdogHandle { shutdown, task }
    }
}

pub struct WatchdogHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.task.await {
            warn!(error = %err, "Watchdog task ended abnormally");
        }
    }
}
