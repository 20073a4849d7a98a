//! State shared between a session, its running batches and its watchdog.

use crate::artifact::{Artifact, ArtifactRegistry};
use crate::persistence::BestEffortSink;
use crate::types::SessionClock;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

/// Render-ready snapshot published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub artifacts: Vec<Artifact>,
    pub batch_in_progress: bool,
}

/// "A batch is running" indicator.
///
/// Each batch holds its own entry, so clearing the flag (watchdog) and a batch finishing
/// later never interfere with a batch that started after the clear.
#[derive(Debug, Default)]
pub struct BatchFlag {
    active: Mutex<HashSet<u64>>,
    next: Mutex<u64>,
}

impl BatchFlag {
    fn enter(&self) -> u64 {
        let id = {
            let mut next = self.next.lock();
            *next += 1;
            *next
        };
        self.active.lock().insert(id);
        id
    }

    fn leave(&self, id: u64) {
        self.active.lock().remove(&id);
    }

    /// Drop every outstanding entry. Returns whether the flag was set.
    pub fn clear(&self) -> bool {
        let mut active = self.active.lock();
        let was_set = !active.is_empty();
        active.clear();
        was_set
    }

    pub fn is_set(&self) -> bool {
        !self.active.lock().is_empty()
    }
}

pub struct SessionState {
    registry: RwLock<ArtifactRegistry>,
    batch: BatchFlag,
    sink: BestEffortSink,
    clock: SessionClock,
    live: AtomicBool,
    view: watch::Sender<SessionView>,
}

impl SessionState {
    pub fn new(sink: BestEffortSink, clock: SessionClock) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            registry: RwLock::new(ArtifactRegistry::new()),
            batch: BatchFlag::default(),
            sink,
            clock,
            live: AtomicBool::new(true),
            view,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn sink(&self) -> &BestEffortSink {
        &self.sink
    }

    pub fn batch(&self) -> &BatchFlag {
        &self.batch
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn shut_down(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Read-only access to the registry.
    pub fn read<R>(&self, f: impl FnOnce(&ArtifactRegistry) -> R) -> R {
        f(&self.registry.read())
    }

    /// Apply a mutation, check collection invariants, and publish a fresh view.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ArtifactRegistry) -> R) -> R {
        let result = {
            let mut registry = self.registry.write();
            let result = f(&mut registry);
            if let Err(problem) = registry.check_invariants() {
                error!(problem = %problem, "Artifact invariant violated");
            }
            result
        };
        self.publish();
        result
    }

    pub fn publish(&self) {
        let view = SessionView {
            artifacts: self.registry.read().snapshot(),
            batch_in_progress: self.batch.is_set(),
        };
        self.view.send_replace(view);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Mark a batch as running until the guard drops.
    pub fn enter_batch(self: &Arc<Self>) -> BatchGuard {
        let id = self.batch.enter();
        self.publish();
        BatchGuard {
            state: Arc::clone(self),
            id,
        }
    }
}

pub struct BatchGuard {
    state: Arc<SessionState>,
    id: u64,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.state.batch.leave(self.id);
        self.state.publish();
    }
}
