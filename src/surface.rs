use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_signals::signal::{Mutable, MutableSignalCloned};
use tokio::task::JoinHandle;

use crate::orchestrator::{CycleState, CycleStats};

/// The immutable view the control surface observes: current state name,
/// outcome counters and the last log line, republished atomically at every
/// state transition. The surface never touches orchestrator state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: CycleState,
    pub stats: CycleStats,
    pub last_log: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: CycleState::Idle,
            stats: CycleStats::default(),
            last_log: String::new(),
        }
    }
}

/// Discrete command flags crossing the surface/worker boundary. The worker
/// consumes them at well-defined points; no other mutable state is shared.
#[derive(Debug, Default)]
pub struct SurfaceShared {
    enabled: AtomicBool,
    abort: AtomicBool,
    trigger: AtomicBool,
    shutdown: AtomicBool,
}

impl SurfaceShared {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_pending(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::SeqCst)
    }

    pub fn raise_trigger(&self) {
        self.trigger.store(true, Ordering::SeqCst);
    }

    pub fn take_trigger(&self) -> bool {
        self.trigger.swap(false, Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Abstract trigger input: a sensor edge, a timer, or a manual button. The
/// orchestrator only ever asks "is there a trigger right now".
pub trait TriggerSource {
    fn has_trigger(&mut self) -> bool;
}

/// Trigger fed manually through the control surface bridge.
pub struct SurfaceTrigger {
    shared: Arc<SurfaceShared>,
}

impl SurfaceTrigger {
    pub fn new(shared: Arc<SurfaceShared>) -> Self {
        Self { shared }
    }
}

impl TriggerSource for SurfaceTrigger {
    fn has_trigger(&mut self) -> bool {
        self.shared.take_trigger()
    }
}

/// The narrow interface handed to the (external) GUI: subscribe to published
/// snapshots, issue start/stop/abort, inject manual triggers, shut down.
pub struct SurfaceHandle {
    shared: Arc<SurfaceShared>,
    snapshot: Mutable<Snapshot>,
    join_handle: JoinHandle<()>,
}

impl SurfaceHandle {
    pub fn new(
        shared: Arc<SurfaceShared>,
        snapshot: Mutable<Snapshot>,
        join_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            shared,
            snapshot,
            join_handle,
        }
    }

    /// Enables triggering.
    pub fn request_start(&self) {
        self.shared.set_enabled(true);
    }

    /// Disables triggering. Does not abort a cycle already in flight.
    pub fn request_stop(&self) {
        self.shared.set_enabled(false);
    }

    /// Honoured at the next state-transition or gesture-step boundary, never
    /// mid motion step.
    pub fn request_abort(&self) {
        self.shared.request_abort();
    }

    pub fn inject_trigger(&self) {
        self.shared.raise_trigger();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.get_cloned()
    }

    pub fn subscribe(&self) -> MutableSignalCloned<Snapshot> {
        self.snapshot.signal_cloned()
    }

    pub async fn shutdown(self) {
        self.shared.request_shutdown();
        let _ = self.join_handle.await;
    }
}
