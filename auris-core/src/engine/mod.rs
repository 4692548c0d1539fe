//! `WakeEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! WakeEngine::initialize()   → config validated, strategy selected/loaded
//!     └─► start(source)      → worker spawned, state = Running
//!         ├─► pause()        → worker idles, resources held, state = Paused
//!         ├─► resume()       → scoring continues from buffered state
//!         └─► stop()         → running=false, bounded join, state = Stopped
//! release()                  → stop + free models; safe to call repeatedly
//! ```
//!
//! Same-state transitions are logged no-ops (`start()` while Running spawns
//! nothing and emits nothing); genuinely invalid transitions are rejected
//! with `InvalidTransition`. `Error` is terminal until an explicit `stop()`.
//!
//! ## Threading
//!
//! The detection worker exclusively owns the detector (all per-model mutable
//! state). The controller only writes the running/paused atomics and the
//! canonical state mutex. On exit the worker hands the detector back through
//! a channel, which doubles as the exit signal for the bounded stop/join:
//! if the join times out, the stop still counts and `release()` finishes the
//! join before freeing anything.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    buffering::AudioSource,
    config::{StrategyKind, WakeConfig},
    error::{AurisError, Result},
    events::{ActivityEvent, DetectionEvent, EngineState, EngineStateEvent},
    models::AssetProvider,
    strategy::{self, Detector},
};

/// Broadcast channel capacity: events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// How long `stop()` waits for the worker's exit signal before deferring the
/// join to `release()`.
const STOP_JOIN_TIMEOUT_MS: u64 = 500;

#[derive(Debug)]
struct Worker {
    join: thread::JoinHandle<()>,
    exit_rx: crossbeam_channel::Receiver<Detector>,
}

/// The top-level engine handle.
///
/// `WakeEngine` is `Send + Sync` — all fields use interior mutability. Wrap
/// in `Arc<WakeEngine>` to share between the controlling context and
/// event-forwarding tasks.
#[derive(Debug)]
pub struct WakeEngine {
    config: WakeConfig,
    active_strategy: StrategyKind,
    fell_back: bool,
    /// Loaded detector, parked here between runs. `None` while the worker
    /// owns it or after `release()`.
    detector: Mutex<Option<Detector>>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    /// Canonical state (written under the mutex, read from any thread).
    state: Arc<Mutex<EngineState>>,
    detection_tx: broadcast::Sender<DetectionEvent>,
    state_tx: broadcast::Sender<EngineStateEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    /// Monotonically increasing detection sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    worker: Mutex<Option<Worker>>,
}

impl WakeEngine {
    /// Validate the configuration and load the detection strategy.
    ///
    /// Fail-fast: a rejected config or a strategy whose assets cannot be
    /// resolved (after trying the alternate) returns an error and retains
    /// nothing. No thread or device resource is touched here.
    ///
    /// # Errors
    /// - `ConfigInvalid` for an unusable configuration.
    /// - `AssetMissing` / `ModelInit` when neither strategy can start.
    pub fn initialize(config: WakeConfig, provider: &dyn AssetProvider) -> Result<Self> {
        config.validate()?;

        let selection = strategy::select(&config, provider)?;
        let active_strategy = selection.detector.kind();
        info!(
            strategy = ?active_strategy,
            fell_back = selection.fell_back,
            models = config.enabled_models().count(),
            "engine initialized"
        );

        let (detection_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (state_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Ok(Self {
            config,
            active_strategy,
            fell_back: selection.fell_back,
            detector: Mutex::new(Some(selection.detector)),
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(EngineState::Stopped)),
            detection_tx,
            state_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the detection worker over `source`.
    ///
    /// A no-op when already Running. Returns `InvalidTransition` from
    /// `Paused` (use `resume()`) and from `Error` (use `stop()` first).
    pub fn start(&self, source: Box<dyn AudioSource>) -> Result<()> {
        match self.state() {
            EngineState::Running | EngineState::Starting => {
                info!("start ignored — engine already running");
                return Ok(());
            }
            EngineState::Paused => {
                return Err(AurisError::InvalidTransition {
                    op: "start",
                    state: EngineState::Paused,
                })
            }
            EngineState::Error => {
                return Err(AurisError::InvalidTransition {
                    op: "start",
                    state: EngineState::Error,
                })
            }
            EngineState::Stopped => {}
        }

        // A previous stop may have timed out waiting for the worker; give it
        // one more chance to hand the detector back before giving up.
        if self.detector.lock().is_none() {
            self.reap_worker(Duration::from_millis(STOP_JOIN_TIMEOUT_MS));
        }
        let detector = self.detector.lock().take().ok_or_else(|| {
            AurisError::ModelInit(
                "detector unavailable — engine released or worker still exiting".into(),
            )
        })?;

        self.diagnostics.reset();
        self.set_state(EngineState::Starting, None);
        self.running.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);
        let ctx = pipeline::PipelineContext {
            detector,
            source,
            running: Arc::clone(&self.running),
            paused: Arc::clone(&self.paused),
            detection_tx: self.detection_tx.clone(),
            state_tx: self.state_tx.clone(),
            activity_tx: self.activity_tx.clone(),
            state: Arc::clone(&self.state),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
            exit_tx,
        };

        let join = match thread::Builder::new()
            .name("auris-detect".into())
            .spawn(move || pipeline::run(ctx))
        {
            Ok(join) => join,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_state(
                    EngineState::Error,
                    Some(format!("failed to spawn detection worker: {e}")),
                );
                return Err(e.into());
            }
        };
        *self.worker.lock() = Some(Worker { join, exit_rx });

        // Promote Starting → Running unless the worker already failed.
        {
            let mut state = self.state.lock();
            if *state == EngineState::Starting {
                *state = EngineState::Running;
                drop(state);
                let _ = self.state_tx.send(EngineStateEvent {
                    state: EngineState::Running,
                    detail: None,
                });
            }
        }
        info!("engine started — listening");
        Ok(())
    }

    /// Stop the detection worker.
    ///
    /// Clears the running flag and waits up to 500 ms for the worker to hand
    /// back the detector; on timeout the stop still takes effect and the
    /// join is deferred to `release()`. A no-op when already Stopped.
    pub fn stop(&self) -> Result<()> {
        if self.state() == EngineState::Stopped {
            info!("stop ignored — engine already stopped");
            return Ok(());
        }

        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        if !self.reap_worker(Duration::from_millis(STOP_JOIN_TIMEOUT_MS)) {
            warn!("worker slow to exit; join deferred to release()");
        }

        self.set_state(EngineState::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    /// Halt scoring without releasing any resource. A no-op when already
    /// Paused; invalid unless Running.
    pub fn pause(&self) -> Result<()> {
        match self.state() {
            EngineState::Paused => {
                info!("pause ignored — engine already paused");
                Ok(())
            }
            EngineState::Running => {
                self.paused.store(true, Ordering::SeqCst);
                self.set_state(EngineState::Paused, None);
                Ok(())
            }
            state => Err(AurisError::InvalidTransition { op: "pause", state }),
        }
    }

    /// Continue scoring from the current buffered state (no reset). A no-op
    /// when already Running; invalid unless Paused.
    pub fn resume(&self) -> Result<()> {
        match self.state() {
            EngineState::Running => {
                info!("resume ignored — engine already running");
                Ok(())
            }
            EngineState::Paused => {
                self.paused.store(false, Ordering::SeqCst);
                self.set_state(EngineState::Running, None);
                Ok(())
            }
            state => Err(AurisError::InvalidTransition { op: "resume", state }),
        }
    }

    /// Stop and free all model resources. Idempotent — safe to call more
    /// than once; frees nothing until the worker has actually exited.
    pub fn release(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.lock().take() {
            // Block for the actual exit: the worker leaves its loop within
            // one read cycle once the flag clears.
            let _ = worker.exit_rx.recv();
            let _ = worker.join.join();
        }
        *self.detector.lock() = None;

        if self.state() != EngineState::Stopped {
            self.set_state(EngineState::Stopped, None);
        }
        info!("engine released");
        Ok(())
    }

    /// True while the worker is actively scoring (not paused).
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Current engine state (snapshot).
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// The strategy actually serving detections.
    pub fn active_strategy(&self) -> StrategyKind {
        self.active_strategy
    }

    /// Whether the preferred strategy was unavailable and the alternate took
    /// over at initialization.
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    /// Subscribe to detection events.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.detection_tx.subscribe()
    }

    /// Subscribe to engine state transitions.
    pub fn subscribe_state(&self) -> broadcast::Receiver<EngineStateEvent> {
        self.state_tx.subscribe()
    }

    /// Subscribe to per-cycle audio activity (RMS levels).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Try to recover the detector from an exited (or exiting) worker.
    /// Returns false if the worker did not signal within `wait`.
    fn reap_worker(&self, wait: Duration) -> bool {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return true;
        };
        match worker.exit_rx.recv_timeout(wait) {
            Ok(detector) => {
                *self.detector.lock() = Some(detector);
                let _ = worker.join.join();
                true
            }
            Err(_) => {
                *slot = Some(worker);
                false
            }
        }
    }

    fn set_state(&self, new_state: EngineState, detail: Option<String>) {
        *self.state.lock() = new_state;
        let _ = self.state_tx.send(EngineStateEvent {
            state: new_state,
            detail,
        });
    }
}
