//! Blocking detection loop.
//!
//! ## Loop stages (per iteration)
//!
//! ```text
//! 1. Check running flag (break) and paused flag (sleep, retry)
//! 2. AudioSource::read → batch of i16 samples (device error → Error state)
//! 3. Broadcast an ActivityEvent (RMS) for level meters
//! 4. Feed the batch to every keyword model's chain; collect triggers
//! 5. Broadcast one DetectionEvent per trigger (debounce already applied)
//! ```
//!
//! The loop runs on a dedicated worker thread that exclusively owns all
//! per-model mutable state. Detection consumers sit behind a broadcast
//! channel, so the read loop is never blocked by downstream handling. On
//! exit the detector is handed back to the engine through `exit_tx` so a
//! later `start()` resumes with the same loaded models.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    events::{ActivityEvent, DetectionEvent, EngineState, EngineStateEvent},
    strategy::Detector,
    AudioSource,
};

/// Samples requested per read: one 80 ms analysis chunk.
const READ_BATCH: usize = 1280;

/// Sleep when the source has no data (avoids busy-wait burning a core).
const EMPTY_SLEEP_MS: u64 = 5;

/// Sleep per iteration while paused; the flag is re-checked each wake.
const PAUSE_SLEEP_MS: u64 = 20;

#[derive(Debug)]
pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub chunks: AtomicUsize,
    pub embeddings: AtomicUsize,
    pub score_calls: AtomicUsize,
    pub score_errors: AtomicUsize,
    pub detections: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            samples_in: AtomicUsize::new(0),
            chunks: AtomicUsize::new(0),
            embeddings: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
            score_errors: AtomicUsize::new(0),
            detections: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.chunks.store(0, Ordering::Relaxed);
        self.embeddings.store(0, Ordering::Relaxed);
        self.score_calls.store(0, Ordering::Relaxed);
        self.score_errors.store(0, Ordering::Relaxed);
        self.detections.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            embeddings: self.embeddings.load(Ordering::Relaxed),
            score_calls: self.score_calls.load(Ordering::Relaxed),
            score_errors: self.score_errors.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub chunks: usize,
    pub embeddings: usize,
    pub score_calls: usize,
    pub score_errors: usize,
    pub detections: usize,
}

/// All context the detection loop needs, passed as one struct so the thread
/// closure stays tidy.
pub struct PipelineContext {
    pub detector: Detector,
    pub source: Box<dyn AudioSource>,
    pub running: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
    pub detection_tx: broadcast::Sender<DetectionEvent>,
    pub state_tx: broadcast::Sender<EngineStateEvent>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub state: Arc<Mutex<EngineState>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    /// Hands the detector back to the engine when the loop exits, doubling
    /// as the worker-exit signal for the bounded stop/join.
    pub exit_tx: crossbeam_channel::Sender<Detector>,
}

/// Run the blocking detection loop until `ctx.running` becomes false or the
/// audio source fails.
pub fn run(mut ctx: PipelineContext) {
    info!(strategy = ?ctx.detector.kind(), "detection loop started");

    let mut buf = vec![0i16; READ_BATCH];
    let mut activity_seq = 0u64;

    loop {
        // ── 0. Flags ──────────────────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        if ctx.paused.load(Ordering::Relaxed) {
            // Scoring and consumption halt; buffers and models stay warm.
            std::thread::sleep(Duration::from_millis(PAUSE_SLEEP_MS));
            continue;
        }

        // ── 1. Read audio ─────────────────────────────────────────────────
        let n = match ctx.source.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "audio source failed — detection loop terminating");
                *ctx.state.lock() = EngineState::Error;
                let _ = ctx.state_tx.send(EngineStateEvent {
                    state: EngineState::Error,
                    detail: Some(format!("audio source failed: {e}")),
                });
                ctx.running.store(false, Ordering::SeqCst);
                break;
            }
        };

        if n == 0 {
            std::thread::sleep(Duration::from_millis(EMPTY_SLEEP_MS));
            continue;
        }

        let samples = &buf[..n];
        ctx.diagnostics
            .samples_in
            .fetch_add(n, Ordering::Relaxed);

        // ── 2. Activity event ─────────────────────────────────────────────
        let rms = compute_rms(samples);
        let _ = ctx.activity_tx.send(ActivityEvent {
            seq: activity_seq,
            rms,
        });
        activity_seq = activity_seq.saturating_add(1);

        // ── 3. Score all models ───────────────────────────────────────────
        let outcome = ctx.detector.process(samples, Instant::now());

        ctx.diagnostics
            .chunks
            .fetch_add(outcome.stats.chunks, Ordering::Relaxed);
        ctx.diagnostics
            .embeddings
            .fetch_add(outcome.stats.embeddings, Ordering::Relaxed);
        ctx.diagnostics
            .score_calls
            .fetch_add(outcome.stats.score_calls, Ordering::Relaxed);
        ctx.diagnostics
            .score_errors
            .fetch_add(outcome.score_errors, Ordering::Relaxed);
        if outcome.stats.debounced {
            debug!("trigger within debounce window suppressed");
        }

        // ── 4. Emit detections ────────────────────────────────────────────
        for trigger in outcome.triggers {
            let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
            let event = DetectionEvent {
                seq,
                keyword: trigger.keyword,
                timestamp_ms: unix_millis(),
            };
            ctx.diagnostics.detections.fetch_add(1, Ordering::Relaxed);
            info!(seq, keyword = %event.keyword, "wake word detected");
            if ctx.detection_tx.send(event).is_err() {
                warn!("no detection subscribers; event dropped");
            }
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        chunks = snap.chunks,
        embeddings = snap.embeddings,
        score_calls = snap.score_calls,
        score_errors = snap.score_errors,
        detections = snap.detections,
        "detection loop stopped — diagnostics"
    );

    // Hand per-model state back for a later start(); also the exit signal.
    let _ = ctx.exit_tx.send(ctx.detector);
}

fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
