//! End-to-end scenarios through the public engine API with stub models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;

use auris_core::buffering::SliceSource;
use auris_core::config::{ModelConfig, StrategyKind, WakeConfig};
use auris_core::error::{AurisError, Result};
use auris_core::features::MelFrame;
use auris_core::models::stub::StubProvider;
use auris_core::models::{AssetProvider, EmbeddingHandle, KeywordHandle};
use auris_core::{AudioSource, DetectionEvent, EngineState, WakeEngine};

const CHUNK: usize = 1280;

/// Chunks until mel (76 frames @ 5/chunk) and embedding (16) histories fill.
const WARMUP_CHUNKS: usize = 32;

/// Delivers one 1280-sample batch per read with a real-time-ish delay, so
/// wall-clock debounce behaves as it would against a live microphone.
struct PacedSource {
    remaining: usize,
    interval: Duration,
}

impl PacedSource {
    fn chunks(remaining: usize, interval: Duration) -> Self {
        Self {
            remaining,
            interval,
        }
    }
}

impl AudioSource for PacedSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        thread::sleep(self.interval);
        self.remaining -= 1;
        let n = CHUNK.min(buf.len());
        buf[..n].fill(0);
        Ok(n)
    }
}

fn collect_detections(
    rx: &mut tokio::sync::broadcast::Receiver<DetectionEvent>,
) -> Vec<DetectionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => events.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration, what: &str) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < timeout, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn five_seconds_of_silence_produce_zero_detections() {
    let config = WakeConfig::new(vec![ModelConfig::new("hey auris")]);
    let engine = WakeEngine::initialize(config, &StubProvider::new()).expect("initialize");
    let mut detections = engine.subscribe();

    let samples = vec![0i16; 16_000 * 5];
    engine
        .start(Box::new(SliceSource::new(samples, 960)))
        .expect("start");

    wait_until(
        || engine.diagnostics_snapshot().samples_in >= 16_000 * 5,
        Duration::from_secs(5),
        "silence to drain",
    );
    engine.stop().expect("stop");

    assert!(collect_detections(&mut detections).is_empty());
    let snap = engine.diagnostics_snapshot();
    assert_eq!(snap.detections, 0);
    assert!(snap.score_calls > 0, "the pipeline did score");
}

#[test]
fn debounce_suppresses_the_second_peak_and_admits_the_third() {
    // Score script (one entry per scoring cycle, cycles are 80 ms apart):
    //   cycle 0          → 0.90   first detection
    //   cycle 2 (~160ms) → 0.90   inside the 750 ms window — suppressed
    //   cycle 10 (~800ms)→ 0.90   outside the window — second detection
    let mut scores = vec![0.0f32; 12];
    scores[0] = 0.90;
    scores[2] = 0.90;
    scores[10] = 0.90;
    scores.push(0.0); // repeated once the script is exhausted

    let mut model = ModelConfig::new("hey auris");
    model.threshold = Some(0.55);
    model.precise = true;
    let config = WakeConfig::new(vec![model]);

    let provider = StubProvider::new().with_scores("hey auris", scores);
    let engine = WakeEngine::initialize(config, &provider).expect("initialize");
    let mut detections = engine.subscribe();

    let total_chunks = WARMUP_CHUNKS + 20;
    engine
        .start(Box::new(PacedSource::chunks(
            total_chunks,
            Duration::from_millis(80),
        )))
        .expect("start");

    wait_until(
        || engine.diagnostics_snapshot().samples_in >= total_chunks * CHUNK,
        Duration::from_secs(15),
        "paced audio to drain",
    );
    engine.stop().expect("stop");

    let events = collect_detections(&mut detections);
    assert_eq!(
        events.len(),
        2,
        "expected exactly two detections, got {events:?}"
    );
    assert!(events.iter().all(|e| e.keyword == "hey auris"));
    assert!(events[1].timestamp_ms >= events[0].timestamp_ms + 750);
}

#[test]
fn fallback_activates_the_alternate_strategy() {
    /// Embedding assets are "missing"; template assets resolve.
    struct TemplateOnly {
        inner: StubProvider,
        validations: AtomicUsize,
    }

    impl AssetProvider for TemplateOnly {
        fn validate(&self, kind: StrategyKind, config: &WakeConfig) -> Result<()> {
            self.validations.fetch_add(1, Ordering::Relaxed);
            match kind {
                StrategyKind::Embedding => Err(AurisError::AssetMissing(
                    "embedding_model.onnx".into(),
                )),
                StrategyKind::Template => self.inner.validate(kind, config),
            }
        }

        fn embedding_model(&self) -> Result<EmbeddingHandle> {
            self.inner.embedding_model()
        }

        fn keyword_model(&self, model: &ModelConfig) -> Result<KeywordHandle> {
            self.inner.keyword_model(model)
        }

        fn mel_template(&self, keyword: &str) -> Result<Vec<MelFrame>> {
            self.inner.mel_template(keyword)
        }
    }

    let provider = TemplateOnly {
        inner: StubProvider::new(),
        validations: AtomicUsize::new(0),
    };
    let config = WakeConfig::new(vec![ModelConfig::new("hey auris")]);
    assert_eq!(config.strategy, StrategyKind::Embedding);

    let engine = WakeEngine::initialize(config, &provider).expect("fallback should succeed");
    assert_eq!(engine.active_strategy(), StrategyKind::Template);
    assert!(engine.fell_back());
    assert!(
        provider.validations.load(Ordering::Relaxed) >= 2,
        "both strategies were probed"
    );

    // The fallback engine runs like any other.
    engine
        .start(Box::new(SliceSource::new(vec![0i16; CHUNK * 4], CHUNK)))
        .expect("start");
    wait_until(
        || engine.diagnostics_snapshot().samples_in >= CHUNK * 4,
        Duration::from_secs(2),
        "audio to drain",
    );
    engine.release().expect("release");
}

#[test]
fn both_strategies_missing_fail_initialization() {
    struct NothingProvider;

    impl AssetProvider for NothingProvider {
        fn validate(&self, kind: StrategyKind, _config: &WakeConfig) -> Result<()> {
            Err(AurisError::AssetMissing(format!("{kind:?} assets")))
        }

        fn embedding_model(&self) -> Result<EmbeddingHandle> {
            Err(AurisError::AssetMissing("embedding model".into()))
        }

        fn keyword_model(&self, model: &ModelConfig) -> Result<KeywordHandle> {
            Err(AurisError::AssetMissing(model.keyword.clone()))
        }

        fn mel_template(&self, keyword: &str) -> Result<Vec<MelFrame>> {
            Err(AurisError::AssetMissing(keyword.into()))
        }
    }

    let config = WakeConfig::new(vec![ModelConfig::new("hey auris")]);
    let err = WakeEngine::initialize(config, &NothingProvider).unwrap_err();
    assert!(matches!(err, AurisError::AssetMissing(_)));
}

#[test]
fn engine_state_transitions_are_observable() {
    let config = WakeConfig::new(vec![ModelConfig::new("hey auris")]);
    let engine = WakeEngine::initialize(config, &StubProvider::new()).expect("initialize");
    let mut state_rx = engine.subscribe_state();

    engine
        .start(Box::new(SliceSource::new(vec![0i16; CHUNK], CHUNK)))
        .expect("start");
    engine.pause().expect("pause");
    engine.resume().expect("resume");
    engine.stop().expect("stop");

    let mut states = Vec::new();
    while let Ok(ev) = state_rx.try_recv() {
        states.push(ev.state);
    }
    assert_eq!(
        states,
        vec![
            EngineState::Starting,
            EngineState::Running,
            EngineState::Paused,
            EngineState::Running,
            EngineState::Stopped,
        ]
    );
}

#[test]
fn detection_counts_are_invariant_to_read_batching() {
    // The same concatenated input, delivered in different batch sizes, must
    // produce the same analysis chunks and therefore the same score cycles.
    let samples: Vec<i16> = (0..CHUNK * 40).map(|i| (i % 251) as i16 * 13).collect();

    let run = |batch: usize| {
        let config = WakeConfig::new(vec![ModelConfig::new("hey auris")]);
        let provider = StubProvider::new().with_scores("hey auris", vec![0.0]);
        let engine = WakeEngine::initialize(config, &provider).expect("initialize");
        engine
            .start(Box::new(SliceSource::new(samples.clone(), batch)))
            .expect("start");
        wait_until(
            || engine.diagnostics_snapshot().samples_in >= samples.len(),
            Duration::from_secs(5),
            "audio to drain",
        );
        engine.stop().expect("stop");
        let snap = engine.diagnostics_snapshot();
        (snap.chunks, snap.embeddings, snap.score_calls)
    };

    let whole = run(CHUNK * 2);
    let uneven = run(317);
    let aligned = run(CHUNK);
    assert_eq!(whole, uneven);
    assert_eq!(whole, aligned);
}
