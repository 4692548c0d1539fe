//! Streams a WAV file through the wake-word engine and prints detections.
//!
//! ```text
//! auris-cli --config wake.json --wav clip.wav [--models DIR] [--realtime]
//! ```
//!
//! With the `onnx` feature the models directory must hold the embedding and
//! keyword ONNX exports; without it, deterministic stub models exercise the
//! pipeline end-to-end (useful for plumbing checks, never for real audio).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use auris_core::buffering::accum::{CHUNK_SAMPLES, SAMPLE_RATE};
use auris_core::error::Result as CoreResult;
use auris_core::{AudioSource, WakeConfig, WakeEngine};

#[derive(Debug)]
struct Args {
    config: PathBuf,
    wav: PathBuf,
    models: Option<PathBuf>,
    realtime: bool,
}

fn parse_args() -> Result<Args> {
    let mut config: Option<PathBuf> = None;
    let mut wav: Option<PathBuf> = None;
    let mut models: Option<PathBuf> = None;
    let mut realtime = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = it.next().map(PathBuf::from),
            "--wav" => wav = it.next().map(PathBuf::from),
            "--models" => models = it.next().map(PathBuf::from),
            "--realtime" => realtime = true,
            "--help" | "-h" => {
                eprintln!(
                    "usage: auris-cli --config <wake.json> --wav <clip.wav> \
                     [--models <dir>] [--realtime]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Args {
        config: config.context("--config is required")?,
        wav: wav.context("--wav is required")?,
        models,
        realtime,
    })
}

/// WAV-backed audio source, optionally paced at real time.
struct WavSource {
    samples: Vec<i16>,
    pos: usize,
    pace: Option<Duration>,
}

impl WavSource {
    fn open(path: &PathBuf, realtime: bool) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("open {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            bail!("{} has {} channels, expected mono", path.display(), spec.channels);
        }
        if spec.sample_rate != SAMPLE_RATE {
            bail!(
                "{} is {} Hz, expected {SAMPLE_RATE} Hz",
                path.display(),
                spec.sample_rate
            );
        }
        let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
        let samples = samples.with_context(|| format!("decode {}", path.display()))?;
        info!(
            samples = samples.len(),
            seconds = samples.len() as f64 / SAMPLE_RATE as f64,
            "wav loaded"
        );
        Ok(Self {
            samples,
            pos: 0,
            pace: realtime.then(|| Duration::from_millis(80)),
        })
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

impl AudioSource for WavSource {
    fn read(&mut self, buf: &mut [i16]) -> CoreResult<usize> {
        if self.exhausted() {
            return Ok(0);
        }
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }
        let n = CHUNK_SAMPLES
            .min(buf.len())
            .min(self.samples.len() - self.pos);
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(feature = "onnx")]
fn build_engine(config: WakeConfig, models: Option<PathBuf>) -> Result<WakeEngine> {
    let dir = models.context("--models is required with the onnx feature")?;
    let provider = auris_core::OnnxProvider::new(dir);
    Ok(WakeEngine::initialize(config, &provider)?)
}

#[cfg(not(feature = "onnx"))]
fn build_engine(config: WakeConfig, _models: Option<PathBuf>) -> Result<WakeEngine> {
    use auris_core::models::stub::StubProvider;
    warn!("built without the onnx feature — using stub models (no real detection)");
    let provider = StubProvider::new();
    Ok(WakeEngine::initialize(config, &provider)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("read {}", args.config.display()))?;
    let config: WakeConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", args.config.display()))?;

    let source = WavSource::open(&args.wav, args.realtime)?;
    let total_samples = source.len();

    let engine = build_engine(config, args.models)?;
    if engine.fell_back() {
        warn!(
            strategy = ?engine.active_strategy(),
            "preferred strategy unavailable — fallback active"
        );
    }

    let mut detections = engine.subscribe();
    engine.start(Box::new(source))?;

    // Drain the file, then give the tail a moment to score.
    let deadline = Instant::now() + Duration::from_secs(600);
    while engine.diagnostics_snapshot().samples_in < total_samples {
        if Instant::now() > deadline {
            bail!("pipeline stalled before consuming the file");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(100));
    engine.stop()?;

    let mut count = 0usize;
    while let Ok(event) = detections.try_recv() {
        count += 1;
        println!(
            "[{:>6}ms] detected '{}' (seq {})",
            event.timestamp_ms % 1_000_000,
            event.keyword,
            event.seq
        );
    }

    let snap = engine.diagnostics_snapshot();
    info!(
        detections = count,
        chunks = snap.chunks,
        embeddings = snap.embeddings,
        score_calls = snap.score_calls,
        score_errors = snap.score_errors,
        "run complete"
    );
    engine.release()?;
    Ok(())
}
