//! Detection strategies and the fallback selector.
//!
//! Exactly two strategies exist, so they are modeled as a tagged variant
//! rather than a trait object: the selector needs to name them, log which
//! one is active, and try the alternate when the preferred one's assets are
//! missing.
//!
//! - **Template** — closed-form single-keyword spotter: the live trailing
//!   mel window is compared frame-by-frame against a stored mel template by
//!   cosine similarity. No learned models beyond the template itself.
//! - **Embedding** — the multi-model pipeline: shared embedding model plus
//!   one classifier per configured keyword, each with its own preprocessing
//!   chain.

use std::time::Instant;

use tracing::{info, warn};

use crate::buffering::accum::FrameAccumulator;
use crate::config::{ModelConfig, ScorerTuning, StrategyKind, WakeConfig};
use crate::error::{AurisError, Result};
use crate::features::mel::MelExtractor;
use crate::features::MelFrame;
use crate::models::AssetProvider;
use crate::scorer::{ScoreDecision, WakeWordScorer};
use crate::spotter::{CycleStats, KeywordSpotter};

/// A keyword that fired during one processing cycle.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub keyword: String,
}

/// Aggregated outcome of one detection cycle across all models.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub triggers: Vec<Trigger>,
    pub stats: CycleStats,
    /// Models whose scoring failed this cycle (already logged; non-fatal).
    pub score_errors: usize,
}

/// The active detection strategy with its state.
#[derive(Debug)]
pub enum Detector {
    Template(TemplateSpotter),
    Embedding(Vec<KeywordSpotter>),
}

impl Detector {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Detector::Template(_) => StrategyKind::Template,
            Detector::Embedding(_) => StrategyKind::Embedding,
        }
    }

    /// Feed one batch of samples to every model.
    ///
    /// Scoring failures are logged and counted, never propagated: the failed
    /// model simply contributes no trigger this cycle.
    pub fn process(&mut self, samples: &[i16], now: Instant) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        match self {
            Detector::Template(spotter) => match spotter.process(samples, now) {
                Ok(stats) => fold(&mut outcome, spotter.keyword(), stats),
                Err(e) => {
                    warn!(keyword = spotter.keyword(), error = %e, "scoring failed; skipping cycle");
                    outcome.score_errors += 1;
                }
            },
            Detector::Embedding(spotters) => {
                for spotter in spotters.iter_mut() {
                    match spotter.process(samples, now) {
                        Ok(stats) => fold(&mut outcome, spotter.keyword(), stats),
                        Err(e) => {
                            warn!(keyword = spotter.keyword(), error = %e, "scoring failed; skipping cycle");
                            outcome.score_errors += 1;
                        }
                    }
                }
            }
        }
        outcome
    }
}

fn fold(outcome: &mut CycleOutcome, keyword: &str, stats: CycleStats) {
    if stats.triggered {
        outcome.triggers.push(Trigger {
            keyword: keyword.to_string(),
        });
    }
    outcome.stats.chunks += stats.chunks;
    outcome.stats.embeddings += stats.embeddings;
    outcome.stats.score_calls += stats.score_calls;
    outcome.stats.triggered |= stats.triggered;
    outcome.stats.debounced |= stats.debounced;
}

/// Result of strategy selection.
#[derive(Debug)]
pub struct Selection {
    pub detector: Detector,
    /// True when the preferred strategy was unavailable and the alternate
    /// was started instead.
    pub fell_back: bool,
}

/// Validate and build the preferred strategy, falling back to the alternate.
///
/// Asset and model-initialization failures are fatal to the attempted
/// strategy only; nothing partially built is retained. When both strategies
/// fail the preferred strategy's error is returned.
pub fn select(config: &WakeConfig, provider: &dyn AssetProvider) -> Result<Selection> {
    let preferred = config.strategy;
    match build(preferred, config, provider) {
        Ok(detector) => Ok(Selection {
            detector,
            fell_back: false,
        }),
        Err(primary) => {
            let alternate = preferred.alternate();
            warn!(
                preferred = ?preferred,
                error = %primary,
                "preferred strategy unavailable; attempting fallback"
            );
            match build(alternate, config, provider) {
                Ok(detector) => {
                    info!(active = ?alternate, "fallback strategy active");
                    Ok(Selection {
                        detector,
                        fell_back: true,
                    })
                }
                Err(secondary) => {
                    warn!(alternate = ?alternate, error = %secondary, "fallback strategy also unavailable");
                    Err(primary)
                }
            }
        }
    }
}

fn build(kind: StrategyKind, config: &WakeConfig, provider: &dyn AssetProvider) -> Result<Detector> {
    provider.validate(kind, config)?;

    match kind {
        StrategyKind::Template => {
            let model = config.enabled_models().next().ok_or_else(|| {
                AurisError::ConfigInvalid("no enabled keyword models configured".into())
            })?;
            let template = provider.mel_template(&model.keyword)?;
            Ok(Detector::Template(TemplateSpotter::new(
                model,
                config.sensitivity,
                config.tuning,
                template,
            )?))
        }
        StrategyKind::Embedding => {
            let embedder = provider.embedding_model()?;
            let mut spotters = Vec::new();
            for model in config.enabled_models() {
                let handle = provider.keyword_model(model)?;
                spotters.push(KeywordSpotter::new(
                    model,
                    config.sensitivity,
                    config.tuning,
                    embedder.clone(),
                    handle,
                ));
            }
            Ok(Detector::Embedding(spotters))
        }
    }
}

// ---------------------------------------------------------------------------
// Closed-form template spotter
// ---------------------------------------------------------------------------

/// Single-keyword spotter matching live mel frames against a stored template.
///
/// Score: mean cosine similarity between the trailing window and the template
/// frames, mapped from [-1, 1] into [0, 1]. Shares the scorer (smoothing,
/// adaptive threshold, debounce) with the embedding strategy.
#[derive(Debug)]
pub struct TemplateSpotter {
    keyword: String,
    accum: FrameAccumulator,
    mel: MelExtractor,
    template: Vec<MelFrame>,
    scorer: WakeWordScorer,
}

impl TemplateSpotter {
    pub fn new(
        config: &ModelConfig,
        sensitivity: f32,
        tuning: ScorerTuning,
        template: Vec<MelFrame>,
    ) -> Result<Self> {
        if template.is_empty() {
            return Err(AurisError::ModelInit(format!(
                "empty mel template for '{}'",
                config.keyword
            )));
        }
        Ok(Self {
            keyword: config.keyword.clone(),
            accum: FrameAccumulator::new(),
            mel: MelExtractor::new(config.profile.front_end()),
            template,
            scorer: WakeWordScorer::new(
                config.static_threshold(sensitivity),
                config.precise,
                tuning,
            ),
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn process(&mut self, samples: &[i16], now: Instant) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        for chunk in self.accum.push(samples) {
            stats.chunks += 1;
            self.mel.process(&chunk);

            let Some(window) = self.mel.trailing(self.template.len()) else {
                continue;
            };
            let score = self.similarity(&window);
            stats.score_calls += 1;

            match self.scorer.observe(score, now) {
                ScoreDecision::Triggered => stats.triggered = true,
                ScoreDecision::Debounced => stats.debounced = true,
                ScoreDecision::Quiet => {}
            }
        }
        Ok(stats)
    }

    fn similarity(&self, window: &[MelFrame]) -> f32 {
        let mut sum = 0.0f32;
        for (live, reference) in window.iter().zip(self.template.iter()) {
            sum += cosine(live, reference);
        }
        let mean = sum / self.template.len() as f32;
        ((mean + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

fn cosine(a: &MelFrame, b: &MelFrame) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = (na.sqrt() * nb.sqrt()).max(1e-10);
    dot / denom
}
