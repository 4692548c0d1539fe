//! Per-keyword detection chain: chunking → mel → embedding → scoring.
//!
//! Every spotter owns its *entire* preprocessing state (accumulator, mel
//! history, embedding history, rolling scores). Models with different
//! acoustic profiles therefore never share mutable buffers; only the loaded
//! embedding model itself is shared, behind its handle's mutex.

use std::time::Instant;

use tracing::debug;

use crate::buffering::accum::FrameAccumulator;
use crate::config::{ModelConfig, ScorerTuning};
use crate::error::Result;
use crate::features::embedding::EmbeddingGenerator;
use crate::features::mel::MelExtractor;
use crate::features::EMBEDDING_WINDOW;
use crate::models::{EmbeddingHandle, KeywordHandle};
use crate::scorer::{ScoreDecision, WakeWordScorer};

/// Counters from one spotter cycle, folded into the pipeline diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub chunks: usize,
    pub embeddings: usize,
    pub score_calls: usize,
    pub triggered: bool,
    pub debounced: bool,
}

/// One keyword model plus its private preprocessing chain.
#[derive(Debug)]
pub struct KeywordSpotter {
    keyword: String,
    accum: FrameAccumulator,
    mel: MelExtractor,
    generator: EmbeddingGenerator,
    embedder: EmbeddingHandle,
    model: KeywordHandle,
    required_frames: usize,
    scorer: WakeWordScorer,
}

impl KeywordSpotter {
    pub fn new(
        config: &ModelConfig,
        sensitivity: f32,
        tuning: ScorerTuning,
        embedder: EmbeddingHandle,
        model: KeywordHandle,
    ) -> Self {
        let front_end = config.profile.front_end();
        let required_frames = model.0.lock().required_frames();
        debug!(
            keyword = %config.keyword,
            required_frames,
            profile = ?config.profile,
            "keyword spotter built"
        );
        Self {
            keyword: config.keyword.clone(),
            accum: FrameAccumulator::new(),
            mel: MelExtractor::new(front_end),
            generator: EmbeddingGenerator::new(front_end.window_norm),
            embedder,
            model,
            required_frames,
            scorer: WakeWordScorer::new(
                config.static_threshold(sensitivity),
                config.precise,
                tuning,
            ),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Feed one batch of samples through the chain.
    ///
    /// # Errors
    /// Propagates embedding/classifier failures; the caller logs them and
    /// treats this model's cycle as "no trigger". Preprocessing state already
    /// advanced stays advanced — the next cycle continues from it.
    pub fn process(&mut self, samples: &[i16], now: Instant) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        for chunk in self.accum.push(samples) {
            stats.chunks += 1;
            self.mel.process(&chunk);

            let Some(mel_window) = self.mel.trailing(EMBEDDING_WINDOW) else {
                continue;
            };
            self.generator.generate(&mel_window, &self.embedder)?;
            stats.embeddings += 1;

            let Some(window) = self.generator.window(self.required_frames) else {
                continue;
            };
            let score = self.model.0.lock().score(&window)?;
            stats.score_calls += 1;

            match self.scorer.observe(score, now) {
                ScoreDecision::Triggered => stats.triggered = true,
                ScoreDecision::Debounced => stats.debounced = true,
                ScoreDecision::Quiet => {}
            }
        }

        Ok(stats)
    }
}
