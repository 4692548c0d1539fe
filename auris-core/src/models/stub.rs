//! Deterministic stand-in models — no learned weights.
//!
//! Used in tests and by the demo CLI when the `onnx` feature is disabled, so
//! the full pipeline (chunking, mel history, windowing, scoring, debounce,
//! fallback) can be exercised end-to-end with predictable scores.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{ModelConfig, StrategyKind, WakeConfig};
use crate::error::{AurisError, Result};
use crate::features::{EmbeddingVector, MelFrame, EMBEDDING_DIM, MEL_BINS};
use crate::models::{AssetProvider, EmbeddingHandle, EmbeddingModel, KeywordHandle, KeywordModel};

/// Default classifier window length used by the stub keyword models.
pub const STUB_REQUIRED_FRAMES: usize = 16;

/// Closed-form embedding: each output dimension is the mean of one mel band
/// across the window, bands tiled over the 96 dimensions. Deterministic and
/// bounded, which is all the pipeline tests need.
#[derive(Debug, Default)]
pub struct MelPoolEmbedding;

impl EmbeddingModel for MelPoolEmbedding {
    fn embed(&mut self, window: &[MelFrame]) -> Result<EmbeddingVector> {
        if window.is_empty() {
            return Err(AurisError::Inference("empty mel window".into()));
        }
        let mut out = [0.0f32; EMBEDDING_DIM];
        let inv_len = 1.0 / window.len() as f32;
        for (d, slot) in out.iter_mut().enumerate() {
            let bin = d % MEL_BINS;
            *slot = window.iter().map(|f| f[bin]).sum::<f32>() * inv_len;
        }
        Ok(out)
    }
}

/// Keyword model that replays a scripted score sequence, repeating the final
/// entry once exhausted.
pub struct ScriptedKeyword {
    scores: Vec<f32>,
    idx: usize,
    required_frames: usize,
}

impl ScriptedKeyword {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            idx: 0,
            required_frames: STUB_REQUIRED_FRAMES,
        }
    }

    pub fn with_required_frames(mut self, frames: usize) -> Self {
        self.required_frames = frames;
        self
    }
}

impl KeywordModel for ScriptedKeyword {
    fn required_frames(&self) -> usize {
        self.required_frames
    }

    fn score(&mut self, window: &[EmbeddingVector]) -> Result<f32> {
        debug_assert_eq!(window.len(), self.required_frames);
        let score = match self.scores.get(self.idx) {
            Some(&s) => {
                self.idx += 1;
                s
            }
            None => self.scores.last().copied().unwrap_or(0.0),
        };
        Ok(score)
    }
}

/// Keyword model that always fails, for inference-failure paths.
pub struct FailingKeyword {
    required_frames: usize,
}

impl Default for FailingKeyword {
    fn default() -> Self {
        Self {
            required_frames: STUB_REQUIRED_FRAMES,
        }
    }
}

impl KeywordModel for FailingKeyword {
    fn required_frames(&self) -> usize {
        self.required_frames
    }

    fn score(&mut self, _window: &[EmbeddingVector]) -> Result<f32> {
        Err(AurisError::Inference("intentional stub failure".into()))
    }
}

/// [`AssetProvider`] backed entirely by stubs.
///
/// Keywords with a scripted score sequence replay it; all others score a
/// constant 0. Both strategies always validate.
#[derive(Default)]
pub struct StubProvider {
    scripted: HashMap<String, Vec<f32>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the score sequence returned for `keyword`.
    pub fn with_scores(mut self, keyword: impl Into<String>, scores: Vec<f32>) -> Self {
        self.scripted.insert(keyword.into(), scores);
        self
    }
}

impl AssetProvider for StubProvider {
    fn validate(&self, kind: StrategyKind, _config: &WakeConfig) -> Result<()> {
        debug!(?kind, "stub provider validates unconditionally");
        Ok(())
    }

    fn embedding_model(&self) -> Result<EmbeddingHandle> {
        Ok(EmbeddingHandle::new(MelPoolEmbedding))
    }

    fn keyword_model(&self, model: &ModelConfig) -> Result<KeywordHandle> {
        let scores = self
            .scripted
            .get(&model.keyword)
            .cloned()
            .unwrap_or_else(|| vec![0.0]);
        Ok(KeywordHandle::new(ScriptedKeyword::new(scores)))
    }

    fn mel_template(&self, keyword: &str) -> Result<Vec<MelFrame>> {
        // Deterministic template derived from the keyword bytes: enough for
        // the template spotter to have a stable, non-degenerate reference.
        let bytes = if keyword.is_empty() {
            b"auris".as_slice()
        } else {
            keyword.as_bytes()
        };
        let frames = 40;
        let mut template = Vec::with_capacity(frames);
        for i in 0..frames {
            let mut frame = [0.0f32; MEL_BINS];
            for (b, slot) in frame.iter_mut().enumerate() {
                let byte = bytes[(i + b) % bytes.len()] as f32;
                *slot = 1.0 + (byte / 255.0) * ((i + b) % 7) as f32 * 0.1;
            }
            template.push(frame);
        }
        Ok(template)
    }
}
