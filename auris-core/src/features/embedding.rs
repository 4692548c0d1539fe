//! Sliding-window embedding generation over the mel history.

use std::collections::VecDeque;

use crate::error::Result;
use crate::features::{EmbeddingVector, MelFrame, EMBEDDING_HISTORY, EMBEDDING_WINDOW};
use crate::models::EmbeddingHandle;

/// Variance floor for per-window normalization.
const NORM_VAR_FLOOR: f32 = 1e-6;

/// Normalized values are clamped to this band.
const NORM_CLAMP: f32 = 4.0;

/// Owns the bounded embedding history for one keyword spotter.
///
/// Invoked once per 80 ms analysis chunk: the embedding stride of 8 mel
/// frames is approximately one chunk, so a chunk-aligned cadence matches the
/// models' training stride.
#[derive(Debug)]
pub struct EmbeddingGenerator {
    window_norm: bool,
    history: VecDeque<EmbeddingVector>,
}

impl EmbeddingGenerator {
    pub fn new(window_norm: bool) -> Self {
        Self {
            window_norm,
            history: VecDeque::with_capacity(EMBEDDING_HISTORY),
        }
    }

    /// Run the embedding model over the trailing 76-frame mel window and
    /// append the result, evicting the oldest past [`EMBEDDING_HISTORY`].
    pub fn generate(&mut self, mel_window: &[MelFrame], model: &EmbeddingHandle) -> Result<()> {
        debug_assert_eq!(mel_window.len(), EMBEDDING_WINDOW);

        let embedding = if self.window_norm {
            let mut normalized = mel_window.to_vec();
            normalize_window(&mut normalized);
            model.0.lock().embed(&normalized)?
        } else {
            model.0.lock().embed(mel_window)?
        };

        if self.history.len() >= EMBEDDING_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(embedding);
        Ok(())
    }

    /// Number of embeddings currently in the history.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Copy of the trailing `n` embeddings, or `None` while the history is
    /// shorter — the "not ready" case. Never blocks, never errors.
    pub fn window(&self, n: usize) -> Option<Vec<EmbeddingVector>> {
        if self.history.len() < n {
            return None;
        }
        let start = self.history.len() - n;
        Some(self.history.range(start..).copied().collect())
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// Subtract the window mean and divide by its standard deviation (variance
/// floored), clamping to ±[`NORM_CLAMP`].
fn normalize_window(window: &mut [MelFrame]) {
    let count = (window.len() * window[0].len()) as f32;
    let mean = window.iter().flatten().sum::<f32>() / count;
    let var = window
        .iter()
        .flatten()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f32>()
        / count;
    let std = var.max(NORM_VAR_FLOOR).sqrt();

    for frame in window.iter_mut() {
        for v in frame.iter_mut() {
            *v = ((*v - mean) / std).clamp(-NORM_CLAMP, NORM_CLAMP);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::MEL_BINS;
    use crate::models::stub::MelPoolEmbedding;
    use approx::assert_relative_eq;

    fn mel_window(value: f32) -> Vec<MelFrame> {
        vec![[value; MEL_BINS]; EMBEDDING_WINDOW]
    }

    #[test]
    fn window_returns_none_until_enough_embeddings() {
        let model = EmbeddingHandle::new(MelPoolEmbedding);
        let mut gen = EmbeddingGenerator::new(false);

        assert!(gen.window(4).is_none());
        for _ in 0..3 {
            gen.generate(&mel_window(1.0), &model).unwrap();
        }
        assert!(gen.window(4).is_none());
        gen.generate(&mel_window(1.0), &model).unwrap();
        assert_eq!(gen.window(4).unwrap().len(), 4);
        // Still exactly 4 afterwards — sliding, most recent.
        gen.generate(&mel_window(2.0), &model).unwrap();
        let win = gen.window(4).unwrap();
        assert_eq!(win.len(), 4);
        assert_relative_eq!(win[3][0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn history_is_bounded() {
        let model = EmbeddingHandle::new(MelPoolEmbedding);
        let mut gen = EmbeddingGenerator::new(false);
        for _ in 0..(EMBEDDING_HISTORY + 10) {
            gen.generate(&mel_window(1.0), &model).unwrap();
        }
        assert_eq!(gen.len(), EMBEDDING_HISTORY);
    }

    #[test]
    fn constant_window_normalizes_to_zero() {
        // Variance floor keeps a flat window finite: (x - mean) == 0.
        let mut window = mel_window(3.7);
        normalize_window(&mut window);
        for frame in &window {
            for &v in frame.iter() {
                assert_relative_eq!(v, 0.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn normalization_clamps_outliers() {
        let mut window = mel_window(0.0);
        window[0][0] = 1_000.0;
        normalize_window(&mut window);
        for frame in &window {
            for &v in frame.iter() {
                assert!((-NORM_CLAMP..=NORM_CLAMP).contains(&v));
            }
        }
    }

    #[test]
    fn normalized_window_has_zero_mean_unit_std() {
        let mut window = mel_window(0.0);
        for (i, frame) in window.iter_mut().enumerate() {
            for (b, v) in frame.iter_mut().enumerate() {
                *v = ((i * MEL_BINS + b) % 13) as f32 * 0.25;
            }
        }
        normalize_window(&mut window);

        let count = (EMBEDDING_WINDOW * MEL_BINS) as f32;
        let mean = window.iter().flatten().sum::<f32>() / count;
        let var = window.iter().flatten().map(|v| v * v).sum::<f32>() / count;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-4);
        assert_relative_eq!(var, 1.0, epsilon = 1e-2);
    }
}
