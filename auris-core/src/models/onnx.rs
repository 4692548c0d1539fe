//! ONNX model backends via the `ort` crate.
//!
//! Expects the openWakeWord-style export layout under a models directory:
//! - `embedding_model.onnx` — mel window `[1,76,32,1]` → embedding `[1,96]`
//! - `<keyword>.onnx`       — embeddings `[1,N,96]` → score `[1,1]`
//! - `<keyword>.template.wavmel` is *not* used here; mel templates for the
//!   closed-form spotter are resolved separately.
//!
//! Sessions are built single-threaded: the detection worker is the only
//! caller and wake-word models are small enough that intra-op parallelism
//! costs more than it saves.

use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::info;

use crate::config::{ModelConfig, StrategyKind, WakeConfig};
use crate::error::{AurisError, Result};
use crate::features::{EmbeddingVector, MelFrame, EMBEDDING_DIM, EMBEDDING_WINDOW, MEL_BINS};
use crate::models::{AssetProvider, EmbeddingHandle, EmbeddingModel, KeywordHandle, KeywordModel};

/// Classifier window length of the stock openWakeWord keyword exports.
pub const DEFAULT_REQUIRED_FRAMES: usize = 16;

fn build_session(path: &Path) -> Result<Session> {
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(1))
        .and_then(|b| b.with_inter_threads(1))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| AurisError::ModelInit(format!("{}: {e}", path.display())))
}

/// Shared mel-window → embedding model.
pub struct OnnxEmbeddingModel {
    session: Session,
}

impl OnnxEmbeddingModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = build_session(path)?;
        info!(path = %path.display(), "embedding model loaded");
        Ok(Self { session })
    }
}

impl EmbeddingModel for OnnxEmbeddingModel {
    fn embed(&mut self, window: &[MelFrame]) -> Result<EmbeddingVector> {
        if window.len() != EMBEDDING_WINDOW {
            return Err(AurisError::Inference(format!(
                "embedding window has {} frames, expected {EMBEDDING_WINDOW}",
                window.len()
            )));
        }

        let mut data = Vec::with_capacity(EMBEDDING_WINDOW * MEL_BINS);
        for frame in window {
            data.extend_from_slice(frame);
        }
        let input = Array4::from_shape_vec((1, EMBEDDING_WINDOW, MEL_BINS, 1), data)
            .map_err(|e| AurisError::Inference(e.to_string()))?;
        let tensor =
            Tensor::from_array(input).map_err(|e| AurisError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| AurisError::Inference(e.to_string()))?;

        let output: ndarray::ArrayViewD<f32> = outputs[0]
            .try_extract_array()
            .map_err(|e| AurisError::Inference(format!("extract embedding output: {e}")))?;

        let flat: Vec<f32> = output.iter().copied().collect();
        if flat.len() < EMBEDDING_DIM {
            return Err(AurisError::Inference(format!(
                "embedding output has {} values, expected {EMBEDDING_DIM}",
                flat.len()
            )));
        }
        let mut out = [0.0f32; EMBEDDING_DIM];
        out.copy_from_slice(&flat[..EMBEDDING_DIM]);
        Ok(out)
    }
}

/// Per-keyword classifier over a trailing embedding window.
pub struct OnnxKeywordModel {
    session: Session,
    required_frames: usize,
}

impl OnnxKeywordModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = build_session(path)?;
        info!(path = %path.display(), "keyword model loaded");
        Ok(Self {
            session,
            required_frames: DEFAULT_REQUIRED_FRAMES,
        })
    }

    pub fn with_required_frames(mut self, frames: usize) -> Self {
        self.required_frames = frames;
        self
    }
}

impl KeywordModel for OnnxKeywordModel {
    fn required_frames(&self) -> usize {
        self.required_frames
    }

    fn score(&mut self, window: &[EmbeddingVector]) -> Result<f32> {
        if window.len() != self.required_frames {
            return Err(AurisError::Inference(format!(
                "classifier window has {} frames, expected {}",
                window.len(),
                self.required_frames
            )));
        }

        let mut data = Vec::with_capacity(self.required_frames * EMBEDDING_DIM);
        for vector in window {
            data.extend_from_slice(vector);
        }
        let input = Array3::from_shape_vec((1, self.required_frames, EMBEDDING_DIM), data)
            .map_err(|e| AurisError::Inference(e.to_string()))?;
        let tensor =
            Tensor::from_array(input).map_err(|e| AurisError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| AurisError::Inference(e.to_string()))?;

        let output: ndarray::ArrayViewD<f32> = outputs[0]
            .try_extract_array()
            .map_err(|e| AurisError::Inference(format!("extract classifier output: {e}")))?;

        // Exports differ in output rank; the score is always the first value.
        let score = output
            .iter()
            .next()
            .copied()
            .ok_or_else(|| AurisError::Inference("empty classifier output".into()))?;
        Ok(score.clamp(0.0, 1.0))
    }
}

/// [`AssetProvider`] resolving assets from a models directory on disk.
pub struct OnnxProvider {
    models_dir: PathBuf,
}

impl OnnxProvider {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    fn embedding_path(&self) -> PathBuf {
        self.models_dir.join("embedding_model.onnx")
    }

    fn keyword_path(&self, keyword: &str) -> PathBuf {
        let file = keyword.to_lowercase().replace(char::is_whitespace, "_");
        self.models_dir.join(format!("{file}.onnx"))
    }

    fn template_path(&self, keyword: &str) -> PathBuf {
        let file = keyword.to_lowercase().replace(char::is_whitespace, "_");
        self.models_dir.join(format!("{file}.template.json"))
    }

    fn require(&self, path: &Path) -> Result<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(AurisError::AssetMissing(path.display().to_string()))
        }
    }
}

impl AssetProvider for OnnxProvider {
    fn validate(&self, kind: StrategyKind, config: &WakeConfig) -> Result<()> {
        match kind {
            StrategyKind::Embedding => {
                self.require(&self.embedding_path())?;
                for model in config.enabled_models() {
                    self.require(&self.keyword_path(&model.keyword))?;
                }
            }
            StrategyKind::Template => {
                let first = config.enabled_models().next().ok_or_else(|| {
                    AurisError::ConfigInvalid("no enabled keyword models configured".into())
                })?;
                self.require(&self.template_path(&first.keyword))?;
            }
        }
        Ok(())
    }

    fn embedding_model(&self) -> Result<EmbeddingHandle> {
        Ok(EmbeddingHandle::new(OnnxEmbeddingModel::load(
            &self.embedding_path(),
        )?))
    }

    fn keyword_model(&self, model: &ModelConfig) -> Result<KeywordHandle> {
        Ok(KeywordHandle::new(OnnxKeywordModel::load(
            &self.keyword_path(&model.keyword),
        )?))
    }

    fn mel_template(&self, keyword: &str) -> Result<Vec<MelFrame>> {
        let path = self.template_path(keyword);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| AurisError::AssetMissing(format!("{}: {e}", path.display())))?;
        let rows: Vec<Vec<f32>> = serde_json::from_str(&raw)
            .map_err(|e| AurisError::AssetMissing(format!("{}: {e}", path.display())))?;

        let mut template = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != MEL_BINS {
                return Err(AurisError::AssetMissing(format!(
                    "{}: template row has {} bins, expected {MEL_BINS}",
                    path.display(),
                    row.len()
                )));
            }
            let mut frame = [0.0f32; MEL_BINS];
            frame.copy_from_slice(&row);
            template.push(frame);
        }
        if template.is_empty() {
            return Err(AurisError::AssetMissing(format!(
                "{}: empty mel template",
                path.display()
            )));
        }
        Ok(template)
    }
}
