//! Preprocessing/scoring model abstraction.
//!
//! The `EmbeddingModel` and `KeywordModel` traits decouple the pipeline from
//! any specific backend (deterministic stubs, ONNX). Model assets are opaque
//! to the core: an [`AssetProvider`] resolves them into ready-to-use handles.
//!
//! `&mut self` on the inference methods intentionally expresses that backends
//! are stateful (session scratch buffers, caches). All mutation is serialised
//! through the handles' `parking_lot::Mutex`. The embedding model is loaded
//! once and shared by every keyword spotter; each keyword model has its own
//! handle.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbeddingModel, OnnxKeywordModel, OnnxProvider};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ModelConfig, StrategyKind, WakeConfig};
use crate::error::Result;
use crate::features::{EmbeddingVector, MelFrame};

/// Contract for the shared mel-window → embedding model.
pub trait EmbeddingModel: Send + 'static {
    /// Map a (normalized) 76-frame mel window to one embedding vector.
    ///
    /// # Errors
    /// Returns an error if inference fails; the affected cycle is treated as
    /// "no trigger" by the caller.
    fn embed(&mut self, window: &[MelFrame]) -> Result<EmbeddingVector>;
}

/// Contract for a per-keyword classifier over an embedding window.
pub trait KeywordModel: Send + 'static {
    /// Number of trailing embedding vectors this model consumes.
    fn required_frames(&self) -> usize;

    /// Score a window of exactly `required_frames()` embeddings.
    ///
    /// Returns a confidence in [0, 1].
    fn score(&mut self, window: &[EmbeddingVector]) -> Result<f32>;
}

/// Thread-safe reference-counted handle to any `EmbeddingModel` implementor.
///
/// Uses `parking_lot::Mutex`: non-poisoning on panic, and faster uncontended
/// than `std::sync::Mutex`.
#[derive(Clone)]
pub struct EmbeddingHandle(pub Arc<Mutex<dyn EmbeddingModel>>);

impl EmbeddingHandle {
    pub fn new<M: EmbeddingModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for EmbeddingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingHandle").finish_non_exhaustive()
    }
}

/// Thread-safe reference-counted handle to any `KeywordModel` implementor.
#[derive(Clone)]
pub struct KeywordHandle(pub Arc<Mutex<dyn KeywordModel>>);

impl KeywordHandle {
    pub fn new<M: KeywordModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for KeywordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordHandle").finish_non_exhaustive()
    }
}

/// Resolves opaque model assets for a strategy.
///
/// Implemented by the external asset-loading collaborator. `validate` checks
/// preconditions without loading anything, so the fallback selector can probe
/// a strategy cheaply; the load methods may still fail, which is equally
/// fatal to the attempted strategy.
pub trait AssetProvider: Send + Sync {
    /// Check that every asset `kind` needs for `config` is present.
    ///
    /// # Errors
    /// `AssetMissing` naming the first absent asset.
    fn validate(&self, kind: StrategyKind, config: &WakeConfig) -> Result<()>;

    /// Load the shared mel-window embedding model.
    fn embedding_model(&self) -> Result<EmbeddingHandle>;

    /// Load the classifier for one configured keyword.
    fn keyword_model(&self, model: &ModelConfig) -> Result<KeywordHandle>;

    /// Load the stored mel template for the closed-form spotter.
    fn mel_template(&self, keyword: &str) -> Result<Vec<MelFrame>>;
}
