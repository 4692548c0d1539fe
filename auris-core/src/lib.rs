//! # auris-core
//!
//! Always-on wake-word detection engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource → FrameAccumulator → MelExtractor → EmbeddingGenerator
//!                 (1280-sample        (5 log-mel       (76-frame window
//!                  chunks)             frames/chunk)    → 96-dim vector)
//!                                                            │
//!                                                   WakeWordScorer (per keyword)
//!                                                            │
//!                                          broadcast::Sender<DetectionEvent>
//! ```
//!
//! Two interchangeable detection strategies sit behind [`WakeEngine`]: a
//! closed-form mel-template spotter and the multi-model embedding pipeline
//! above. The engine validates the preferred strategy's assets at
//! initialization and falls back to the alternate when they are missing.
//!
//! All per-keyword mutable state (histories, rolling scores, thresholds) is
//! owned exclusively by the detection worker thread. The only values shared
//! across threads are the running/paused flags and the event channels.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod models;
pub mod scorer;
pub mod spotter;
pub mod strategy;

// Convenience re-exports for downstream crates
pub use buffering::AudioSource;
pub use config::{AcousticProfile, ModelConfig, ScorerTuning, StrategyKind, WakeConfig};
pub use engine::WakeEngine;
pub use error::AurisError;
pub use events::{ActivityEvent, DetectionEvent, EngineState, EngineStateEvent};
pub use models::{AssetProvider, EmbeddingHandle, EmbeddingModel, KeywordHandle, KeywordModel};

#[cfg(feature = "onnx")]
pub use models::{OnnxEmbeddingModel, OnnxKeywordModel, OnnxProvider};
