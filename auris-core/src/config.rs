//! Engine and per-keyword configuration.
//!
//! `WakeConfig` is the single struct handed to [`crate::WakeEngine::initialize`].
//! Validation is fail-fast: a config that cannot possibly run (no enabled
//! models, out-of-range thresholds) is rejected before any model or thread
//! resource is acquired.

use serde::{Deserialize, Serialize};

use crate::error::{AurisError, Result};

/// Which detection strategy the engine should prefer.
///
/// Represented as a tagged variant rather than a trait object: there are
/// exactly two fixed strategies and the fallback selector needs to name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Closed-form single-keyword spotter matching against a stored mel template.
    Template,
    /// Multi-model learned-embedding pipeline.
    Embedding,
}

impl StrategyKind {
    /// The strategy the fallback selector tries when `self` cannot start.
    pub fn alternate(self) -> Self {
        match self {
            StrategyKind::Template => StrategyKind::Embedding,
            StrategyKind::Embedding => StrategyKind::Template,
        }
    }
}

/// Lowest permitted upper mel band edge (Hz).
pub const MIN_UPPER_HZ: f32 = 1_000.0;

/// Default pre-emphasis coefficient.
pub const DEFAULT_PRE_EMPHASIS: f32 = 0.97;

/// Fixed acoustic front-end profiles, selected per keyword model.
///
/// An explicit config field: keyword models trained on different front ends
/// (band-limited audio, unscaled log energies) pick the matching profile at
/// load time. Different models in the same config may use different profiles;
/// each owns its own preprocessing chain so histories never mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcousticProfile {
    /// Full-band front end: 8 kHz upper edge, pre-emphasis, per-window
    /// normalization and affine log rescale.
    #[default]
    Standard,
    /// Band-limited front end for narrowband keyword models: 4 kHz upper edge,
    /// otherwise as `Standard`.
    Telephony,
    /// Plain log-mel energies: no pre-emphasis, no normalization, no rescale.
    Raw,
}

/// Concrete front-end parameters resolved from an [`AcousticProfile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontEnd {
    /// Upper edge of the mel filterbank in Hz (clamped to [`MIN_UPPER_HZ`]).
    pub upper_hz: f32,
    /// First-order pre-emphasis coefficient, `None` to disable.
    pub pre_emphasis: Option<f32>,
    /// Whether the embedding window is mean/variance normalized.
    pub window_norm: bool,
    /// Whether log energies are rescaled as `log10(x)/10 + 2`.
    pub log_rescale: bool,
}

impl AcousticProfile {
    pub fn front_end(self) -> FrontEnd {
        let fe = match self {
            AcousticProfile::Standard => FrontEnd {
                upper_hz: 8_000.0,
                pre_emphasis: Some(DEFAULT_PRE_EMPHASIS),
                window_norm: true,
                log_rescale: true,
            },
            AcousticProfile::Telephony => FrontEnd {
                upper_hz: 4_000.0,
                pre_emphasis: Some(DEFAULT_PRE_EMPHASIS),
                window_norm: true,
                log_rescale: true,
            },
            AcousticProfile::Raw => FrontEnd {
                upper_hz: 8_000.0,
                pre_emphasis: None,
                window_norm: false,
                log_rescale: false,
            },
        };
        FrontEnd {
            upper_hz: fe.upper_hz.max(MIN_UPPER_HZ),
            ..fe
        }
    }
}

/// Configuration for one keyword model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Keyword name, also used to resolve the model asset.
    pub keyword: String,
    /// Static detection threshold in (0, 1). `None` falls back to the global
    /// sensitivity.
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Disabled models are skipped entirely (no preprocessing chain built).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// High-confidence models keep their static threshold; the adaptive
    /// threshold is bypassed.
    #[serde(default)]
    pub precise: bool,
    /// Acoustic front-end profile this model was trained against.
    #[serde(default)]
    pub profile: AcousticProfile,
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            threshold: None,
            enabled: true,
            precise: false,
            profile: AcousticProfile::Standard,
        }
    }

    /// The static threshold, falling back to the global sensitivity.
    pub fn static_threshold(&self, sensitivity: f32) -> f32 {
        self.threshold.unwrap_or(sensitivity)
    }
}

/// Empirically tuned scorer parameters.
///
/// The hysteresis ratio and the adaptive step/bounds have no documented
/// derivation; they are exposed here instead of being hard-coded so trigger
/// sensitivity can be re-tuned against recorded audio without a code change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScorerTuning {
    /// Number of recent scores in the rolling window.
    pub rolling_window: usize,
    /// Interval between adaptive-threshold updates (ms, monotonic).
    pub adapt_interval_ms: u64,
    /// Step applied to the adaptive threshold per update.
    pub adapt_step: f32,
    /// Lower bound of the adaptive threshold.
    pub adaptive_floor: f32,
    /// Upper bound of the adaptive threshold.
    pub adaptive_ceil: f32,
    /// Rolling average below this loosens the threshold (too little activity).
    pub low_activity_avg: f32,
    /// Rolling average above this tightens the threshold (sustained activity).
    pub high_activity_avg: f32,
    /// A rolling average ≥ ratio × effective threshold also triggers.
    pub hysteresis_ratio: f32,
    /// Minimum interval between two accepted triggers of one model (ms).
    pub debounce_ms: u64,
}

impl Default for ScorerTuning {
    fn default() -> Self {
        Self {
            rolling_window: 12,
            adapt_interval_ms: 4_000,
            adapt_step: 0.02,
            adaptive_floor: 0.20,
            adaptive_ceil: 0.60,
            low_activity_avg: 0.02,
            high_activity_avg: 0.15,
            hysteresis_ratio: 0.90,
            debounce_ms: 750,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeConfig {
    /// Preferred detection strategy; the selector may fall back to the
    /// alternate when this one's assets are missing.
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Global sensitivity in (0, 1); the default static threshold for models
    /// that do not set their own.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Master switch. A disabled config fails initialization fast.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Configured keyword models. At least one must be enabled.
    pub models: Vec<ModelConfig>,
    /// Scorer tuning knobs shared by all models.
    #[serde(default)]
    pub tuning: ScorerTuning,
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Embedding
}

fn default_sensitivity() -> f32 {
    0.6
}

impl WakeConfig {
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self {
            strategy: default_strategy(),
            sensitivity: default_sensitivity(),
            enabled: true,
            models,
            tuning: ScorerTuning::default(),
        }
    }

    /// Enabled models, in config order.
    pub fn enabled_models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter().filter(|m| m.enabled)
    }

    /// Fail-fast validation, run before any resource is acquired.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Err(AurisError::ConfigInvalid(
                "wake-word detection is disabled".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.sensitivity) || self.sensitivity <= 0.0 {
            return Err(AurisError::ConfigInvalid(format!(
                "sensitivity {} outside (0, 1)",
                self.sensitivity
            )));
        }
        if self.enabled_models().count() == 0 {
            return Err(AurisError::ConfigInvalid(
                "no enabled keyword models configured".into(),
            ));
        }
        for model in self.enabled_models() {
            if model.keyword.trim().is_empty() {
                return Err(AurisError::ConfigInvalid(
                    "keyword name must not be empty".into(),
                ));
            }
            if let Some(t) = model.threshold {
                if !(0.0..1.0).contains(&t) || t <= 0.0 {
                    return Err(AurisError::ConfigInvalid(format!(
                        "threshold {} for '{}' outside (0, 1)",
                        t, model.keyword
                    )));
                }
            }
        }
        Ok(())
    }
}
