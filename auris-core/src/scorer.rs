//! Per-keyword score smoothing, adaptive thresholding and debounce.
//!
//! ## Decision rule (per scoring cycle)
//!
//! 1. Push the raw score into a rolling window of the last 12 scores.
//! 2. Every 4 s, step the adaptive threshold by ±0.02 within [0.20, 0.60]:
//!    down when the rolling average shows too little activity, up when
//!    sustained activity suggests false-positive pressure.
//! 3. Effective threshold: the static configured threshold for precise
//!    models, else the adaptive one.
//! 4. Trigger on `score ≥ effective` **or** `rolling average ≥ 0.90 ×
//!    effective` (hysteresis: sustained near-threshold activity counts).
//! 5. Debounce: triggers within 750 ms of the last accepted one are
//!    suppressed, not queued.
//!
//! Time is injected as `Instant` arguments so tests control the clock; the
//! detection loop passes `Instant::now()`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::ScorerTuning;

/// Outcome of one scoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDecision {
    /// Below threshold (or hysteresis) — nothing happened.
    Quiet,
    /// Decision rule fired and the trigger was accepted.
    Triggered,
    /// Decision rule fired but the debounce window suppressed it.
    Debounced,
}

/// Smoothing/adaptation state for one keyword model.
#[derive(Debug)]
pub struct WakeWordScorer {
    tuning: ScorerTuning,
    static_threshold: f32,
    precise: bool,
    adaptive: f32,
    recent: VecDeque<f32>,
    last_adapt: Option<Instant>,
    last_trigger: Option<Instant>,
}

impl WakeWordScorer {
    pub fn new(static_threshold: f32, precise: bool, tuning: ScorerTuning) -> Self {
        let adaptive = static_threshold.clamp(tuning.adaptive_floor, tuning.adaptive_ceil);
        Self {
            tuning,
            static_threshold,
            precise,
            adaptive,
            recent: VecDeque::with_capacity(tuning.rolling_window),
            last_adapt: None,
            last_trigger: None,
        }
    }

    /// Feed one raw score and decide whether it triggers.
    pub fn observe(&mut self, score: f32, now: Instant) -> ScoreDecision {
        if self.recent.len() >= self.tuning.rolling_window {
            self.recent.pop_front();
        }
        self.recent.push_back(score);

        self.maybe_adapt(now);

        let effective = self.effective_threshold();
        let average = self.rolling_average();
        let hit =
            score >= effective || average >= self.tuning.hysteresis_ratio * effective;
        if !hit {
            return ScoreDecision::Quiet;
        }

        if let Some(last) = self.last_trigger {
            if now.duration_since(last) < Duration::from_millis(self.tuning.debounce_ms) {
                trace!(score, "trigger suppressed by debounce");
                return ScoreDecision::Debounced;
            }
        }

        self.last_trigger = Some(now);
        ScoreDecision::Triggered
    }

    /// The threshold the decision rule currently applies.
    pub fn effective_threshold(&self) -> f32 {
        if self.precise {
            self.static_threshold
        } else {
            self.adaptive
        }
    }

    /// Current adaptive threshold (tracked even for precise models).
    pub fn adaptive_threshold(&self) -> f32 {
        self.adaptive
    }

    /// Mean of the rolling score window; 0 while empty.
    pub fn rolling_average(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().sum::<f32>() / self.recent.len() as f32
    }

    /// Clear smoothing state; the adaptive threshold and debounce stamp keep
    /// their values (ambient conditions outlive a buffer reset).
    pub fn reset_window(&mut self) {
        self.recent.clear();
    }

    fn maybe_adapt(&mut self, now: Instant) {
        let interval = Duration::from_millis(self.tuning.adapt_interval_ms);
        match self.last_adapt {
            None => {
                self.last_adapt = Some(now);
            }
            Some(last) if now.duration_since(last) >= interval => {
                self.last_adapt = Some(now);
                let average = self.rolling_average();
                if average < self.tuning.low_activity_avg {
                    self.adaptive -= self.tuning.adapt_step;
                } else if average > self.tuning.high_activity_avg {
                    self.adaptive += self.tuning.adapt_step;
                }
                self.adaptive = self
                    .adaptive
                    .clamp(self.tuning.adaptive_floor, self.tuning.adaptive_ceil);
                trace!(
                    average,
                    adaptive = self.adaptive,
                    "adaptive threshold updated"
                );
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> ScorerTuning {
        ScorerTuning::default()
    }

    fn step(now: Instant, ms: u64) -> Instant {
        now + Duration::from_millis(ms)
    }

    #[test]
    fn strong_score_triggers_once_then_debounces() {
        let mut scorer = WakeWordScorer::new(0.55, true, tuning());
        let t0 = Instant::now();

        assert_eq!(scorer.observe(0.90, t0), ScoreDecision::Triggered);
        // 200 ms later: decision fires again but debounce suppresses it.
        assert_eq!(scorer.observe(0.90, step(t0, 200)), ScoreDecision::Debounced);
        // 800 ms after the first trigger: accepted again.
        assert_eq!(scorer.observe(0.90, step(t0, 800)), ScoreDecision::Triggered);
    }

    #[test]
    fn debounce_boundary_is_750_ms() {
        let mut scorer = WakeWordScorer::new(0.55, true, tuning());
        let t0 = Instant::now();

        assert_eq!(scorer.observe(0.90, t0), ScoreDecision::Triggered);
        assert_eq!(scorer.observe(0.90, step(t0, 749)), ScoreDecision::Debounced);
        assert_eq!(scorer.observe(0.90, step(t0, 750)), ScoreDecision::Triggered);
    }

    #[test]
    fn quiet_scores_do_not_trigger() {
        let mut scorer = WakeWordScorer::new(0.55, true, tuning());
        let t0 = Instant::now();
        for i in 0..50 {
            assert_eq!(
                scorer.observe(0.05, step(t0, i * 80)),
                ScoreDecision::Quiet
            );
        }
    }

    #[test]
    fn hysteresis_accepts_sustained_near_threshold_activity() {
        let mut scorer = WakeWordScorer::new(0.55, true, tuning());
        let t0 = Instant::now();

        // 0.52 < 0.55 but ≥ 0.90 × 0.55 = 0.495: once the rolling average
        // settles at 0.52 the hysteresis path fires.
        let mut decisions = Vec::new();
        for i in 0..12 {
            decisions.push(scorer.observe(0.52, step(t0, i * 80)));
        }
        assert!(
            decisions.contains(&ScoreDecision::Triggered),
            "sustained near-threshold activity should trigger, got {decisions:?}"
        );
    }

    #[test]
    fn adaptive_threshold_stays_in_bounds_for_arbitrary_sequences() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xA0815);
        for _ in 0..20 {
            let mut scorer = WakeWordScorer::new(0.55, false, tuning());
            let t0 = Instant::now();
            let mut now = t0;
            for _ in 0..500 {
                let score: f32 = rng.gen_range(0.0..1.0);
                now += Duration::from_millis(rng.gen_range(10..6_000));
                scorer.observe(score, now);
                let adaptive = scorer.adaptive_threshold();
                assert!(
                    (0.20..=0.60).contains(&adaptive),
                    "adaptive threshold escaped bounds: {adaptive}"
                );
            }
        }
    }

    #[test]
    fn low_activity_loosens_threshold_by_one_step_per_interval() {
        let mut scorer = WakeWordScorer::new(0.40, false, tuning());
        let t0 = Instant::now();

        // First observe arms the adaptation clock.
        scorer.observe(0.0, t0);
        assert_eq!(scorer.adaptive_threshold(), 0.40);

        scorer.observe(0.0, step(t0, 4_000));
        assert!((scorer.adaptive_threshold() - 0.38).abs() < 1e-6);

        // Within the next interval: no further change.
        scorer.observe(0.0, step(t0, 5_000));
        assert!((scorer.adaptive_threshold() - 0.38).abs() < 1e-6);
    }

    #[test]
    fn sustained_activity_tightens_threshold() {
        let mut scorer = WakeWordScorer::new(0.40, false, tuning());
        let t0 = Instant::now();

        scorer.observe(0.3, t0);
        scorer.observe(0.3, step(t0, 4_000));
        assert!((scorer.adaptive_threshold() - 0.42).abs() < 1e-6);
    }

    #[test]
    fn moderate_activity_leaves_threshold_alone() {
        let mut scorer = WakeWordScorer::new(0.40, false, tuning());
        let t0 = Instant::now();

        // Average 0.10 sits between the loosen (0.02) and tighten (0.15) bands.
        scorer.observe(0.10, t0);
        scorer.observe(0.10, step(t0, 4_000));
        assert_eq!(scorer.adaptive_threshold(), 0.40);
    }

    #[test]
    fn precise_models_bypass_adaptation() {
        let mut scorer = WakeWordScorer::new(0.55, true, tuning());
        let t0 = Instant::now();

        scorer.observe(0.0, t0);
        scorer.observe(0.0, step(t0, 4_000));
        // Adaptive state drifts, but the effective threshold is pinned.
        assert_eq!(scorer.effective_threshold(), 0.55);
        assert!(scorer.adaptive_threshold() < 0.55);
    }

    #[test]
    fn initial_adaptive_threshold_is_clamped_into_bounds() {
        let scorer = WakeWordScorer::new(0.95, false, tuning());
        assert_eq!(scorer.effective_threshold(), 0.60);

        let scorer = WakeWordScorer::new(0.05, false, tuning());
        assert_eq!(scorer.effective_threshold(), 0.20);
    }
}
