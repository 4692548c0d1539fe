//! Log-mel spectrogram frontend.
//!
//! Each 1280-sample chunk yields exactly 5 mel frames: 400-sample analysis
//! windows at offsets 0, 160, …, 640, Hann-windowed, zero-padded into a
//! 512-point radix-2 FFT. The power spectrum over bins [0, 256] is folded
//! through 32 triangular mel filters (Slaney-scale breakpoints) spanning
//! 20 Hz to the profile's upper edge, then log10-compressed with a numerical
//! floor so silent input stays finite.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::buffering::accum::{AnalysisChunk, SAMPLE_RATE};
use crate::config::FrontEnd;
use crate::features::{MelFrame, MEL_BINS, MEL_HISTORY};

/// Analysis window length in samples (25 ms).
pub const WINDOW_SAMPLES: usize = 400;

/// Hop between analysis windows in samples (10 ms).
pub const HOP_SAMPLES: usize = 160;

/// Radix-2 FFT length; the 400-sample window is zero-padded to this.
pub const FFT_SIZE: usize = 512;

/// Retained power-spectrum bins: [0, FFT_SIZE/2].
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2 + 1;

/// Mel frames produced per 1280-sample chunk.
pub const FRAMES_PER_CHUNK: usize = 5;

/// Lower edge of the mel filterbank (Hz).
pub const MEL_FMIN: f32 = 20.0;

/// Spectral energy floor applied before the log, keeping silence finite.
pub const MEL_FLOOR: f32 = 1e-10;

/// Streaming log-mel extractor with a bounded frame history.
///
/// One instance per keyword model; the history is mutable state and is never
/// shared across models.
pub struct MelExtractor {
    front_end: FrontEnd,
    hann: Vec<f32>,
    filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    history: VecDeque<MelFrame>,
}

impl std::fmt::Debug for MelExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MelExtractor")
            .field("front_end", &self.front_end)
            .field("hann", &self.hann)
            .field("filters", &self.filters)
            .field("fft_buf", &self.fft_buf)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl MelExtractor {
    pub fn new(front_end: FrontEnd) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);
        Self {
            front_end,
            hann: build_hann_window(WINDOW_SAMPLES),
            filters: build_mel_filters(
                FFT_SIZE,
                SAMPLE_RATE,
                MEL_BINS,
                MEL_FMIN,
                front_end.upper_hz,
            ),
            fft,
            fft_buf: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            history: VecDeque::with_capacity(MEL_HISTORY),
        }
    }

    pub fn front_end(&self) -> &FrontEnd {
        &self.front_end
    }

    /// Extract [`FRAMES_PER_CHUNK`] mel frames from one chunk and append them
    /// to the history, evicting the oldest frames past [`MEL_HISTORY`].
    pub fn process(&mut self, chunk: &AnalysisChunk) {
        for i in 0..FRAMES_PER_CHUNK {
            let frame = self.analyze_window(&chunk.samples, i * HOP_SAMPLES);
            if self.history.len() >= MEL_HISTORY {
                self.history.pop_front();
            }
            self.history.push_back(frame);
        }
    }

    /// Number of frames currently in the history.
    pub fn frames(&self) -> usize {
        self.history.len()
    }

    /// Copy of the trailing `n` frames, or `None` while the history is shorter.
    pub fn trailing(&self, n: usize) -> Option<Vec<MelFrame>> {
        if self.history.len() < n {
            return None;
        }
        let start = self.history.len() - n;
        Some(self.history.range(start..).copied().collect())
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn analyze_window(&mut self, samples: &[i16], offset: usize) -> MelFrame {
        // Windows short of samples are zero-padded (cold start / short input).
        for (i, slot) in self.fft_buf.iter_mut().enumerate() {
            let value = if i < WINDOW_SAMPLES {
                let idx = offset + i;
                let s = samples.get(idx).copied().unwrap_or(0) as f32;
                let s = match self.front_end.pre_emphasis {
                    Some(alpha) if idx > 0 => {
                        let prev = samples.get(idx - 1).copied().unwrap_or(0) as f32;
                        s - alpha * prev
                    }
                    _ => s,
                };
                s * self.hann[i]
            } else {
                0.0
            };
            *slot = Complex::new(value, 0.0);
        }

        self.fft.process(&mut self.fft_buf);

        let mut frame = [0.0f32; MEL_BINS];
        for (m, filter) in self.filters.iter().enumerate() {
            let mut energy = 0.0f32;
            for (k, &w) in filter.iter().enumerate() {
                if w > 0.0 {
                    energy += w * self.fft_buf[k].norm_sqr();
                }
            }
            let log = energy.max(MEL_FLOOR).log10();
            frame[m] = if self.front_end.log_rescale {
                log / 10.0 + 2.0
            } else {
                log
            };
        }
        frame
    }
}

fn build_hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

fn build_mel_filters(
    fft_size: usize,
    sr: u32,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_freqs = fft_size / 2 + 1;
    let mel_min = hz_to_mel_slaney(fmin);
    let mel_max = hz_to_mel_slaney(fmax);

    let mel_pts: Vec<f32> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
        .collect();

    let hz_pts: Vec<f32> = mel_pts.iter().map(|&m| mel_to_hz_slaney(m)).collect();
    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|k| k as f32 * sr as f32 / fft_size as f32)
        .collect();

    let mut filters = vec![vec![0f32; n_freqs]; n_mels];
    for m in 0..n_mels {
        let lower = hz_pts[m];
        let center = hz_pts[m + 1];
        let upper = hz_pts[m + 2];
        let down_denom = (center - lower).max(1e-10);
        let up_denom = (upper - center).max(1e-10);
        let enorm = 2.0 / (upper - lower).max(1e-10);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let w = if freq >= lower && freq <= center {
                (freq - lower) / down_denom
            } else if freq > center && freq <= upper {
                (upper - freq) / up_denom
            } else {
                0.0
            };
            filters[m][k] = (w * enorm).max(0.0);
        }
    }
    filters
}

fn hz_to_mel_slaney(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp; // 15
    let logstep = (6.4_f32).ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz_slaney(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp; // 15
    let logstep = (6.4_f32).ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::accum::CHUNK_SAMPLES;
    use crate::config::AcousticProfile;
    use approx::assert_relative_eq;

    fn chunk_of(value: i16) -> AnalysisChunk {
        AnalysisChunk {
            samples: vec![value; CHUNK_SAMPLES],
        }
    }

    fn tone_chunk(freq_hz: f32, amplitude: f32) -> AnalysisChunk {
        let samples = (0..CHUNK_SAMPLES)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (amplitude * (2.0 * PI * freq_hz * t).sin()) as i16
            })
            .collect();
        AnalysisChunk { samples }
    }

    #[test]
    fn each_chunk_yields_exactly_five_frames() {
        let mut mel = MelExtractor::new(AcousticProfile::Standard.front_end());
        mel.process(&chunk_of(0));
        assert_eq!(mel.frames(), FRAMES_PER_CHUNK);
        mel.process(&chunk_of(0));
        assert_eq!(mel.frames(), 2 * FRAMES_PER_CHUNK);
    }

    #[test]
    fn silence_produces_finite_floored_values() {
        let mut mel = MelExtractor::new(AcousticProfile::Standard.front_end());
        mel.process(&chunk_of(0));

        let frames = mel.trailing(FRAMES_PER_CHUNK).unwrap();
        for frame in &frames {
            for &v in frame.iter() {
                assert!(v.is_finite(), "mel value must be finite, got {v}");
                // log10(1e-10)/10 + 2 = 1.0 for zero energy under rescale.
                assert_relative_eq!(v, 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn silence_without_rescale_sits_at_the_log_floor() {
        let mut mel = MelExtractor::new(AcousticProfile::Raw.front_end());
        mel.process(&chunk_of(0));

        let frames = mel.trailing(FRAMES_PER_CHUNK).unwrap();
        for frame in &frames {
            for &v in frame.iter() {
                assert!(v.is_finite());
                assert_relative_eq!(v, -10.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn tone_energy_lands_in_the_matching_band() {
        let mut mel = MelExtractor::new(AcousticProfile::Raw.front_end());
        mel.process(&tone_chunk(440.0, 8_000.0));

        let frame = mel.trailing(1).unwrap()[0];
        let (loudest, _) = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        // 440 Hz sits in the lower third of a 20 Hz – 8 kHz filterbank.
        assert!(
            loudest < MEL_BINS / 3,
            "440 Hz peak expected in a low band, got bin {loudest}"
        );
        assert!(frame[loudest] > -10.0 + 1.0, "tone should rise above floor");
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let mut mel = MelExtractor::new(AcousticProfile::Standard.front_end());
        let chunks_needed = MEL_HISTORY / FRAMES_PER_CHUNK + 3;
        for _ in 0..chunks_needed {
            mel.process(&chunk_of(100));
        }
        assert_eq!(mel.frames(), MEL_HISTORY);
    }

    #[test]
    fn trailing_returns_none_until_enough_frames() {
        let mut mel = MelExtractor::new(AcousticProfile::Standard.front_end());
        assert!(mel.trailing(1).is_none());
        mel.process(&chunk_of(0));
        assert!(mel.trailing(FRAMES_PER_CHUNK + 1).is_none());
        assert_eq!(mel.trailing(FRAMES_PER_CHUNK).unwrap().len(), FRAMES_PER_CHUNK);
    }

    #[test]
    fn filterbank_covers_spectrum_without_nan() {
        for fe in [
            AcousticProfile::Standard.front_end(),
            AcousticProfile::Telephony.front_end(),
        ] {
            let filters = build_mel_filters(FFT_SIZE, SAMPLE_RATE, MEL_BINS, MEL_FMIN, fe.upper_hz);
            assert_eq!(filters.len(), MEL_BINS);
            for filter in &filters {
                assert_eq!(filter.len(), SPECTRUM_BINS);
                assert!(filter.iter().all(|w| w.is_finite() && *w >= 0.0));
                assert!(
                    filter.iter().any(|w| *w > 0.0),
                    "every filter must have support"
                );
            }
        }
    }
}
