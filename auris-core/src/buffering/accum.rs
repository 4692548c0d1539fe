//! Fixed-size analysis chunking of arbitrarily-batched sample reads.

/// Samples per analysis chunk: 80 ms at 16 kHz.
pub const CHUNK_SAMPLES: usize = 1280;

/// Input sample rate the whole pipeline is built around (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

/// A complete 1280-sample analysis window.
///
/// Only ever produced by [`FrameAccumulator`], so `samples.len()` is always
/// exactly [`CHUNK_SAMPLES`].
#[derive(Debug, Clone)]
pub struct AnalysisChunk {
    /// Mono i16 PCM samples at 16 kHz.
    pub samples: Vec<i16>,
}

impl AnalysisChunk {
    /// Duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1_000.0 / SAMPLE_RATE as f64
    }
}

/// Rebuilds fixed 1280-sample chunks from reads of any size.
///
/// Partial data is retained in a remainder buffer strictly smaller than one
/// chunk; a chunk is emitted if and only if exactly 1280 samples have
/// accumulated since the last emission, so the emitted chunk sequence depends
/// only on the concatenated input, not on how it was batched.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    remainder: Vec<i16>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            remainder: Vec::with_capacity(CHUNK_SAMPLES),
        }
    }

    /// Append samples and drain every completed chunk. Empty input is a no-op.
    /// Never blocks, never errors.
    pub fn push(&mut self, samples: &[i16]) -> Vec<AnalysisChunk> {
        if samples.is_empty() {
            return Vec::new();
        }

        self.remainder.extend_from_slice(samples);

        let mut chunks = Vec::new();
        while self.remainder.len() >= CHUNK_SAMPLES {
            let chunk: Vec<i16> = self.remainder.drain(..CHUNK_SAMPLES).collect();
            chunks.push(AnalysisChunk { samples: chunk });
        }
        chunks
    }

    /// Samples currently buffered (always < [`CHUNK_SAMPLES`] between calls).
    pub fn buffered(&self) -> usize {
        self.remainder.len()
    }

    pub fn reset(&mut self) {
        self.remainder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, offset: i16) -> Vec<i16> {
        (0..len).map(|i| offset.wrapping_add(i as i16)).collect()
    }

    #[test]
    fn emits_one_chunk_per_1280_samples() {
        let mut accum = FrameAccumulator::new();
        let chunks = accum.push(&ramp(CHUNK_SAMPLES, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples.len(), CHUNK_SAMPLES);
        assert_eq!(accum.buffered(), 0);
    }

    #[test]
    fn chunk_sequence_is_invariant_to_input_batching() {
        let input = ramp(CHUNK_SAMPLES * 2, 3);

        // One 2560-sample read.
        let mut whole = FrameAccumulator::new();
        let chunks_whole: Vec<_> = whole.push(&input);

        // Two 1280-sample reads.
        let mut halves = FrameAccumulator::new();
        let mut chunks_halves = halves.push(&input[..CHUNK_SAMPLES]);
        chunks_halves.extend(halves.push(&input[CHUNK_SAMPLES..]));

        // Many uneven reads.
        let mut uneven = FrameAccumulator::new();
        let mut chunks_uneven = Vec::new();
        for batch in input.chunks(317) {
            chunks_uneven.extend(uneven.push(batch));
        }

        let flatten = |chunks: &[AnalysisChunk]| -> Vec<i16> {
            chunks.iter().flat_map(|c| c.samples.clone()).collect()
        };
        assert_eq!(chunks_whole.len(), 2);
        assert_eq!(chunks_halves.len(), 2);
        assert_eq!(chunks_uneven.len(), 2);
        assert_eq!(flatten(&chunks_whole), flatten(&chunks_halves));
        assert_eq!(flatten(&chunks_whole), flatten(&chunks_uneven));
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut accum = FrameAccumulator::new();
        assert!(accum.push(&[]).is_empty());
        assert_eq!(accum.buffered(), 0);
    }

    #[test]
    fn remainder_stays_below_chunk_size() {
        let mut accum = FrameAccumulator::new();
        for batch in ramp(CHUNK_SAMPLES * 3 + 500, 0).chunks(999) {
            accum.push(batch);
            assert!(accum.buffered() < CHUNK_SAMPLES);
        }
        assert_eq!(accum.buffered(), 500);
    }

    #[test]
    fn one_call_can_complete_multiple_chunks() {
        let mut accum = FrameAccumulator::new();
        accum.push(&ramp(640, 0));
        let chunks = accum.push(&ramp(CHUNK_SAMPLES * 2, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(accum.buffered(), 640);
    }
}
