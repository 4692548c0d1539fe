//! Acoustic feature extraction: log-mel frames and embedding windows.
//!
//! Geometry (fixed by the preprocessing models' training):
//!
//! | Parameter          | Value            |
//! |--------------------|------------------|
//! | Analysis window    | 400 samples (25 ms) |
//! | Hop                | 160 samples (10 ms) |
//! | FFT size           | 512 (radix-2)    |
//! | Frequency bins     | 257 (512/2 + 1)  |
//! | Mel bands          | 32               |
//! | Mel frames / chunk | 5                |
//! | Embedding window   | 76 mel frames    |
//! | Embedding stride   | 8 frames (≈ one chunk) |
//! | Embedding dim      | 96               |

pub mod embedding;
pub mod mel;

/// Mel bands per frame.
pub const MEL_BINS: usize = 32;

/// Bounded mel history length (≈ 9.7 s of audio).
pub const MEL_HISTORY: usize = 970;

/// Mel frames consumed per embedding.
pub const EMBEDDING_WINDOW: usize = 76;

/// Embedding vector dimension.
pub const EMBEDDING_DIM: usize = 96;

/// Bounded embedding history length (≈ 12.8 s of audio).
pub const EMBEDDING_HISTORY: usize = 160;

/// One 10 ms hop of log-mel energies.
pub type MelFrame = [f32; MEL_BINS];

/// One 80 ms embedding of a 76-frame mel window.
pub type EmbeddingVector = [f32; EMBEDDING_DIM];
