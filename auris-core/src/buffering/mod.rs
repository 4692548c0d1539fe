//! Audio transport into the detection worker.
//!
//! The capture side (an external collaborator — device callback, IPC shim,
//! file reader) pushes mono 16 kHz `i16` PCM through an [`AudioSource`]. The
//! provided [`RingSource`] pairs with a lock-free SPSC ring buffer whose
//! `push_slice` is wait-free and safe to call from a real-time audio callback.

pub mod accum;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

use crate::error::Result;

/// Type alias for the producer half — held by the capture thread.
pub type AudioProducer = ringbuf::HeapProd<i16>;

/// Type alias for the consumer half — held by the detection worker.
pub type AudioConsumer = ringbuf::HeapCons<i16>;

/// Buffer capacity: 2^20 = 1 048 576 samples ≈ 65.5 s at 16 kHz.
/// Far more than the worker ever falls behind; overruns mean a wedged worker.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<i16>::new(RING_CAPACITY).split()
}

/// Blocking-read seam between the external capture collaborator and the
/// detection worker.
///
/// Implementations deliver mono 16-bit PCM at 16 kHz in caller-chosen batch
/// sizes; batches need not align to analysis chunks.
pub trait AudioSource: Send + 'static {
    /// Read the next batch of samples into `buf`.
    ///
    /// Returns the number of samples written. `Ok(0)` means no data is
    /// currently available (the worker yields briefly and retries). An error
    /// is a device failure: the detection loop terminates and the engine
    /// transitions to `Error`.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;
}

/// [`AudioSource`] over the consumer half of the SPSC ring.
pub struct RingSource {
    consumer: AudioConsumer,
}

impl RingSource {
    pub fn new(consumer: AudioConsumer) -> Self {
        Self { consumer }
    }
}

impl AudioSource for RingSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        Ok(self.consumer.pop_slice(buf))
    }
}

/// [`AudioSource`] over an in-memory sample buffer, delivered in fixed
/// batches. Used by tests and the demo CLI; returns `Ok(0)` once drained.
pub struct SliceSource {
    samples: Vec<i16>,
    pos: usize,
    batch: usize,
}

impl SliceSource {
    pub fn new(samples: Vec<i16>, batch: usize) -> Self {
        assert!(batch > 0, "batch size must be positive");
        Self {
            samples,
            pos: 0,
            batch,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

impl AudioSource for SliceSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.exhausted() {
            return Ok(0);
        }
        let n = self
            .batch
            .min(buf.len())
            .min(self.samples.len() - self.pos);
        buf[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
