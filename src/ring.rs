//! The shared output ring, and the audio callback which drains it.
//!
//! Every session worker adds its audio into one ring of stereo frames,
//! at positions derived from its own RTP clock. The audio device's
//! callback is the only reader: it copies out the frames at the read
//! cursor, zeroes them for the next lap, and moves the cursor on.
//! The read cursor is never wound back, and serves as the single clock
//! all sessions schedule against.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::error;

/// An unwrapped position in the output stream, in frames.
pub type SamplePos = i64;

/// Ring buffer of mixed stereo frames plus the shared read cursor.
#[derive(Debug)]
pub struct RingBuffer {
    frames: Box<[[f32; 2]]>,
    mask: usize,
    read: SamplePos,
}

/// Handle to the ring shared between workers and the audio callback.
pub type SharedRing = Arc<Mutex<RingBuffer>>;

impl RingBuffer {
    /// Creates a silent ring holding `len` frames.
    ///
    /// `len` must be a power of two.
    pub fn new(len: usize) -> Result<Self> {
        if !len.is_power_of_two() || len < 2 {
            return Err(Error::InvalidConfig("ring length must be a power of two"));
        }

        Ok(Self {
            frames: vec![[0.0; 2]; len].into_boxed_slice(),
            mask: len - 1,
            read: 0,
        })
    }

    /// Wraps a new ring for sharing.
    pub fn shared(len: usize) -> Result<SharedRing> {
        Self::new(len).map(|ring| Arc::new(Mutex::new(ring)))
    }

    /// Number of frames held by the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Position of the next frame to be played.
    #[inline]
    pub fn read_cursor(&self) -> SamplePos {
        self.read
    }

    /// Physical slot of an unwrapped position.
    #[inline]
    pub fn index(&self, pos: SamplePos) -> usize {
        (pos as usize) & self.mask
    }

    /// Mixes `value` into `channel` at `pos`.
    #[inline]
    pub fn add(&mut self, pos: SamplePos, channel: usize, value: f32) {
        let idx = self.index(pos);
        self.frames[idx][channel] += value;
    }

    /// Reads the frame at `pos` without consuming it.
    pub fn frame(&self, pos: SamplePos) -> [f32; 2] {
        self.frames[self.index(pos)]
    }

    /// Copies the next `out.len() / 2` frames into `out` as interleaved
    /// stereo, clearing them from the ring.
    ///
    /// This never allocates. Requests for more than half of the ring are
    /// refused, leaving the cursor in place.
    pub fn drain(&mut self, out: &mut [f32]) -> Result<usize> {
        let requested = out.len() / 2;
        if requested > self.len() / 2 {
            return Err(Error::CallbackTooLarge {
                requested,
                capacity: self.len(),
            });
        }

        let mut remaining = requested;
        let mut out = &mut out[..2 * requested];

        while remaining > 0 {
            let start = self.index(self.read);
            let chunk = remaining.min(self.len() - start);
            let (head, tail) = std::mem::take(&mut out).split_at_mut(2 * chunk);
            let src = &mut self.frames[start..start + chunk];

            for (dst, frame) in head.chunks_exact_mut(2).zip(src.iter()) {
                dst.copy_from_slice(frame);
            }
            src.fill([0.0; 2]);

            self.read += chunk as SamplePos;
            remaining -= chunk;
            out = tail;
        }

        Ok(requested)
    }
}

/// Pull-style audio callback for an output device.
///
/// Cloning shares the same ring.
#[derive(Clone, Debug)]
pub struct AudioCallback {
    ring: SharedRing,
}

impl AudioCallback {
    pub fn new(ring: SharedRing) -> Self {
        Self { ring }
    }

    /// Fills `out` (interleaved stereo) with the next mixed frames.
    ///
    /// Holds the ring lock only for the copy. A misconfigured request
    /// yields silence.
    pub fn fill(&self, out: &mut [f32]) {
        let res = self.ring.lock().drain(out);
        if let Err(e) = res {
            out.fill(0.0);
            error!("Audio callback failed: {}", e);
        }
    }
}
