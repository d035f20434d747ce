//! Fixed-size batch accumulation.
//!
//! Backends are fed batches of exactly `batch_size` slots. A short final
//! batch is filled with copies of its last frame, and `Batch::pad` records how
//! many trailing slots are copies so their outputs are dropped instead of
//! written.

use crate::frame::Frame;

/// A full batch ready for inference.
///
/// `tensors.len() == originals.len() == batch_size` always holds; the first
/// `valid_len()` slots are real frames.
#[derive(Debug)]
pub struct Batch {
    tensors: Vec<Vec<f32>>,
    originals: Vec<Frame>,
    pad: usize,
}

impl Batch {
    /// Total slots, padding included.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Number of trailing padding slots.
    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Number of slots holding real frames.
    pub fn valid_len(&self) -> usize {
        self.len() - self.pad
    }

    pub fn tensors(&self) -> &[Vec<f32>] {
        &self.tensors
    }

    pub fn originals(&self) -> &[Frame] {
        &self.originals
    }

    /// Real frames in order. Padding copies are dropped here.
    pub fn into_valid_frames(self) -> Vec<Frame> {
        let valid = self.valid_len();
        let mut originals = self.originals;
        originals.truncate(valid);
        originals
    }
}

/// Groups preprocessed frames into fixed-size batches.
pub struct BatchAccumulator {
    batch_size: usize,
    tensors: Vec<Vec<f32>>,
    originals: Vec<Frame>,
}

impl BatchAccumulator {
    /// `batch_size` is clamped to at least one slot.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            tensors: Vec::with_capacity(batch_size),
            originals: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Frames waiting for the next batch.
    pub fn pending(&self) -> usize {
        self.tensors.len()
    }

    /// Add one frame. Returns a batch once `batch_size` frames are pending.
    pub fn push(&mut self, tensor: Vec<f32>, original: Frame) -> Option<Batch> {
        self.tensors.push(tensor);
        self.originals.push(original);
        if self.tensors.len() == self.batch_size {
            Some(self.take(0))
        } else {
            None
        }
    }

    /// Emit whatever is pending, padded to a full batch with the last frame.
    pub fn flush(&mut self) -> Option<Batch> {
        let pending = self.tensors.len();
        if pending == 0 {
            return None;
        }
        let pad = self.batch_size - pending;
        if pad > 0 {
            let last_tensor = self.tensors[pending - 1].clone();
            let last_original = self.originals[pending - 1].clone();
            for _ in 0..pad {
                self.tensors.push(last_tensor.clone());
                self.originals.push(last_original.clone());
            }
        }
        Some(self.take(pad))
    }

    fn take(&mut self, pad: usize) -> Batch {
        let tensors = std::mem::replace(&mut self.tensors, Vec::with_capacity(self.batch_size));
        let originals =
            std::mem::replace(&mut self.originals, Vec::with_capacity(self.batch_size));
        Batch {
            tensors,
            originals,
            pad,
        }
    }
}
