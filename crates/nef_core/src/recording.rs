//! Spike recording.
//!
//! One bit per neuron per tick, packed into frames of `ceil(N / 32)` words.
//! Two frame buffers alternate: the tick writes into one while the other
//! still holds the previous tick's frame for transfer to the recording
//! region. Spikes are written into the active frame whether or not
//! recording is enabled; only the copy into the region is conditional.

use alloc::vec::Vec;

use crate::error::{checked_size, try_alloc, EnsembleError};

#[derive(Clone, Debug)]
pub struct SpikeRecorder {
    record: bool,
    frame_length: usize,
    buffers: [Vec<u32>; 2],
    active: usize,
    /// Preallocated `capacity * frame_length` words; empty when not recording
    region: Vec<u32>,
    capacity: usize,
    frames: usize,
    overflowed: bool,
}

impl SpikeRecorder {
    /// `n_frames` sizes the recording region and is required when
    /// `record` is set.
    pub fn new(record: bool, n_neurons: usize, n_frames: Option<u32>) -> Result<Self, EnsembleError> {
        let frame_length = n_neurons.div_ceil(32);
        let capacity = match (record, n_frames) {
            (true, Some(frames)) => frames as usize,
            (true, None) => return Err(EnsembleError::UnboundedRecording),
            (false, _) => 0,
        };
        let region_words = checked_size("spike region", capacity, frame_length)?;
        Ok(Self {
            record,
            frame_length,
            buffers: [
                try_alloc("spike frame", frame_length, 0u32)?,
                try_alloc("spike frame", frame_length, 0u32)?,
            ],
            active: 0,
            region: try_alloc("spike region", region_words, 0u32)?,
            capacity,
            frames: 0,
            overflowed: false,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.record
    }

    /// Words per frame.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Frames the region can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Swap buffers and clear the one about to be written.
    pub fn prepare(&mut self) {
        self.active ^= 1;
        self.buffers[self.active].fill(0);
    }

    #[inline]
    pub fn record_spike(&mut self, n: usize) {
        self.buffers[self.active][n >> 5] |= 1 << (n & 0x1f);
    }

    /// Copy the active frame into the recording region.
    pub fn flush(&mut self) {
        if !self.record {
            return;
        }
        if self.frames >= self.capacity {
            if !self.overflowed {
                log::warn!("[Recording] region full after {} frames", self.capacity);
                self.overflowed = true;
            }
            return;
        }
        let start = self.frames * self.frame_length;
        self.region[start..start + self.frame_length].copy_from_slice(&self.buffers[self.active]);
        self.frames += 1;
    }

    /// Frame being written this tick.
    pub fn current_frame(&self) -> &[u32] {
        &self.buffers[self.active]
    }

    /// Frame written during the previous tick.
    pub fn previous_frame(&self) -> &[u32] {
        &self.buffers[self.active ^ 1]
    }

    pub fn frames_recorded(&self) -> usize {
        self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&[u32]> {
        if index >= self.frames {
            return None;
        }
        let start = index * self.frame_length;
        self.region.get(start..start + self.frame_length)
    }

    /// Whether neuron `n` spiked in recorded frame `index`.
    pub fn spiked(&self, index: usize, n: usize) -> bool {
        self.frame(index)
            .and_then(|f| f.get(n >> 5))
            .map_or(false, |w| w & (1 << (n & 0x1f)) != 0)
    }

    /// The recorded frames, in tick order.
    pub fn region(&self) -> &[u32] {
        &self.region[..self.frames * self.frame_length]
    }
}
