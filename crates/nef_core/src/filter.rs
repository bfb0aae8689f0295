//! Filtered input buffers.
//!
//! A buffer owns two vectors over its D dimensions. The *accumulator* sums the
//! partial values carried by packets since the last tick; the *filtered*
//! vector is a first-order low-pass (exponential moving average) of those
//! sums, advanced once per tick:
//!
//! ```text
//! filtered[d] = filtered[d] * decay + accumulator[d] * (1 - decay)
//! accumulator[d] = 0
//! ```
//!
//! # Ownership contract
//!
//! The accumulator is split out into [`SharedAccumulator`], a row of atomic
//! cells that the receive path can write from any context while the tick
//! owns the rest of the buffer. Packets use an atomic read-modify-write; the
//! step consumes each cell with an atomic swap-to-zero. A contribution lands
//! either before the swap of its cell (consumed by this step) or after it
//! (consumed by the next), never both and never neither.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::config::FilterParameters;
use crate::error::{try_alloc, EnsembleError};
use crate::numeric::{mask_bits, Fixed};

/// Accumulator cells written by the packet-receive path.
#[derive(Debug)]
pub struct SharedAccumulator {
    cells: Vec<AtomicI32>,
    mask: u32,
}

impl SharedAccumulator {
    fn new(n_dimensions: usize, mask: u32) -> Result<Self, EnsembleError> {
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(n_dimensions)
            .map_err(|_| EnsembleError::AllocationFailure {
                buffer: "filter accumulator",
                elements: n_dimensions,
            })?;
        cells.extend((0..n_dimensions).map(|_| AtomicI32::new(0)));
        Ok(Self { cells, mask })
    }

    pub fn n_dimensions(&self) -> usize {
        self.cells.len()
    }

    /// `accumulator[d] = (accumulator[d] & mask) + value`.
    ///
    /// Returns `false` without touching anything when `dimension` is out of
    /// range.
    pub fn accumulate(&self, dimension: usize, value: Fixed) -> bool {
        let Some(cell) = self.cells.get(dimension) else {
            return false;
        };
        let mask = self.mask;
        // The closure always returns Some, so this cannot fail
        let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let current = mask_bits(Fixed::from_bits(bits), mask);
            Some(current.saturating_add(value).to_bits())
        });
        true
    }

    /// Current (not yet consumed) value of one cell.
    pub fn peek(&self, dimension: usize) -> Fixed {
        self.cells
            .get(dimension)
            .map(|c| Fixed::from_bits(c.load(Ordering::Acquire)))
            .unwrap_or(Fixed::ZERO)
    }

    #[inline]
    fn take(&self, dimension: usize) -> Fixed {
        Fixed::from_bits(self.cells[dimension].swap(0, Ordering::AcqRel))
    }
}

/// One named filter over D input dimensions.
#[derive(Debug)]
pub struct FilterBuffer {
    accumulator: Arc<SharedAccumulator>,
    filtered: Vec<Fixed>,
    decay: Fixed,
    one_minus_decay: Fixed,
}

impl FilterBuffer {
    pub fn new(n_dimensions: usize, params: &FilterParameters) -> Result<Self, EnsembleError> {
        Ok(Self {
            accumulator: Arc::new(SharedAccumulator::new(
                n_dimensions,
                params.accumulator_mask,
            )?),
            filtered: try_alloc("filtered input", n_dimensions, Fixed::ZERO)?,
            decay: params.decay,
            one_minus_decay: params.one_minus_decay(),
        })
    }

    pub fn n_dimensions(&self) -> usize {
        self.filtered.len()
    }

    pub fn decay(&self) -> Fixed {
        self.decay
    }

    pub fn one_minus_decay(&self) -> Fixed {
        self.one_minus_decay
    }

    /// Handle for the receive path.
    pub fn accumulator(&self) -> Arc<SharedAccumulator> {
        Arc::clone(&self.accumulator)
    }

    pub fn accumulate(&self, dimension: usize, value: Fixed) -> bool {
        self.accumulator.accumulate(dimension, value)
    }

    pub fn filtered(&self) -> &[Fixed] {
        &self.filtered
    }

    /// Advance the low-pass by one tick and zero the accumulator.
    ///
    /// This is the only place accumulator contributions are consumed.
    pub fn step(&mut self) {
        for (d, filtered) in self.filtered.iter_mut().enumerate() {
            let input = self.accumulator.take(d);
            *filtered = filtered
                .saturating_mul(self.decay)
                .saturating_add(input.saturating_mul(self.one_minus_decay));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(decay: f64) -> FilterParameters {
        FilterParameters::new(Fixed::from_num(decay), u32::MAX)
    }

    #[test]
    fn test_step_without_filtering_passes_input_through() {
        let mut buffer = FilterBuffer::new(2, &params(0.0)).unwrap();
        buffer.accumulate(0, Fixed::from_num(0.25));
        buffer.accumulate(0, Fixed::from_num(0.5));
        buffer.accumulate(1, Fixed::from_num(-1));
        buffer.step();
        assert_eq!(buffer.filtered(), &[Fixed::from_num(0.75), Fixed::from_num(-1)]);
        assert_eq!(buffer.accumulator.peek(0), Fixed::ZERO);
        assert_eq!(buffer.accumulator.peek(1), Fixed::ZERO);
    }

    #[test]
    fn test_step_blends_with_decay() {
        let mut buffer = FilterBuffer::new(1, &params(0.5)).unwrap();
        buffer.accumulate(0, Fixed::ONE);
        buffer.step();
        assert_eq!(buffer.filtered()[0], Fixed::from_num(0.5));
        buffer.accumulate(0, Fixed::ONE);
        buffer.step();
        assert_eq!(buffer.filtered()[0], Fixed::from_num(0.75));
    }

    #[test]
    fn test_latching_mask_keeps_latest_value() {
        let latching = FilterParameters::new(Fixed::ZERO, 0);
        let mut buffer = FilterBuffer::new(1, &latching).unwrap();
        buffer.accumulate(0, Fixed::from_num(3));
        buffer.accumulate(0, Fixed::from_num(2));
        buffer.step();
        assert_eq!(buffer.filtered()[0], Fixed::from_num(2));
    }

    #[test]
    fn test_out_of_range_dimension_is_rejected() {
        let buffer = FilterBuffer::new(1, &params(0.0)).unwrap();
        assert!(!buffer.accumulate(1, Fixed::ONE));
        assert_eq!(buffer.accumulator.peek(0), Fixed::ZERO);
    }
}
