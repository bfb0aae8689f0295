//! Shared pseudo-random source for refractory perturbation.
//!
//! A spike that crosses threshold early within a tick should leave the
//! refractory state a tick sooner than one that crosses late. The sub-tick
//! crossing time is not tracked, so a 15-bit LFSR sample stands in for it.
//! One generator is shared by the whole ensemble and advanced once per spike,
//! in neuron order, which keeps output bit-reproducible for a given input
//! trace and seed.

use crate::numeric::{fraction_from_u15, Fixed};

/// Feedback taps of the maximal-length sequence.
pub const LFSR_TAPS: u32 = 0xB400;

/// Seed used at start of day.
pub const LFSR_SEED: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lfsr {
    state: u32,
}

impl Default for Lfsr {
    fn default() -> Self {
        Self::new(LFSR_SEED)
    }
}

impl Lfsr {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Current 15-bit sample as a fraction in [0, 1).
    #[inline]
    pub fn sample(&self) -> Fixed {
        fraction_from_u15(self.state)
    }

    #[inline]
    pub fn advance(&mut self) {
        self.state = (self.state >> 1) ^ (!self.state & LFSR_TAPS);
    }

    /// Whether a spike with membrane step `v_delta` that reached `v_spike`
    /// happened early enough in the tick to shorten the refractory period.
    ///
    /// Reads the current sample and advances the generator.
    #[inline]
    pub fn spiked_early(&mut self, v_delta: Fixed, v_spike: Fixed) -> bool {
        let early = self.sample().saturating_mul(v_delta) < v_spike - Fixed::ONE;
        self.advance();
        early
    }
}
