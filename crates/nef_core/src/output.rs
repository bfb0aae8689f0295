//! Decoded output accumulation and pacing.
//!
//! Spiking neurons add their decoder rows into a D_out accumulator. Each
//! tick every dimension is transmitted exactly once, in ascending order, as
//! a multicast packet carrying the raw bits of the accumulated value, and is
//! zeroed as it is sent.
//!
//! With [`PacingStrategy::Interleaved`] dimension `d` goes out as soon as
//! neuron `floor((d + 1) * N / D_out) - 1` has been updated, so packets are
//! spread roughly every `N / D_out` neurons instead of bursting at the end
//! of the tick. With [`PacingStrategy::Burst`] all dimensions go out after
//! the neuron loop with a pause after each packet.

use alloc::vec::Vec;
use core::fmt;

use crate::config::PacingStrategy;
use crate::error::{try_alloc, EnsembleError};
use crate::numeric::{encode_payload, Fixed};

/// A multicast packet with payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct McPacket {
    pub key: u32,
    pub payload: u32,
}

impl McPacket {
    pub fn new(key: u32, payload: u32) -> Self {
        Self { key, payload }
    }
}

impl fmt::Display for McPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MC[{:08x}:{:08x}]", self.key, self.payload)
    }
}

/// The fabric side of the core: where outbound packets go.
pub trait PacketSink {
    fn send(&mut self, packet: McPacket);

    /// Busy-wait between packets of a burst. Sinks without admission
    /// limits may ignore it.
    fn pause_us(&mut self, _us: u32) {}
}

impl PacketSink for Vec<McPacket> {
    fn send(&mut self, packet: McPacket) {
        self.push(packet);
    }
}

#[derive(Clone, Debug)]
pub struct OutputPacer {
    strategy: PacingStrategy,
    interpacket_pause_us: u32,
    n_neurons: usize,
    keys: Vec<u32>,
    values: Vec<Fixed>,
    /// Next dimension to transmit within the current tick
    next_dimension: usize,
}

impl OutputPacer {
    pub fn new(
        strategy: PacingStrategy,
        interpacket_pause_us: u32,
        n_neurons: usize,
        keys: &[u32],
    ) -> Result<Self, EnsembleError> {
        if n_neurons == 0 {
            return Err(EnsembleError::ZeroDimension { field: "n_neurons" });
        }
        if keys.is_empty() {
            return Err(EnsembleError::ZeroDimension {
                field: "n_output_dimensions",
            });
        }
        let mut owned_keys = try_alloc("output keys", keys.len(), 0u32)?;
        owned_keys.copy_from_slice(keys);
        Ok(Self {
            strategy,
            interpacket_pause_us,
            n_neurons,
            values: try_alloc("output values", keys.len(), Fixed::ZERO)?,
            keys: owned_keys,
            next_dimension: 0,
        })
    }

    pub fn strategy(&self) -> PacingStrategy {
        self.strategy
    }

    pub fn n_dimensions(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    /// Values accumulated but not yet transmitted.
    pub fn values(&self) -> &[Fixed] {
        &self.values
    }

    /// Add a spiking neuron's decoder row.
    #[inline]
    pub fn accumulate(&mut self, decoder_row: &[Fixed]) {
        for (value, decoder) in self.values.iter_mut().zip(decoder_row) {
            *value = value.saturating_add(*decoder);
        }
    }

    pub fn begin_tick(&mut self) {
        self.next_dimension = 0;
    }

    /// Neuron after which dimension `d` is transmitted when interleaving.
    #[inline]
    fn slot(&self, d: usize) -> usize {
        ((d + 1) * self.n_neurons / self.keys.len()).saturating_sub(1)
    }

    /// Called after neuron `n` has been updated. Returns packets sent.
    #[inline]
    pub fn after_neuron<S: PacketSink>(&mut self, n: usize, sink: &mut S) -> usize {
        if self.strategy != PacingStrategy::Interleaved {
            return 0;
        }
        let mut sent = 0;
        while self.next_dimension < self.keys.len() && self.slot(self.next_dimension) <= n {
            self.transmit(self.next_dimension, sink);
            self.next_dimension += 1;
            sent += 1;
        }
        sent
    }

    /// Called after the neuron loop. Sends whatever is still owed this tick.
    pub fn end_tick<S: PacketSink>(&mut self, sink: &mut S) -> usize {
        let mut sent = 0;
        while self.next_dimension < self.keys.len() {
            self.transmit(self.next_dimension, sink);
            if self.strategy == PacingStrategy::Burst {
                sink.pause_us(self.interpacket_pause_us);
            }
            self.next_dimension += 1;
            sent += 1;
        }
        sent
    }

    #[inline]
    fn transmit<S: PacketSink>(&mut self, d: usize, sink: &mut S) {
        sink.send(McPacket::new(self.keys[d], encode_payload(self.values[d])));
        self.values[d] = Fixed::ZERO;
    }
}
