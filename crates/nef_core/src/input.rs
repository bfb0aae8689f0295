//! Input channels and the packet-receive path.
//!
//! An ensemble listens on up to three channels, each a set of filters over a
//! common dimension count with its own routing table:
//!
//! | Channel | Feeds |
//! |---------|-------|
//! | Standard | the encoders |
//! | Inhibition | a per-neuron gain, summed into membrane current |
//! | Modulatory | error signals for PES |
//!
//! The tick owns each [`InputChannel`]; the receive path only ever holds an
//! [`EnsembleReceiver`], which can be cloned into interrupt or thread context
//! because it touches nothing but the atomic accumulators.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::InputChannelConfig;
use crate::error::{try_alloc, EnsembleError, RoutingMiss};
use crate::filter::{FilterBuffer, SharedAccumulator};
use crate::numeric::Fixed;
use crate::router::InputRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Standard,
    Inhibition,
    Modulatory,
}

/// Receive-side view of one channel: routing table plus accumulators.
#[derive(Debug)]
pub struct ChannelReceiver {
    router: InputRouter,
    accumulators: Vec<Arc<SharedAccumulator>>,
    n_dimensions: usize,
}

impl ChannelReceiver {
    fn claims(&self, key: u32) -> bool {
        self.router.lookup(key).is_some()
    }

    /// Route a packet and add its value to the addressed accumulator.
    pub fn receive(&self, key: u32, payload: u32) -> Result<(usize, usize, Fixed), RoutingMiss> {
        let routed = self.router.route(key, payload)?;
        let accumulator = self
            .accumulators
            .get(routed.filter_index)
            .ok_or(RoutingMiss::NoRoute { key })?;
        if !accumulator.accumulate(routed.dimension, routed.value) {
            return Err(RoutingMiss::DimensionOutOfRange {
                key,
                dimension: routed.dimension,
                n_dimensions: self.n_dimensions,
            });
        }
        Ok((routed.filter_index, routed.dimension, routed.value))
    }
}

/// Filters of one channel and the summed filtered vector the tick reads.
#[derive(Debug)]
pub struct InputChannel {
    filters: Vec<FilterBuffer>,
    input: Vec<Fixed>,
    receiver: Arc<ChannelReceiver>,
}

impl InputChannel {
    pub fn new(cfg: &InputChannelConfig) -> Result<Self, EnsembleError> {
        let mut filters = Vec::new();
        filters
            .try_reserve_exact(cfg.filters.len())
            .map_err(|_| EnsembleError::AllocationFailure {
                buffer: "input filters",
                elements: cfg.filters.len(),
            })?;
        for params in &cfg.filters {
            filters.push(FilterBuffer::new(cfg.n_dimensions, params)?);
        }
        let receiver = Arc::new(ChannelReceiver {
            router: InputRouter::new(cfg.routes.clone()),
            accumulators: filters.iter().map(FilterBuffer::accumulator).collect(),
            n_dimensions: cfg.n_dimensions,
        });
        Ok(Self {
            filters,
            input: try_alloc("channel input", cfg.n_dimensions, Fixed::ZERO)?,
            receiver,
        })
    }

    pub fn n_dimensions(&self) -> usize {
        self.input.len()
    }

    pub fn n_filters(&self) -> usize {
        self.filters.len()
    }

    pub fn filter(&self, index: usize) -> Option<&FilterBuffer> {
        self.filters.get(index)
    }

    /// Sum of every filter's output as of the last step.
    pub fn input(&self) -> &[Fixed] {
        &self.input
    }

    pub fn receiver(&self) -> Arc<ChannelReceiver> {
        Arc::clone(&self.receiver)
    }

    /// Step every filter and rebuild the summed input.
    pub fn step(&mut self) {
        self.input.fill(Fixed::ZERO);
        for filter in &mut self.filters {
            filter.step();
            for (sum, value) in self.input.iter_mut().zip(filter.filtered()) {
                *sum = sum.saturating_add(*value);
            }
        }
    }
}

/// Where a packet ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub channel: ChannelKind,
    pub filter_index: usize,
    pub dimension: usize,
    pub value: Fixed,
}

/// Cloneable packet-receive handle for one ensemble.
///
/// Channels are tried in the order standard, inhibition, modulatory. The
/// first channel with a matching route owns the packet.
#[derive(Debug, Clone)]
pub struct EnsembleReceiver {
    channels: Vec<(ChannelKind, Arc<ChannelReceiver>)>,
    misses: Arc<AtomicU32>,
}

impl EnsembleReceiver {
    pub(crate) fn new(channels: Vec<(ChannelKind, Arc<ChannelReceiver>)>) -> Self {
        Self {
            channels,
            misses: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Multicast-packet handler. Misses are logged, counted and dropped.
    pub fn receive(&self, key: u32, payload: u32) -> Result<Delivery, RoutingMiss> {
        let result = match self.channels.iter().find(|(_, c)| c.claims(key)) {
            Some((kind, channel)) => {
                channel
                    .receive(key, payload)
                    .map(|(filter_index, dimension, value)| Delivery {
                        channel: *kind,
                        filter_index,
                        dimension,
                        value,
                    })
            }
            None => Err(RoutingMiss::NoRoute { key }),
        };
        if let Err(miss) = &result {
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::warn!("[Ensemble] dropped packet: {}", miss);
        }
        result
    }

    /// Packets dropped since start of day.
    pub fn routing_misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }
}
