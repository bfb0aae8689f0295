//! Deterministic runtime for a single neuromorphic core simulating an
//! ensemble of Leaky-Integrate-and-Fire neurons.
//!
//! Each core receives partial dimension values as multicast packets, low-pass
//! filters them, encodes the filtered vector into membrane current, integrates
//! the neurons once per timer tick and transmits the decoded output vector
//! back onto the fabric.
//!
//! Design constraints:
//! - No std: all types use core::* and alloc
//! - Fixed-point math: I16F16 everywhere a value crosses the wire
//! - No globals: every piece of state lives in an [`Ensemble`] context

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod config;
pub mod ensemble;
pub mod error;
pub mod filter;
pub mod input;
pub mod lfsr;
pub mod neuron;
pub mod numeric;
pub mod output;
pub mod pes;
pub mod recording;
pub mod region;
pub mod router;

pub use config::{
    EnsembleConfig, EnsembleParameters, FilterParameters, InhibitionConfig, InputChannelConfig,
    PacingStrategy, PesConfig,
};
pub use ensemble::{Ensemble, TickReport, TickStatus};
pub use error::{EnsembleError, RoutingMiss};
pub use input::{ChannelKind, Delivery, EnsembleReceiver};
pub use neuron::NeuronState;
pub use numeric::{decode_payload, encode_payload, Fixed};
pub use output::{McPacket, PacketSink};
pub use region::{RegionError, RegionImage, Regions};
pub use router::RouteEntry;
