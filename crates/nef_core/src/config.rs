use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
use clap::ValueEnum;

use crate::error::{checked_size, EnsembleError};
use crate::numeric::{serde_fixed, serde_fixed_opt, serde_fixed_vec, Fixed};
use crate::router::RouteEntry;

/// How decoded output leaves the core each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum PacingStrategy {
    /// Spread the output dimensions across the neuron loop.
    #[default]
    Interleaved,
    /// Send every dimension after the neuron loop, pausing between packets.
    Burst,
}

/// System region: scalar parameters shared by the whole ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParameters {
    pub n_neurons: usize,
    pub n_input_dimensions: usize,
    pub n_output_dimensions: usize,
    /// Wall-clock length of one tick in microseconds
    pub machine_timestep_us: u32,
    /// Refractory period in ticks
    pub t_ref: u32,
    /// Euler step factor `dt / tau_rc`
    #[serde(with = "serde_fixed")]
    pub dt_over_tau_rc: Fixed,
    #[serde(default)]
    pub record_spikes: bool,
    /// Stop after this many ticks; run forever when absent. Also sizes the
    /// spike recording region, so it is required when `record_spikes` is set
    #[serde(default)]
    pub simulation_ticks: Option<u32>,
}

impl EnsembleParameters {
    pub fn new(
        n_neurons: usize,
        n_input_dimensions: usize,
        n_output_dimensions: usize,
        t_ref: u32,
        dt_over_tau_rc: Fixed,
    ) -> Self {
        Self {
            n_neurons,
            n_input_dimensions,
            n_output_dimensions,
            machine_timestep_us: 1000,
            t_ref,
            dt_over_tau_rc,
            record_spikes: false,
            simulation_ticks: None,
        }
    }

    pub fn with_simulation_ticks(mut self, ticks: u32) -> Self {
        self.simulation_ticks = Some(ticks);
        self
    }

    pub fn with_record_spikes(mut self, record: bool) -> Self {
        self.record_spikes = record;
        self
    }
}

fn all_ones() -> u32 {
    u32::MAX
}

/// Decay and accumulator mask of one input filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    /// `exp(-dt / tau)`, computed host-side
    #[serde(with = "serde_fixed")]
    pub decay: Fixed,
    /// All ones sums packets within a tick; zero keeps only the latest one
    #[serde(default = "all_ones")]
    pub accumulator_mask: u32,
}

impl FilterParameters {
    pub fn new(decay: Fixed, accumulator_mask: u32) -> Self {
        Self {
            decay,
            accumulator_mask,
        }
    }

    /// Accumulating low-pass with time constant `tau` (seconds).
    pub fn lowpass(tau: f64, dt: f64) -> Self {
        Self::new(
            Fixed::from_num(crate::numeric::lowpass_decay(tau, dt)),
            u32::MAX,
        )
    }

    pub fn one_minus_decay(&self) -> Fixed {
        Fixed::ONE - self.decay
    }
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self::new(Fixed::ZERO, u32::MAX)
    }
}

/// A set of filters over the same dimensions plus the routes that feed them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputChannelConfig {
    pub n_dimensions: usize,
    #[serde(default)]
    pub filters: Vec<FilterParameters>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl InputChannelConfig {
    pub fn new(n_dimensions: usize) -> Self {
        Self {
            n_dimensions,
            filters: Vec::new(),
            routes: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: FilterParameters) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_route(mut self, route: RouteEntry) -> Self {
        self.routes.push(route);
        self
    }

    fn validate(&self, channel: &'static str) -> Result<(), EnsembleError> {
        for filter in &self.filters {
            if filter.decay < Fixed::ZERO || filter.decay > Fixed::ONE {
                return Err(EnsembleError::CoefficientOutOfRange {
                    field: "filter decay",
                });
            }
        }
        for route in &self.routes {
            if route.filter_index >= self.filters.len() {
                return Err(EnsembleError::FilterIndexOutOfRange {
                    channel,
                    index: route.filter_index,
                    n_filters: self.filters.len(),
                });
            }
        }
        Ok(())
    }
}

/// Global inhibition: a separate input channel scaled per neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InhibitionConfig {
    pub channel: InputChannelConfig,
    /// One gain per neuron, applied to the summed inhibitory input
    #[serde(with = "serde_fixed_vec")]
    pub gains: Vec<Fixed>,
}

/// PES decoder learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PesConfig {
    /// Learning rate, already scaled by dt
    #[serde(with = "serde_fixed")]
    pub learning_rate: Fixed,
    /// Filter of the modulatory channel holding the error signal
    pub error_filter_index: usize,
    /// First decoder column the error vector is applied to
    pub decoder_output_offset: usize,
    /// Decay of the per-neuron activity trace; learn on every spike when absent
    #[serde(
        default,
        with = "serde_fixed_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_decay: Option<Fixed>,
}

/// Everything the loader hands the core at start of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub params: EnsembleParameters,
    /// Bias current per neuron (N)
    #[serde(with = "serde_fixed_vec")]
    pub bias: Vec<Fixed>,
    /// Row-major N x D_in, gains folded in
    #[serde(with = "serde_fixed_vec")]
    pub encoders: Vec<Fixed>,
    /// Row-major N x D_out
    #[serde(with = "serde_fixed_vec")]
    pub decoders: Vec<Fixed>,
    /// Routing key per output dimension (D_out)
    pub output_keys: Vec<u32>,
    pub input: InputChannelConfig,
    #[serde(default)]
    pub inhibition: Option<InhibitionConfig>,
    #[serde(default)]
    pub modulatory: Option<InputChannelConfig>,
    #[serde(default)]
    pub pes: Option<PesConfig>,
    #[serde(default)]
    pub pacing: PacingStrategy,
    /// Pause after each packet of a burst
    #[serde(default)]
    pub interpacket_pause_us: u32,
}

impl EnsembleConfig {
    /// Configuration with a single unfiltered input filter and no routes.
    pub fn new(
        params: EnsembleParameters,
        bias: Vec<Fixed>,
        encoders: Vec<Fixed>,
        decoders: Vec<Fixed>,
        output_keys: Vec<u32>,
    ) -> Self {
        let input = InputChannelConfig::new(params.n_input_dimensions)
            .with_filter(FilterParameters::default());
        Self {
            params,
            bias,
            encoders,
            decoders,
            output_keys,
            input,
            inhibition: None,
            modulatory: None,
            pes: None,
            pacing: PacingStrategy::Interleaved,
            interpacket_pause_us: 0,
        }
    }

    pub fn with_input(mut self, input: InputChannelConfig) -> Self {
        self.input = input;
        self
    }

    pub fn with_inhibition(mut self, inhibition: InhibitionConfig) -> Self {
        self.inhibition = Some(inhibition);
        self
    }

    pub fn with_pes(mut self, modulatory: InputChannelConfig, pes: PesConfig) -> Self {
        self.modulatory = Some(modulatory);
        self.pes = Some(pes);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingStrategy, interpacket_pause_us: u32) -> Self {
        self.pacing = pacing;
        self.interpacket_pause_us = interpacket_pause_us;
        self
    }

    /// Check every count, length and coefficient before anything is allocated.
    pub fn validate(&self) -> Result<(), EnsembleError> {
        let p = &self.params;
        if p.n_neurons == 0 {
            return Err(EnsembleError::ZeroDimension { field: "n_neurons" });
        }
        if p.n_output_dimensions == 0 {
            return Err(EnsembleError::ZeroDimension {
                field: "n_output_dimensions",
            });
        }
        if p.dt_over_tau_rc <= Fixed::ZERO || p.dt_over_tau_rc > Fixed::ONE {
            return Err(EnsembleError::CoefficientOutOfRange {
                field: "dt_over_tau_rc",
            });
        }
        // The recording region holds one frame per tick
        if p.record_spikes && p.simulation_ticks.is_none() {
            return Err(EnsembleError::UnboundedRecording);
        }

        expect_len("bias", p.n_neurons, self.bias.len())?;
        expect_len(
            "encoders",
            checked_size("encoders", p.n_neurons, p.n_input_dimensions)?,
            self.encoders.len(),
        )?;
        expect_len(
            "decoders",
            checked_size("decoders", p.n_neurons, p.n_output_dimensions)?,
            self.decoders.len(),
        )?;
        expect_len("output_keys", p.n_output_dimensions, self.output_keys.len())?;

        expect_len(
            "input.n_dimensions",
            p.n_input_dimensions,
            self.input.n_dimensions,
        )?;
        self.input.validate("input")?;

        if let Some(inhibition) = &self.inhibition {
            inhibition.channel.validate("inhibition")?;
            expect_len("inhibition.gains", p.n_neurons, inhibition.gains.len())?;
        }

        if let Some(modulatory) = &self.modulatory {
            modulatory.validate("modulatory")?;
        }

        if let Some(pes) = &self.pes {
            let modulatory = self.modulatory.as_ref();
            let n_filters = modulatory.map_or(0, |m| m.filters.len());
            if pes.error_filter_index >= n_filters {
                return Err(EnsembleError::FilterIndexOutOfRange {
                    channel: "modulatory",
                    index: pes.error_filter_index,
                    n_filters,
                });
            }
            let width = modulatory.map_or(0, |m| m.n_dimensions);
            let end = pes.decoder_output_offset.checked_add(width);
            if end.map_or(true, |end| end > p.n_output_dimensions) {
                return Err(EnsembleError::PesOutOfRange {
                    offset: pes.decoder_output_offset,
                    width,
                    n_output_dimensions: p.n_output_dimensions,
                });
            }
            if let Some(decay) = pes.activity_decay {
                if decay < Fixed::ZERO || decay > Fixed::ONE {
                    return Err(EnsembleError::CoefficientOutOfRange {
                        field: "pes activity_decay",
                    });
                }
            }
        }

        Ok(())
    }
}

fn expect_len(field: &'static str, expected: usize, actual: usize) -> Result<(), EnsembleError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EnsembleError::LengthMismatch {
            field,
            expected,
            actual,
        })
    }
}
