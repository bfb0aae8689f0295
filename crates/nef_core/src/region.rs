//! Start-of-day memory regions.
//!
//! The host writes an ensemble's configuration as a set of regions of
//! little-endian 32-bit words. Fixed-point values are stored as their raw
//! bits, exactly as they travel in packet payloads.
//!
//! | Region | Words |
//! |--------|-------|
//! | system | `D_in, D_out, N, machine_timestep_us, t_ref, dt_over_tau_rc, record_spikes, D_inhib, simulation_ticks, pacing, interpacket_pause_us` |
//! | bias | `N` |
//! | encoders | `N * D_in`, row-major |
//! | decoders | `N * D_out`, row-major |
//! | keys | `D_out` |
//! | filters | `n_filters, n_dimensions`, then `decay, one_minus_decay, accumulator_mask` per filter |
//! | routes | `n_routes`, then `key, mask, filter_index, dimension_mask` per route |
//! | inhibitory gains | `N` (only when `D_inhib > 0`) |
//! | PES | `learning_rate, error_filter_index, decoder_output_offset, activity_decay` |
//!
//! Each input channel (standard, inhibition, modulatory) has its own
//! filters and routes region.
//!
//! `simulation_ticks == u32::MAX` runs forever and `activity_decay ==
//! u32::MAX` selects spike-triggered PES. The stored `one_minus_decay` is
//! not trusted; it is recomputed from `decay`.

use alloc::vec::Vec;
use core::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::config::{
    EnsembleConfig, EnsembleParameters, FilterParameters, InhibitionConfig, InputChannelConfig,
    PacingStrategy, PesConfig,
};
use crate::error::EnsembleError;
use crate::numeric::{decode_payload, encode_payload, Fixed};
use crate::router::RouteEntry;

const WORD: usize = 4;
const SYSTEM_WORDS: usize = 11;
const FOREVER: u32 = u32::MAX;
const NO_ACTIVITY_TRACE: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// A region ended before all the words it must hold.
    Truncated {
        region: &'static str,
        needed: usize,
        available: usize,
    },
    /// A word holds a value with no meaning for its field.
    InvalidValue {
        region: &'static str,
        field: &'static str,
        value: u32,
    },
    /// A region the system parameters call for was not supplied.
    Missing { region: &'static str },
    /// A value does not fit in its 32-bit word.
    Oversized {
        region: &'static str,
        field: &'static str,
        value: usize,
    },
    /// The decoded configuration failed validation.
    Config(EnsembleError),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::Truncated {
                region,
                needed,
                available,
            } => write!(
                f,
                "{} region truncated: needs {} bytes, has {}",
                region, needed, available
            ),
            RegionError::InvalidValue {
                region,
                field,
                value,
            } => write!(f, "{} region: invalid {} {:#x}", region, field, value),
            RegionError::Missing { region } => write!(f, "{} region missing", region),
            RegionError::Oversized {
                region,
                field,
                value,
            } => write!(f, "{} region: {} {} does not fit in a word", region, field, value),
            RegionError::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegionError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnsembleError> for RegionError {
    fn from(e: EnsembleError) -> Self {
        RegionError::Config(e)
    }
}

/// Filters and routes of one input channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelRegions<'a> {
    pub filters: &'a [u8],
    pub routes: &'a [u8],
}

/// Borrowed view of every region of one core.
#[derive(Debug, Clone, Copy, Default)]
pub struct Regions<'a> {
    pub system: &'a [u8],
    pub bias: &'a [u8],
    pub encoders: &'a [u8],
    pub decoders: &'a [u8],
    pub keys: &'a [u8],
    pub input: ChannelRegions<'a>,
    pub inhibitory_gains: &'a [u8],
    pub inhibition: ChannelRegions<'a>,
    pub modulatory: Option<ChannelRegions<'a>>,
    pub pes: Option<&'a [u8]>,
}

/// Sequential word reader over one region.
struct Words<'a> {
    region: &'static str,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Words<'a> {
    fn new(region: &'static str, bytes: &'a [u8]) -> Self {
        Self {
            region,
            bytes,
            offset: 0,
        }
    }

    fn ensure(&self, n_words: usize) -> Result<(), RegionError> {
        let needed = n_words
            .checked_mul(WORD)
            .and_then(|n| n.checked_add(self.offset))
            .unwrap_or(usize::MAX);
        if needed > self.bytes.len() {
            return Err(RegionError::Truncated {
                region: self.region,
                needed,
                available: self.bytes.len(),
            });
        }
        Ok(())
    }

    fn u32(&mut self) -> Result<u32, RegionError> {
        self.ensure(1)?;
        let v = LittleEndian::read_u32(&self.bytes[self.offset..]);
        self.offset += WORD;
        Ok(v)
    }

    fn usize(&mut self) -> Result<usize, RegionError> {
        self.u32().map(|v| v as usize)
    }

    fn fixed(&mut self) -> Result<Fixed, RegionError> {
        self.u32().map(decode_payload)
    }

    fn fixed_vec(&mut self, n: usize) -> Result<Vec<Fixed>, RegionError> {
        self.ensure(n)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.fixed()?);
        }
        Ok(out)
    }

    fn u32_vec(&mut self, n: usize) -> Result<Vec<u32>, RegionError> {
        self.ensure(n)?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.u32()?);
        }
        Ok(out)
    }

    fn invalid(&self, field: &'static str, value: u32) -> RegionError {
        RegionError::InvalidValue {
            region: self.region,
            field,
            value,
        }
    }
}

fn read_system(bytes: &[u8]) -> Result<(EnsembleParameters, usize, PacingStrategy, u32), RegionError> {
    let mut w = Words::new("system", bytes);
    w.ensure(SYSTEM_WORDS)?;
    let n_input_dimensions = w.usize()?;
    let n_output_dimensions = w.usize()?;
    let n_neurons = w.usize()?;
    let machine_timestep_us = w.u32()?;
    let t_ref = w.u32()?;
    let dt_over_tau_rc = w.fixed()?;
    let record_spikes = match w.u32()? {
        0 => false,
        1 => true,
        other => return Err(w.invalid("record_spikes", other)),
    };
    let n_inhibitory_dimensions = w.usize()?;
    let simulation_ticks = match w.u32()? {
        FOREVER => None,
        ticks => Some(ticks),
    };
    let pacing = match w.u32()? {
        0 => PacingStrategy::Interleaved,
        1 => PacingStrategy::Burst,
        other => return Err(w.invalid("pacing", other)),
    };
    let interpacket_pause_us = w.u32()?;

    let params = EnsembleParameters {
        n_neurons,
        n_input_dimensions,
        n_output_dimensions,
        machine_timestep_us,
        t_ref,
        dt_over_tau_rc,
        record_spikes,
        simulation_ticks,
    };
    Ok((params, n_inhibitory_dimensions, pacing, interpacket_pause_us))
}

fn read_channel(
    name: &'static str,
    regions: &ChannelRegions<'_>,
) -> Result<InputChannelConfig, RegionError> {
    let mut w = Words::new(name, regions.filters);
    let n_filters = w.usize()?;
    let mut channel = InputChannelConfig::new(w.usize()?);
    w.ensure(n_filters.saturating_mul(3))?;
    for _ in 0..n_filters {
        let decay = w.fixed()?;
        let _one_minus_decay = w.fixed()?;
        let mask = w.u32()?;
        channel = channel.with_filter(FilterParameters::new(decay, mask));
    }

    let mut w = Words::new(name, regions.routes);
    let n_routes = w.usize()?;
    w.ensure(n_routes.saturating_mul(4))?;
    for _ in 0..n_routes {
        let key = w.u32()?;
        let mask = w.u32()?;
        let filter_index = w.usize()?;
        let dimension_mask = w.u32()?;
        channel = channel.with_route(RouteEntry::new(key, mask, filter_index, dimension_mask));
    }
    Ok(channel)
}

fn read_pes(bytes: &[u8]) -> Result<PesConfig, RegionError> {
    let mut w = Words::new("pes", bytes);
    w.ensure(4)?;
    let learning_rate = w.fixed()?;
    let error_filter_index = w.usize()?;
    let decoder_output_offset = w.usize()?;
    let activity_decay = match w.u32()? {
        NO_ACTIVITY_TRACE => None,
        bits => Some(decode_payload(bits)),
    };
    Ok(PesConfig {
        learning_rate,
        error_filter_index,
        decoder_output_offset,
        activity_decay,
    })
}

/// Decode and validate a full configuration.
pub fn load(regions: &Regions<'_>) -> Result<EnsembleConfig, RegionError> {
    let (params, n_inhibitory_dimensions, pacing, interpacket_pause_us) =
        read_system(regions.system)?;
    let n = params.n_neurons;

    let bias = Words::new("bias", regions.bias).fixed_vec(n)?;
    let encoders = Words::new("encoders", regions.encoders)
        .fixed_vec(n.saturating_mul(params.n_input_dimensions))?;
    let decoders = Words::new("decoders", regions.decoders)
        .fixed_vec(n.saturating_mul(params.n_output_dimensions))?;
    let output_keys = Words::new("keys", regions.keys).u32_vec(params.n_output_dimensions)?;
    let input = read_channel("input", &regions.input)?;

    let inhibition = if n_inhibitory_dimensions > 0 {
        let channel = read_channel("inhibition", &regions.inhibition)?;
        if channel.n_dimensions != n_inhibitory_dimensions {
            return Err(RegionError::InvalidValue {
                region: "inhibition",
                field: "n_dimensions",
                value: channel.n_dimensions as u32,
            });
        }
        Some(InhibitionConfig {
            channel,
            gains: Words::new("inhibitory gains", regions.inhibitory_gains).fixed_vec(n)?,
        })
    } else {
        None
    };

    let pes = regions.pes.map(read_pes).transpose()?;
    let modulatory = match (&pes, regions.modulatory) {
        (Some(_), None) => return Err(RegionError::Missing { region: "modulatory" }),
        (_, Some(m)) => Some(read_channel("modulatory", &m)?),
        (None, None) => None,
    };

    let mut cfg = EnsembleConfig::new(params, bias, encoders, decoders, output_keys)
        .with_input(input)
        .with_pacing(pacing, interpacket_pause_us);
    cfg.inhibition = inhibition;
    cfg.modulatory = modulatory;
    cfg.pes = pes;

    cfg.validate()?;
    Ok(cfg)
}

/// Owned region images built from a configuration on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionImage {
    pub system: Vec<u8>,
    pub bias: Vec<u8>,
    pub encoders: Vec<u8>,
    pub decoders: Vec<u8>,
    pub keys: Vec<u8>,
    pub input_filters: Vec<u8>,
    pub input_routes: Vec<u8>,
    pub inhibitory_gains: Vec<u8>,
    pub inhibition_filters: Vec<u8>,
    pub inhibition_routes: Vec<u8>,
    pub modulatory_filters: Option<Vec<u8>>,
    pub modulatory_routes: Option<Vec<u8>>,
    pub pes: Option<Vec<u8>>,
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = alloc::vec![0u8; words.len() * WORD];
    LittleEndian::write_u32_into(words, &mut bytes);
    bytes
}

fn word(region: &'static str, field: &'static str, value: usize) -> Result<u32, RegionError> {
    u32::try_from(value).map_err(|_| RegionError::Oversized {
        region,
        field,
        value,
    })
}

fn fixed_words(values: &[Fixed]) -> Vec<u8> {
    let words: Vec<u32> = values.iter().map(|v| encode_payload(*v)).collect();
    words_to_bytes(&words)
}

fn filter_words(region: &'static str, channel: &InputChannelConfig) -> Result<Vec<u8>, RegionError> {
    let mut words = alloc::vec![
        word(region, "n_filters", channel.filters.len())?,
        word(region, "n_dimensions", channel.n_dimensions)?,
    ];
    for f in &channel.filters {
        words.push(encode_payload(f.decay));
        words.push(encode_payload(f.one_minus_decay()));
        words.push(f.accumulator_mask);
    }
    Ok(words_to_bytes(&words))
}

fn route_words(region: &'static str, routes: &[RouteEntry]) -> Result<Vec<u8>, RegionError> {
    let mut words = alloc::vec![word(region, "n_routes", routes.len())?];
    for r in routes {
        words.extend_from_slice(&[
            r.key,
            r.mask,
            word(region, "filter_index", r.filter_index)?,
            r.dimension_mask,
        ]);
    }
    Ok(words_to_bytes(&words))
}

impl RegionImage {
    /// Pack a configuration. It is validated first, so only configurations
    /// [`load`] would accept can be written.
    pub fn from_config(cfg: &EnsembleConfig) -> Result<Self, RegionError> {
        cfg.validate()?;
        let p = &cfg.params;
        let simulation_ticks = match p.simulation_ticks {
            Some(FOREVER) => {
                return Err(RegionError::InvalidValue {
                    region: "system",
                    field: "simulation_ticks",
                    value: FOREVER,
                })
            }
            Some(ticks) => ticks,
            None => FOREVER,
        };
        let n_inhibitory_dimensions = match &cfg.inhibition {
            Some(i) => word("system", "n_inhibitory_dimensions", i.channel.n_dimensions)?,
            None => 0,
        };
        let system = [
            word("system", "n_input_dimensions", p.n_input_dimensions)?,
            word("system", "n_output_dimensions", p.n_output_dimensions)?,
            word("system", "n_neurons", p.n_neurons)?,
            p.machine_timestep_us,
            p.t_ref,
            encode_payload(p.dt_over_tau_rc),
            p.record_spikes as u32,
            n_inhibitory_dimensions,
            simulation_ticks,
            match cfg.pacing {
                PacingStrategy::Interleaved => 0,
                PacingStrategy::Burst => 1,
            },
            cfg.interpacket_pause_us,
        ];

        let mut image = Self {
            system: words_to_bytes(&system),
            bias: fixed_words(&cfg.bias),
            encoders: fixed_words(&cfg.encoders),
            decoders: fixed_words(&cfg.decoders),
            keys: words_to_bytes(&cfg.output_keys),
            input_filters: filter_words("input", &cfg.input)?,
            input_routes: route_words("input", &cfg.input.routes)?,
            ..Self::default()
        };

        if let Some(inh) = &cfg.inhibition {
            image.inhibitory_gains = fixed_words(&inh.gains);
            image.inhibition_filters = filter_words("inhibition", &inh.channel)?;
            image.inhibition_routes = route_words("inhibition", &inh.channel.routes)?;
        }
        if let Some(m) = &cfg.modulatory {
            image.modulatory_filters = Some(filter_words("modulatory", m)?);
            image.modulatory_routes = Some(route_words("modulatory", &m.routes)?);
        }
        if let Some(pes) = &cfg.pes {
            let activity = pes.activity_decay.map_or(NO_ACTIVITY_TRACE, encode_payload);
            image.pes = Some(words_to_bytes(&[
                encode_payload(pes.learning_rate),
                word("pes", "error_filter_index", pes.error_filter_index)?,
                word("pes", "decoder_output_offset", pes.decoder_output_offset)?,
                activity,
            ]));
        }
        Ok(image)
    }

    pub fn regions(&self) -> Regions<'_> {
        Regions {
            system: &self.system,
            bias: &self.bias,
            encoders: &self.encoders,
            decoders: &self.decoders,
            keys: &self.keys,
            input: ChannelRegions {
                filters: &self.input_filters,
                routes: &self.input_routes,
            },
            inhibitory_gains: &self.inhibitory_gains,
            inhibition: ChannelRegions {
                filters: &self.inhibition_filters,
                routes: &self.inhibition_routes,
            },
            modulatory: match (&self.modulatory_filters, &self.modulatory_routes) {
                (Some(filters), Some(routes)) => Some(ChannelRegions { filters, routes }),
                _ => None,
            },
            pes: self.pes.as_deref(),
        }
    }
}
