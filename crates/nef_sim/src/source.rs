//! Value sources: host-side stand-ins for the cores that would feed an
//! ensemble over the fabric.
//!
//! A source owns one waveform per dimension and emits one packet per
//! dimension per tick, keyed `base_key | d`.

use std::f64::consts::TAU;

use nef_core::{encode_payload, Fixed, McPacket};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waveform {
    Constant {
        value: f64,
    },
    Sine {
        amplitude: f64,
        frequency_hz: f64,
        #[serde(default)]
        phase: f64,
    },
    /// `before` until `at_tick`, `after` from then on.
    Step {
        before: f64,
        after: f64,
        at_tick: u32,
    },
}

impl Waveform {
    pub fn value(&self, tick: u32, dt: f64) -> f64 {
        match *self {
            Waveform::Constant { value } => value,
            Waveform::Sine {
                amplitude,
                frequency_hz,
                phase,
            } => amplitude * (TAU * frequency_hz * tick as f64 * dt + phase).sin(),
            Waveform::Step {
                before,
                after,
                at_tick,
            } => {
                if tick < at_tick {
                    before
                } else {
                    after
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_key: u32,
    pub waveforms: Vec<Waveform>,
}

#[derive(Debug, Clone)]
pub struct ValueSource {
    base_key: u32,
    waveforms: Vec<Waveform>,
    dt: f64,
}

impl ValueSource {
    pub fn new(cfg: &SourceConfig, dt: f64) -> Self {
        Self {
            base_key: cfg.base_key,
            waveforms: cfg.waveforms.clone(),
            dt,
        }
    }

    pub fn n_dimensions(&self) -> usize {
        self.waveforms.len()
    }

    /// Value of every dimension at `tick`, quantised as it would be on the wire.
    pub fn values(&self, tick: u32) -> impl Iterator<Item = Fixed> + '_ {
        self.waveforms
            .iter()
            .map(move |w| Fixed::saturating_from_num(w.value(tick, self.dt)))
    }

    pub fn packets(&self, tick: u32) -> impl Iterator<Item = McPacket> + '_ {
        self.values(tick)
            .enumerate()
            .map(move |(d, v)| McPacket::new(self.base_key | d as u32, encode_payload(v)))
    }
}

/// Every packet all sources emit for one tick, in source then dimension order.
pub fn tick_packets(sources: &[ValueSource], tick: u32) -> Vec<McPacket> {
    sources.iter().flat_map(|s| s.packets(tick)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nef_core::decode_payload;

    #[test]
    fn test_waveforms() {
        assert_eq!(Waveform::Constant { value: 0.3 }.value(99, 0.001), 0.3);

        let step = Waveform::Step {
            before: -1.0,
            after: 1.0,
            at_tick: 10,
        };
        assert_eq!(step.value(9, 0.001), -1.0);
        assert_eq!(step.value(10, 0.001), 1.0);

        let sine = Waveform::Sine {
            amplitude: 2.0,
            frequency_hz: 1.0,
            phase: 0.0,
        };
        assert!(sine.value(0, 0.001).abs() < 1e-12);
        // Quarter period at 1 Hz and 1 ms ticks
        assert!((sine.value(250, 0.001) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_packets_keyed_by_dimension() {
        let source = ValueSource::new(
            &SourceConfig {
                base_key: 0x1000,
                waveforms: vec![
                    Waveform::Constant { value: 0.5 },
                    Waveform::Constant { value: -0.25 },
                ],
            },
            0.001,
        );
        let packets: Vec<McPacket> = source.packets(0).collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].key, 0x1000);
        assert_eq!(packets[1].key, 0x1001);
        assert_eq!(decode_payload(packets[1].payload), Fixed::from_num(-0.25));
    }

    #[test]
    fn test_out_of_range_values_saturate() {
        let source = ValueSource::new(
            &SourceConfig {
                base_key: 0,
                waveforms: vec![Waveform::Constant { value: 1e9 }],
            },
            0.001,
        );
        assert_eq!(source.values(0).next(), Some(Fixed::MAX));
    }
}
