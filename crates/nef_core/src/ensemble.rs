//! The per-core ensemble context and its timer tick.
//!
//! [`Ensemble`] owns every buffer the core uses. It is built once from a
//! validated [`EnsembleConfig`] and then driven by calling [`Ensemble::tick`]
//! once per machine timestep. Packets arrive through the
//! [`EnsembleReceiver`] handle returned by [`Ensemble::receiver`], which may
//! be used from another thread while ticks run.
//!
//! One tick:
//! 1. Halt check against the configured tick limit
//! 2. Step every filter of every input channel
//! 3. Update neurons `0..N` in order, transmitting output as paced
//! 4. Flush outstanding output, apply end-of-tick learning, record spikes

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::config::{EnsembleConfig, EnsembleParameters};
use crate::error::{try_alloc, EnsembleError};
use crate::input::{ChannelKind, EnsembleReceiver, InputChannel};
use crate::lfsr::Lfsr;
use crate::neuron::{NeuronBank, NeuronState};
use crate::numeric::Fixed;
use crate::output::{OutputPacer, PacketSink};
use crate::pes::Pes;
use crate::recording::SpikeRecorder;

/// Outcome of one call to [`Ensemble::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// The tick ran and more ticks are expected.
    Continue,
    /// The tick ran and was the last one; the host should stop its timer.
    HaltRequested,
    /// Nothing ran: the tick limit had already been reached.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Ticks processed so far, including this one
    pub tick: u32,
    pub spikes: u32,
    pub packets_sent: usize,
    pub status: TickStatus,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tick[{}] spikes={} packets={} {:?}",
            self.tick, self.spikes, self.packets_sent, self.status
        )
    }
}

#[derive(Debug)]
struct Inhibition {
    channel: InputChannel,
    gains: Vec<Fixed>,
}

pub struct Ensemble {
    params: EnsembleParameters,
    bank: NeuronBank,
    input: InputChannel,
    inhibition: Option<Inhibition>,
    modulatory: Option<InputChannel>,
    pes: Option<Pes>,
    lfsr: Lfsr,
    output: OutputPacer,
    recorder: SpikeRecorder,
    receiver: EnsembleReceiver,
    ticks: u32,
    halted: bool,
}

impl Ensemble {
    /// Validate `cfg` and allocate every buffer. No ticks can run if this
    /// fails.
    pub fn new(cfg: &EnsembleConfig) -> Result<Self, EnsembleError> {
        cfg.validate()?;
        let p = &cfg.params;

        let bank = NeuronBank::new(cfg)?;
        let input = InputChannel::new(&cfg.input)?;

        let inhibition = match &cfg.inhibition {
            Some(inh) => {
                let mut gains = try_alloc("inhibitory gains", p.n_neurons, Fixed::ZERO)?;
                gains.copy_from_slice(&inh.gains);
                Some(Inhibition {
                    channel: InputChannel::new(&inh.channel)?,
                    gains,
                })
            }
            None => None,
        };

        let modulatory = cfg
            .modulatory
            .as_ref()
            .map(InputChannel::new)
            .transpose()?;
        let pes = cfg
            .pes
            .as_ref()
            .map(|pes| Pes::new(pes, p.n_neurons))
            .transpose()?;

        let output = OutputPacer::new(
            cfg.pacing,
            cfg.interpacket_pause_us,
            p.n_neurons,
            &cfg.output_keys,
        )?;
        let recorder = SpikeRecorder::new(p.record_spikes, p.n_neurons, p.simulation_ticks)?;

        let mut channels = vec![(ChannelKind::Standard, input.receiver())];
        if let Some(inh) = &inhibition {
            channels.push((ChannelKind::Inhibition, inh.channel.receiver()));
        }
        if let Some(m) = &modulatory {
            channels.push((ChannelKind::Modulatory, m.receiver()));
        }

        log::info!(
            "[Ensemble] {} neurons, {} in, {} out, t_ref {}, dt/tau_rc {}, pacing {:?}",
            p.n_neurons,
            p.n_input_dimensions,
            p.n_output_dimensions,
            p.t_ref,
            p.dt_over_tau_rc,
            cfg.pacing
        );
        log::info!(
            "[Ensemble] input filters: {}, routes: {}, inhibition: {}, PES: {}",
            input.n_filters(),
            cfg.input.routes.len(),
            inhibition.is_some(),
            pes.is_some()
        );

        Ok(Self {
            params: p.clone(),
            bank,
            input,
            inhibition,
            modulatory,
            pes,
            lfsr: Lfsr::default(),
            output,
            recorder,
            receiver: EnsembleReceiver::new(channels),
            ticks: 0,
            halted: false,
        })
    }

    /// Packet-receive handle. Clones share the same accumulators and miss
    /// counter.
    pub fn receiver(&self) -> EnsembleReceiver {
        self.receiver.clone()
    }

    pub fn params(&self) -> &EnsembleParameters {
        &self.params
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn neuron(&self, n: usize) -> NeuronState {
        self.bank.state(n)
    }

    pub fn neurons(&self) -> &[NeuronState] {
        self.bank.states()
    }

    /// Current decoder matrix (row-major N x D_out), including PES updates.
    pub fn decoders(&self) -> &[Fixed] {
        self.bank.decoders()
    }

    /// Summed filtered standard input as of the last tick.
    pub fn input(&self) -> &[Fixed] {
        self.input.input()
    }

    pub fn input_channel(&self) -> &InputChannel {
        &self.input
    }

    pub fn modulatory_channel(&self) -> Option<&InputChannel> {
        self.modulatory.as_ref()
    }

    /// Output accumulated but not yet transmitted.
    pub fn pending_output(&self) -> &[Fixed] {
        self.output.values()
    }

    pub fn output_keys(&self) -> &[u32] {
        self.output.keys()
    }

    pub fn lfsr(&self) -> &Lfsr {
        &self.lfsr
    }

    pub fn pes(&self) -> Option<&Pes> {
        self.pes.as_ref()
    }

    pub fn recorder(&self) -> &SpikeRecorder {
        &self.recorder
    }

    pub fn routing_misses(&self) -> u32 {
        self.receiver.routing_misses()
    }

    fn limit_reached(&self) -> bool {
        self.params
            .simulation_ticks
            .map_or(false, |limit| self.ticks >= limit)
    }

    /// Run one timer tick, sending output packets into `sink`.
    pub fn tick<S: PacketSink>(&mut self, sink: &mut S) -> TickReport {
        if self.halted || self.limit_reached() {
            self.halted = true;
            return TickReport {
                tick: self.ticks,
                spikes: 0,
                packets_sent: 0,
                status: TickStatus::Halted,
            };
        }
        self.ticks += 1;

        self.input.step();
        if let Some(inh) = &mut self.inhibition {
            inh.channel.step();
        }
        if let Some(m) = &mut self.modulatory {
            m.step();
        }

        self.recorder.prepare();
        self.output.begin_tick();

        let Self {
            params,
            bank,
            input,
            inhibition,
            modulatory,
            pes,
            lfsr,
            output,
            recorder,
            ..
        } = self;

        let error: &[Fixed] = match (pes.as_ref(), modulatory.as_ref()) {
            (Some(pes), Some(m)) => m
                .filter(pes.error_filter_index())
                .map(|f| f.filtered())
                .unwrap_or(&[]),
            _ => &[],
        };
        // Inhibitory dimensions are summed into a single scalar per tick
        let inhibitory = inhibition.as_ref().map(|inh| {
            inh.channel
                .input()
                .iter()
                .fold(Fixed::ZERO, |acc, x| acc.saturating_add(*x))
        });

        let mut spikes = 0u32;
        let mut packets_sent = 0usize;

        for n in 0..bank.n_neurons() {
            let mut spiked = false;
            let state = bank.state(n);

            if state.is_refractory() {
                bank.state_mut(n).refractory -= 1;
            } else {
                let mut current = bank.encode(n, input.input());
                if let (Some(inh), Some(level)) = (inhibition.as_ref(), inhibitory) {
                    current = current.saturating_add(inh.gains[n].saturating_mul(level));
                }

                let v_delta = current
                    .saturating_sub(state.voltage)
                    .saturating_mul(params.dt_over_tau_rc);
                let voltage = state.voltage.saturating_add(v_delta).max(Fixed::ZERO);

                if voltage > Fixed::ONE {
                    let mut refractory = params.t_ref;
                    if lfsr.spiked_early(v_delta, voltage) {
                        refractory = refractory.saturating_sub(1);
                    }
                    *bank.state_mut(n) = NeuronState {
                        refractory,
                        voltage: Fixed::ZERO,
                    };
                    recorder.record_spike(n);
                    output.accumulate(bank.decoder_row(n));
                    spiked = true;
                    spikes += 1;
                } else {
                    bank.state_mut(n).voltage = voltage;
                }
            }

            if let Some(pes) = pes.as_mut() {
                pes.neuron_updated(n, spiked, error, bank.decoder_row_mut(n));
            }
            packets_sent += output.after_neuron(n, sink);
        }

        packets_sent += output.end_tick(sink);

        if let Some(pes) = pes.as_ref() {
            let width = bank.n_output_dimensions();
            pes.end_tick(error, bank.decoders_mut(), width);
        }
        recorder.flush();

        let status = if self.limit_reached() {
            self.halted = true;
            TickStatus::HaltRequested
        } else {
            TickStatus::Continue
        };
        let report = TickReport {
            tick: self.ticks,
            spikes,
            packets_sent,
            status,
        };
        log::trace!("[Ensemble] {}", report);
        report
    }
}

impl fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ensemble")
            .field("n_neurons", &self.params.n_neurons)
            .field("ticks", &self.ticks)
            .field("halted", &self.halted)
            .finish()
    }
}
