//! The virtual core: one ensemble, its sources, a fabric and a timer.
//!
//! In deterministic mode every packet of tick `t` is delivered before tick
//! `t` runs, in an order shuffled by a seeded ChaCha generator, so a run is
//! reproducible from its seed. In concurrent mode a delivery thread pushes
//! each tick's packets through a cloned receive handle while the main
//! thread is ticking, so packets land on either side of a filter step.

use std::sync::mpsc;
use std::thread;

use nef_core::{Ensemble, TickStatus};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::fabric::Fabric;
use crate::probe::Probe;
use crate::scenario::{DeliveryMode, RunConfig, Scenario, ScenarioError};
use crate::source::{tick_packets, ValueSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub mode: DeliveryMode,
    pub ticks: u32,
    /// The ensemble reached its own tick limit
    pub halted: bool,
    pub spikes: u64,
    /// Mean firing rate across the ensemble
    pub mean_rate_hz: f64,
    pub packets_delivered: u64,
    pub packets_sent: u64,
    pub routing_misses: u32,
    pub pause_us: u64,
}

#[derive(Debug, Default)]
struct Totals {
    spikes: u64,
    packets_sent: u64,
    halted: bool,
}

pub struct VirtualCore {
    ensemble: Ensemble,
    sources: Vec<ValueSource>,
    run: RunConfig,
    dt: f64,
    fabric: Fabric,
    probe: Probe,
}

impl VirtualCore {
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let dt = scenario.dt();
        Ok(Self {
            ensemble: Ensemble::new(&scenario.ensemble)?,
            sources: scenario
                .sources
                .iter()
                .map(|s| ValueSource::new(s, dt))
                .collect(),
            run: scenario.run.clone(),
            dt,
            fabric: Fabric::new(),
            probe: Probe::new(),
        })
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn run(&mut self) -> RunSummary {
        info!(
            mode = ?self.run.mode,
            ticks = self.run.ticks,
            seed = self.run.seed,
            sources = self.sources.len(),
            "Starting virtual core"
        );
        let (delivered, totals) = match self.run.mode {
            DeliveryMode::Deterministic => self.run_deterministic(),
            DeliveryMode::Concurrent => self.run_concurrent(),
        };

        let ticks = self.ensemble.ticks();
        let neuron_seconds = self.ensemble.params().n_neurons as f64 * ticks as f64 * self.dt;
        let summary = RunSummary {
            mode: self.run.mode,
            ticks,
            halted: totals.halted,
            spikes: totals.spikes,
            mean_rate_hz: if neuron_seconds > 0.0 {
                totals.spikes as f64 / neuron_seconds
            } else {
                0.0
            },
            packets_delivered: delivered,
            packets_sent: totals.packets_sent,
            routing_misses: self.ensemble.routing_misses(),
            pause_us: self.fabric.total_pause_us(),
        };
        info!(
            ticks = summary.ticks,
            spikes = summary.spikes,
            rate_hz = summary.mean_rate_hz,
            misses = summary.routing_misses,
            "Run complete"
        );
        summary
    }

    fn run_deterministic(&mut self) -> (u64, Totals) {
        let mut rng = ChaCha20Rng::seed_from_u64(self.run.seed);
        let receiver = self.ensemble.receiver();
        let mut totals = Totals::default();
        let mut delivered = 0u64;

        for tick in 0..self.run.ticks {
            let mut packets = tick_packets(&self.sources, tick);
            packets.shuffle(&mut rng);
            for packet in &packets {
                // Misses are logged and counted by the receiver
                let _ = receiver.receive(packet.key, packet.payload);
            }
            delivered += packets.len() as u64;

            if !advance(
                &mut self.ensemble,
                &mut self.fabric,
                &mut self.probe,
                tick,
                &mut totals,
            ) {
                break;
            }
        }
        (delivered, totals)
    }

    fn run_concurrent(&mut self) -> (u64, Totals) {
        let Self {
            ensemble,
            sources,
            run,
            fabric,
            probe,
            ..
        } = self;
        let receiver = ensemble.receiver();
        let sources: &[ValueSource] = sources;

        thread::scope(|scope| {
            let (ticks_tx, ticks_rx) = mpsc::sync_channel::<u32>(1);
            let delivery = scope.spawn(move || {
                let mut delivered = 0u64;
                for tick in ticks_rx {
                    for packet in tick_packets(sources, tick) {
                        let _ = receiver.receive(packet.key, packet.payload);
                        delivered += 1;
                    }
                }
                delivered
            });

            let mut totals = Totals::default();
            for tick in 0..run.ticks {
                if ticks_tx.send(tick).is_err() {
                    error!(tick, "Delivery thread stopped early");
                    break;
                }
                if !advance(ensemble, fabric, probe, tick, &mut totals) {
                    break;
                }
            }
            drop(ticks_tx);

            let delivered = delivery.join().unwrap_or_else(|_| {
                error!("Delivery thread panicked");
                0
            });
            (delivered, totals)
        })
    }
}

/// Run one tick. Returns `false` once the ensemble will not tick again.
fn advance(
    ensemble: &mut Ensemble,
    fabric: &mut Fabric,
    probe: &mut Probe,
    tick: u32,
    totals: &mut Totals,
) -> bool {
    fabric.set_tick(tick);
    let report = ensemble.tick(fabric);
    if report.status == TickStatus::Halted {
        totals.halted = true;
        return false;
    }

    probe.record(tick, ensemble);
    totals.spikes += report.spikes as u64;
    totals.packets_sent += report.packets_sent as u64;
    debug!(tick, spikes = report.spikes, packets = report.packets_sent, "Tick");

    if report.status == TickStatus::HaltRequested {
        info!(tick, "Ensemble reached its tick limit");
        totals.halted = true;
        return false;
    }
    true
}
