//! Per-tick probes and their CSV / JSON writers.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use nef_core::Ensemble;
use serde::Serialize;
use thiserror::Error;

use crate::fabric::RecordedPacket;
use crate::runner::RunSummary;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpikeRow {
    pub tick: u32,
    pub neuron: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalRow {
    pub tick: u32,
    pub dimension: usize,
    pub value: f64,
}

/// Spike raster and filtered input trace of one run.
#[derive(Debug, Default)]
pub struct Probe {
    spikes: Vec<SpikeRow>,
    inputs: Vec<SignalRow>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the ensemble right after tick `tick` completed.
    pub fn record(&mut self, tick: u32, ensemble: &Ensemble) {
        let n_neurons = ensemble.params().n_neurons;
        for (w, word) in ensemble.recorder().current_frame().iter().enumerate() {
            let mut bits = *word;
            while bits != 0 {
                let neuron = w * 32 + bits.trailing_zeros() as usize;
                if neuron < n_neurons {
                    self.spikes.push(SpikeRow { tick, neuron });
                }
                bits &= bits - 1;
            }
        }
        for (dimension, value) in ensemble.input().iter().enumerate() {
            self.inputs.push(SignalRow {
                tick,
                dimension,
                value: value.to_num(),
            });
        }
    }

    pub fn spikes(&self) -> &[SpikeRow] {
        &self.spikes
    }

    pub fn inputs(&self) -> &[SignalRow] {
        &self.inputs
    }

    pub fn write_spikes(&self, path: &Path) -> Result<(), ProbeError> {
        write_rows(path, &self.spikes)
    }

    pub fn write_inputs(&self, path: &Path) -> Result<(), ProbeError> {
        write_rows(path, &self.inputs)
    }
}

/// Decoded output, one row per transmitted packet.
pub fn write_outputs(
    path: &Path,
    packets: &[RecordedPacket],
    output_keys: &[u32],
) -> Result<(), ProbeError> {
    let rows: Vec<SignalRow> = packets
        .iter()
        .filter_map(|p| {
            output_keys
                .iter()
                .position(|k| *k == p.key)
                .map(|dimension| SignalRow {
                    tick: p.tick,
                    dimension,
                    value: p.value,
                })
        })
        .collect();
    write_rows(path, &rows)
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), ProbeError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ProbeError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
