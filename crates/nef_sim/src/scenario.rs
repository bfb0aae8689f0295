use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use nef_core::{EnsembleConfig, EnsembleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SourceConfig;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialise scenario: {0}")]
    Serialise(#[from] toml::ser::Error),

    #[error("invalid ensemble: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("source {index}: {reason}")]
    InvalidSource { index: usize, reason: String },
}

/// How source packets reach the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// All of a tick's packets are delivered, in seeded random order, before
    /// the tick runs.
    #[default]
    Deterministic,
    /// A delivery thread races the tick loop through the shared receive
    /// handle.
    Concurrent,
}

fn default_ticks() -> u32 {
    1000
}

fn default_seed() -> u64 {
    0x5eed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Upper bound on ticks; the ensemble's own limit may stop it earlier
    #[serde(default = "default_ticks")]
    pub ticks: u32,
    /// Seed for packet delivery order
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub mode: DeliveryMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            seed: default_seed(),
            mode: DeliveryMode::default(),
        }
    }
}

/// A complete simulation: one ensemble plus the value sources feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub run: RunConfig,
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_toml(&self) -> Result<String, ScenarioError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        self.ensemble.params.machine_timestep_us as f64 * 1e-6
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.ensemble.validate()?;
        for (index, source) in self.sources.iter().enumerate() {
            if source.waveforms.is_empty() {
                return Err(ScenarioError::InvalidSource {
                    index,
                    reason: "no waveforms".to_string(),
                });
            }
            // Dimension bits are OR-ed into the base key
            let span = source.waveforms.len() as u32;
            if source.base_key & span.next_power_of_two().wrapping_sub(1) != 0 {
                return Err(ScenarioError::InvalidSource {
                    index,
                    reason: format!(
                        "base key {:#x} overlaps the {} dimension bits",
                        source.base_key, span
                    ),
                });
            }
        }
        Ok(())
    }
}
