//! Host-side virtual core for `nef_core` ensembles.
//!
//! Runs one ensemble against a simulated multicast fabric and timer, fed by
//! value sources described in a TOML scenario, and writes probes of what it
//! did.

pub mod fabric;
pub mod image;
pub mod probe;
pub mod runner;
pub mod scenario;
pub mod source;

pub use fabric::{Fabric, RecordedPacket};
pub use probe::{Probe, ProbeError};
pub use runner::{RunSummary, VirtualCore};
pub use scenario::{DeliveryMode, RunConfig, Scenario, ScenarioError};
pub use source::{SourceConfig, ValueSource, Waveform};
