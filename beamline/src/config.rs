// SPDX-License-Identifier: AGPL-3.0-only

//! Simulation configuration.
//!
//! JSON on disk, serde in memory. The `stages` list is the dynamic
//! construction path: names are resolved against the constructors this
//! module knows, and an unrecognized name aborts with
//! [`BeamlineError::NotTrackable`] before any pipeline exists — statically
//! constructed stages cannot fail that check, so this is where the error
//! kind lives.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::assembler::{Assembler, Stage, Tracker};
use crate::backend::DeviceMode;
use crate::beam::Beam;
use crate::error::BeamlineError;
use crate::precision::Precision;
use crate::ring::{DriftParams, RfParams};
use crate::stages::{
    BunchMonitor, Plot, Profile, ProfileState, Resonator, RingRfTracker, SimState,
    TotalInducedVoltage,
};

/// Bunch generation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct BeamConfig {
    /// Macroparticle count.
    pub n_macroparticles: usize,
    /// RMS bunch length [s].
    pub sigma_dt: f64,
    /// RMS energy spread [eV].
    pub sigma_de: f64,
    /// Particle charge in elementary charges.
    pub charge: f64,
    /// Real particles represented.
    pub intensity: f64,
    /// Bunch generation seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

const fn default_seed() -> u64 {
    42
}

/// Profile grid parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Number of slices.
    pub n_slices: usize,
    /// Left cut [s].
    pub cut_left: f64,
    /// Right cut [s].
    pub cut_right: f64,
}

/// One resonator of the impedance model.
#[derive(Debug, Clone, Deserialize)]
pub struct ResonatorConfig {
    /// Shunt impedance [Ohm].
    #[serde(rename = "R_shunt_ohm")]
    pub r_shunt: f64,
    /// Resonant frequency [Hz].
    #[serde(rename = "frequency_hz")]
    pub frequency: f64,
    /// Quality factor.
    #[serde(rename = "Q")]
    pub quality: f64,
}

/// Plot-data dump settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotConfig {
    /// Output directory for snapshot files.
    #[serde(default = "default_plot_dir")]
    pub out_dir: String,
    /// Dump interval in turns.
    #[serde(default = "default_plot_every")]
    pub every: u64,
}

fn default_plot_dir() -> String {
    "plots".to_string()
}

const fn default_plot_every() -> u64 {
    100
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            out_dir: default_plot_dir(),
            every: default_plot_every(),
        }
    }
}

fn default_stages() -> Vec<String> {
    vec!["Profile".into(), "RingRfTracker".into(), "BunchMonitor".into()]
}

const fn default_monitor_every() -> u64 {
    1
}

const fn default_n_nodes() -> usize {
    1
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Floating-point width.
    #[serde(default)]
    pub precision: Precision,
    /// Execution target.
    #[serde(default)]
    pub device: DeviceMode,
    /// Worker count for multi-node runs.
    #[serde(default = "default_n_nodes")]
    pub n_nodes: usize,
    /// Turns to track.
    pub n_turns: u64,
    /// Bunch generation.
    pub beam: BeamConfig,
    /// Ring section (drift) parameters.
    pub ring: DriftParams,
    /// RF station parameters.
    pub rf: RfParams,
    /// Profile grid.
    pub profile: ProfileConfig,
    /// Stage type names to assemble, in any order.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Impedance model for `TotalInducedVoltage`.
    #[serde(default)]
    pub resonators: Vec<ResonatorConfig>,
    /// Monitor sampling interval in turns.
    #[serde(default = "default_monitor_every")]
    pub monitor_every: u64,
    /// Plot-data dump settings.
    #[serde(default)]
    pub plot: PlotConfig,
}

impl SimulationConfig {
    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::ConfigLoad`] on malformed JSON or missing fields.
    pub fn from_json(text: &str) -> Result<Self, BeamlineError> {
        serde_json::from_str(text).map_err(|e| BeamlineError::ConfigLoad(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::ConfigLoad`] on IO or parse failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BeamlineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| BeamlineError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Build the shared simulation state (bunch + profile grid).
    #[must_use]
    pub fn build_state(&self) -> SimState {
        let beam = Beam::bi_gaussian(
            self.beam.n_macroparticles,
            self.beam.sigma_dt,
            self.beam.sigma_de,
            self.beam.charge,
            self.beam.intensity,
            self.beam.seed,
        );
        let profile = ProfileState::new(
            self.profile.n_slices,
            self.profile.cut_left,
            self.profile.cut_right,
        );
        SimState::new(beam, profile)
    }

    fn build_stage(&self, name: &str) -> Result<Box<dyn Stage>, BeamlineError> {
        match name {
            "Profile" => Ok(Box::new(Profile::new())),
            "TotalInducedVoltage" => {
                let resonators = self
                    .resonators
                    .iter()
                    .map(|r| Resonator {
                        r_shunt: r.r_shunt,
                        omega_r: 2.0 * std::f64::consts::PI * r.frequency,
                        quality: r.quality,
                    })
                    .collect();
                Ok(Box::new(TotalInducedVoltage::new(resonators)))
            }
            "RingRfTracker" => Ok(Box::new(RingRfTracker::new(
                self.ring.clone(),
                self.rf.clone(),
            ))),
            "BunchMonitor" => Ok(Box::new(BunchMonitor::new(self.monitor_every))),
            "Plot" => Ok(Box::new(Plot::new(
                self.plot.out_dir.clone(),
                self.plot.every,
            ))),
            other => Err(BeamlineError::NotTrackable(other.to_string())),
        }
    }

    /// Construct every configured stage.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::NotTrackable`] for the first unrecognized stage
    /// name; no stages are returned in that case.
    pub fn build_stages(&self) -> Result<Vec<Box<dyn Stage>>, BeamlineError> {
        self.stages.iter().map(|n| self.build_stage(n)).collect()
    }

    /// Build the stages and assemble the tracker.
    ///
    /// # Errors
    ///
    /// Same as [`Self::build_stages`].
    pub fn assemble(&self) -> Result<Tracker, BeamlineError> {
        Ok(Assembler::assemble(self.build_stages()?))
    }
}
