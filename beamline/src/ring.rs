// SPDX-License-Identifier: AGPL-3.0-only

//! Ring and RF station parameter blocks.
//!
//! These bundles are the argument contracts of the `drift` and `kick`
//! operation families: identical field meanings and array lengths across
//! every backend variant. Units are SI (seconds, eV, rad/s).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::BeamlineError;

/// Longitudinal equation-of-motion solver for the drift operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMode {
    /// First-order slippage only (`eta_0`).
    Simple,
    /// Slippage expanded to `alpha_order` in delta.
    Legacy,
    /// Exact relativistic drift from the momentum-compaction factors.
    Exact,
}

impl SolverMode {
    /// Stable name as carried in configs and kernel selection.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Legacy => "legacy",
            Self::Exact => "exact",
        }
    }
}

impl FromStr for SolverMode {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "legacy" => Ok(Self::Legacy),
            "exact" => Ok(Self::Exact),
            _ => Err(BeamlineError::UnsupportedMode(s.to_string())),
        }
    }
}

/// Ring-section parameters consumed by the drift operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftParams {
    /// Equation-of-motion solver.
    pub solver: SolverMode,
    /// Revolution period of the design particle [s].
    pub t_rev: f64,
    /// Section length over ring circumference (1.0 for a one-section ring).
    pub length_ratio: f64,
    /// Highest momentum-compaction order in use (0, 1, or 2).
    pub alpha_order: u8,
    /// Zeroth-order slippage factor.
    pub eta_0: f64,
    /// First-order slippage factor.
    pub eta_1: f64,
    /// Second-order slippage factor.
    pub eta_2: f64,
    /// Zeroth-order momentum compaction.
    pub alpha_0: f64,
    /// First-order momentum compaction.
    pub alpha_1: f64,
    /// Second-order momentum compaction.
    pub alpha_2: f64,
    /// Relativistic beta of the design particle.
    pub beta: f64,
    /// Total energy of the design particle [eV].
    pub energy: f64,
}

/// RF station parameters consumed by the kick operation family.
///
/// The three arrays run over RF harmonics and must share one length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfParams {
    /// Peak voltage per harmonic [V].
    pub voltage: Vec<f64>,
    /// Angular RF frequency per harmonic [rad/s].
    pub omega_rf: Vec<f64>,
    /// Phase offset per harmonic [rad].
    pub phi_rf: Vec<f64>,
    /// Particle charge in elementary charges.
    pub charge: f64,
    /// Energy kick from the design momentum program, per turn [eV].
    pub acceleration_kick: f64,
}

impl RfParams {
    /// Number of RF harmonics.
    #[must_use]
    pub fn n_rf(&self) -> usize {
        self.voltage.len()
    }

    /// Check the per-harmonic arrays share one length.
    pub fn validate(&self) -> Result<(), BeamlineError> {
        let n = self.voltage.len();
        if self.omega_rf.len() != n {
            return Err(BeamlineError::ShapeMismatch {
                op: "kick",
                expected: n,
                got: self.omega_rf.len(),
            });
        }
        if self.phi_rf.len() != n {
            return Err(BeamlineError::ShapeMismatch {
                op: "kick",
                expected: n,
                got: self.phi_rf.len(),
            });
        }
        Ok(())
    }
}
