// SPDX-License-Identifier: AGPL-3.0-only

//! Concrete per-turn simulation components.
//!
//! Every stage operates on the shared [`SimState`] passed through the track
//! context; none of them hold beam data of their own. The turn-internal
//! dataflow the ordering table encodes:
//!
//! ```text
//!   Profile ──▶ TotalInducedVoltage ──▶ RingRfTracker ──▶ BunchMonitor ──▶ Plot
//!   (slice)     (wake convolution)      (kick + drift)    (statistics)     (dumps)
//! ```

pub mod induced;
pub mod monitor;
pub mod plot;
pub mod profile;
pub mod rf_tracker;

pub use induced::{Resonator, TotalInducedVoltage};
pub use monitor::{BunchMonitor, TurnStats};
pub use plot::Plot;
pub use profile::Profile;
pub use rf_tracker::{FullRingAndRf, RadiationParams, RingRfTracker};

use crate::beam::Beam;

/// The longitudinal profile grid and its current histogram.
#[derive(Debug, Clone)]
pub struct ProfileState {
    /// Left edge of the sliced window [s].
    pub cut_left: f64,
    /// Right edge of the sliced window [s].
    pub cut_right: f64,
    /// Macroparticle counts per bin, refreshed by the `Profile` stage.
    pub hist: Vec<f64>,
    /// Bin centers [s], fixed at construction.
    pub bin_centers: Vec<f64>,
}

impl ProfileState {
    /// Uniform grid of `n_slices` bins over `[cut_left, cut_right)`.
    #[must_use]
    pub fn new(n_slices: usize, cut_left: f64, cut_right: f64) -> Self {
        let bin_size = (cut_right - cut_left) / n_slices as f64;
        let bin_centers = (0..n_slices)
            .map(|i| cut_left + (i as f64 + 0.5) * bin_size)
            .collect();
        Self {
            cut_left,
            cut_right,
            hist: vec![0.0; n_slices],
            bin_centers,
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn n_slices(&self) -> usize {
        self.hist.len()
    }

    /// Bin width [s].
    #[must_use]
    pub fn bin_size(&self) -> f64 {
        (self.cut_right - self.cut_left) / self.hist.len() as f64
    }
}

/// Shared mutable simulation state threaded through every stage.
#[derive(Debug)]
pub struct SimState {
    /// Macroparticle coordinates.
    pub beam: Beam,
    /// Profile grid and histogram.
    pub profile: ProfileState,
    /// Induced voltage on the profile grid [V]; empty until an
    /// intensity-effects stage computes it, which is what switches the RF
    /// tracker onto the interpolated-kick path.
    pub induced_voltage: Vec<f64>,
}

impl SimState {
    /// State with no induced voltage yet.
    #[must_use]
    pub fn new(beam: Beam, profile: ProfileState) -> Self {
        Self {
            beam,
            profile,
            induced_voltage: Vec::new(),
        }
    }

    /// Whether an intensity-effects stage has filled the induced voltage.
    #[must_use]
    pub fn has_induced_voltage(&self) -> bool {
        !self.induced_voltage.is_empty()
    }
}
