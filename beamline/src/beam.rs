// SPDX-License-Identifier: AGPL-3.0-only

//! Macroparticle beam state.
//!
//! The beam is the shared mutable object every pipeline stage reads and
//! mutates: `dt` (arrival time relative to the design particle [s]) and
//! `de` (energy offset [eV]), one entry per macroparticle. Stages never
//! exchange data directly — effects propagate turn-internally through this
//! state, in pipeline order.

use crate::backend::random::NormalSource;

/// Longitudinal macroparticle coordinates plus bunch bookkeeping.
#[derive(Debug, Clone)]
pub struct Beam {
    /// Arrival time offsets [s].
    pub dt: Vec<f64>,
    /// Energy offsets [eV].
    pub de: Vec<f64>,
    /// Particle charge in elementary charges.
    pub charge: f64,
    /// Number of real particles the macroparticles represent.
    pub intensity: f64,
}

impl Beam {
    /// Beam with all macroparticles on the design orbit.
    #[must_use]
    pub fn new(n_macroparticles: usize, charge: f64, intensity: f64) -> Self {
        Self {
            dt: vec![0.0; n_macroparticles],
            de: vec![0.0; n_macroparticles],
            charge,
            intensity,
        }
    }

    /// Bi-Gaussian matched-bunch initializer, deterministic per seed.
    #[must_use]
    pub fn bi_gaussian(
        n_macroparticles: usize,
        sigma_dt: f64,
        sigma_de: f64,
        charge: f64,
        intensity: f64,
        seed: u64,
    ) -> Self {
        let rng = NormalSource::new(seed);
        let mut beam = Self::new(n_macroparticles, charge, intensity);
        rng.fill_normal(&mut beam.dt);
        rng.fill_normal(&mut beam.de);
        for v in &mut beam.dt {
            *v *= sigma_dt;
        }
        for v in &mut beam.de {
            *v *= sigma_de;
        }
        beam
    }

    /// Macroparticle count.
    #[must_use]
    pub fn n_macroparticles(&self) -> usize {
        self.dt.len()
    }

    /// Real particles per macroparticle.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.dt.is_empty() {
            0.0
        } else {
            self.intensity / self.dt.len() as f64
        }
    }
}
