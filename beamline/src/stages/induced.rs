// SPDX-License-Identifier: AGPL-3.0-only

//! Induced-voltage stage: resonator wake fields in the time domain.
//!
//! The induced voltage is the convolution of the bunch profile with the sum
//! of the resonator wake functions, scaled to volts per macroparticle
//! count. Written onto the shared state's profile grid, where the RF
//! tracker picks it up for the interpolated kick.

use crate::assembler::{Stage, TrackContext};
use crate::error::BeamlineError;

/// Elementary charge [C].
const E_CHARGE: f64 = 1.602_176_634e-19;

/// One broad-band resonator impedance source.
#[derive(Debug, Clone)]
pub struct Resonator {
    /// Shunt impedance [Ohm].
    pub r_shunt: f64,
    /// Resonant angular frequency [rad/s].
    pub omega_r: f64,
    /// Quality factor (> 0.5 for an oscillatory wake).
    pub quality: f64,
}

impl Resonator {
    /// Wake function at time `t` after the source particle [V/C].
    ///
    /// `W(t) = 2 α R e^{-α t} (cos ω̄ t − α/ω̄ sin ω̄ t)` for `t > 0`,
    /// half-weighted at `t = 0`, zero before (causality).
    #[must_use]
    pub fn wake_at(&self, t: f64) -> f64 {
        if t < 0.0 {
            return 0.0;
        }
        let alpha = self.omega_r / (2.0 * self.quality);
        let omega_bar_sq = self.omega_r * self.omega_r - alpha * alpha;
        let factor = if t == 0.0 { 0.5 } else { 1.0 };
        if omega_bar_sq <= 0.0 {
            // Overdamped: degenerate exponential wake.
            return factor * 2.0 * alpha * self.r_shunt * (-alpha * t).exp();
        }
        let omega_bar = omega_bar_sq.sqrt();
        factor
            * 2.0
            * alpha
            * self.r_shunt
            * (-alpha * t).exp()
            * ((omega_bar * t).cos() - alpha / omega_bar * (omega_bar * t).sin())
    }
}

/// Sums resonator wakes against the profile and fills
/// `state.induced_voltage`.
#[derive(Debug)]
pub struct TotalInducedVoltage {
    resonators: Vec<Resonator>,
    // Wake samples on the profile grid; rebuilt when the grid size changes.
    wake: Vec<f64>,
}

impl TotalInducedVoltage {
    /// Stage for the given resonator set.
    #[must_use]
    pub fn new(resonators: Vec<Resonator>) -> Self {
        Self {
            resonators,
            wake: Vec::new(),
        }
    }

    fn refresh_wake(&mut self, n_slices: usize, bin_size: f64) {
        if self.wake.len() == n_slices {
            return;
        }
        self.wake = (0..n_slices)
            .map(|i| {
                let t = i as f64 * bin_size;
                self.resonators.iter().map(|r| r.wake_at(t)).sum()
            })
            .collect();
    }
}

impl Stage for TotalInducedVoltage {
    fn stage_name(&self) -> &str {
        "TotalInducedVoltage"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        let state = &mut *ctx.state;
        let n_slices = state.profile.n_slices();
        self.refresh_wake(n_slices, state.profile.bin_size());

        let conv = ctx.backend.ops().convolve(&state.profile.hist, &self.wake)?;
        let scale = -state.beam.charge * E_CHARGE * state.beam.ratio();
        state.induced_voltage.clear();
        state
            .induced_voltage
            .extend(conv.iter().take(n_slices).map(|&v| scale * v));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::BackendContext;
    use crate::beam::Beam;
    use crate::stages::{ProfileState, SimState};

    fn resonator() -> Resonator {
        Resonator {
            r_shunt: 1e6,
            omega_r: 2.0 * std::f64::consts::PI * 1e9,
            quality: 1.0,
        }
    }

    #[test]
    fn wake_is_causal_and_half_weighted_at_zero() {
        let r = resonator();
        assert_eq!(r.wake_at(-1e-12), 0.0);
        let alpha = r.omega_r / (2.0 * r.quality);
        assert!((r.wake_at(0.0) - alpha * r.r_shunt).abs() < 1e-3);
        assert!(r.wake_at(1e-10).is_finite());
    }

    #[test]
    fn induced_voltage_fills_profile_grid_and_opposes_charge() {
        let backend = BackendContext::new();
        let mut beam = Beam::new(1000, 1.0, 1e11);
        beam.dt = vec![0.5e-9; 1000]; // single occupied bin
        let mut state = SimState::new(beam, ProfileState::new(32, 0.0, 4e-9));
        backend
            .ops()
            .slice(
                &state.beam.dt,
                &mut state.profile.hist,
                state.profile.cut_left,
                state.profile.cut_right,
            )
            .unwrap();

        let mut stage = TotalInducedVoltage::new(vec![resonator()]);
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut state,
            turn: 0,
        };
        stage.track(&mut ctx).unwrap();

        assert_eq!(state.induced_voltage.len(), 32);
        assert!(state.has_induced_voltage());
        // The wake at zero lag is positive, so the induced voltage in the
        // occupied bin opposes the (positive) beam charge.
        let occupied = 4; // 0.5e-9 lands in bin 4 of 32 over 4 ns
        assert!(state.induced_voltage[occupied] < 0.0);
    }

    #[test]
    fn wake_cache_tracks_grid_size() {
        let mut stage = TotalInducedVoltage::new(vec![resonator()]);
        stage.refresh_wake(16, 1e-10);
        let first = stage.wake.clone();
        stage.refresh_wake(16, 1e-10);
        assert_eq!(first, stage.wake); // unchanged grid reuses the cache
        stage.refresh_wake(64, 1e-10);
        assert_eq!(stage.wake.len(), 64);
    }
}
