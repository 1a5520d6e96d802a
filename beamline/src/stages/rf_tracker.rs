// SPDX-License-Identifier: AGPL-3.0-only

//! RF station tracking stage: one kick + drift per turn.
//!
//! Two kick paths, chosen per turn from the shared state:
//!
//! - **Direct kick** — no induced voltage present: the analytic RF sum is
//!   applied to every particle.
//! - **Interpolated kick** — an intensity-effects stage has filled
//!   `state.induced_voltage`: the RF voltage is sampled on the profile grid
//!   (`rf_volt_comp`), the induced voltage is added bin-wise, and the total
//!   is applied through `linear_interp_kick`.
//!
//! After the kick, the drift advances arrival times under the configured
//! solver. Optional synchrotron-radiation damping (with or without quantum
//! excitation) closes the turn.

use crate::assembler::{Stage, TrackContext};
use crate::error::BeamlineError;
use crate::ring::{DriftParams, RfParams};

/// Synchrotron-radiation settings for one RF section.
#[derive(Debug, Clone)]
pub struct RadiationParams {
    /// Energy loss per turn [eV].
    pub u0: f64,
    /// Damping sub-kicks per turn.
    pub n_kicks: u32,
    /// Longitudinal damping time [turns].
    pub tau_z: f64,
    /// Enable quantum excitation.
    pub quantum_excitation: bool,
    /// Equilibrium relative energy spread (quantum excitation strength).
    pub sigma_de: f64,
}

/// Kick-and-drift tracker for one RF station / ring section.
#[derive(Debug, Clone)]
pub struct RingRfTracker {
    drift: DriftParams,
    rf: RfParams,
    radiation: Option<RadiationParams>,
}

impl RingRfTracker {
    /// Tracker for one section.
    #[must_use]
    pub fn new(drift: DriftParams, rf: RfParams) -> Self {
        Self {
            drift,
            rf,
            radiation: None,
        }
    }

    /// Enable synchrotron radiation for this section.
    #[must_use]
    pub fn with_radiation(mut self, radiation: RadiationParams) -> Self {
        self.radiation = Some(radiation);
        self
    }

    /// The section's drift parameters.
    #[must_use]
    pub const fn drift_params(&self) -> &DriftParams {
        &self.drift
    }

    /// The section's RF parameters.
    #[must_use]
    pub const fn rf_params(&self) -> &RfParams {
        &self.rf
    }

    fn track_section(&self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        let ops = ctx.backend.ops();
        let state = &mut *ctx.state;

        if state.has_induced_voltage() {
            let mut total = ops.rf_volt_comp(&self.rf, &state.profile.bin_centers)?;
            if total.len() != state.induced_voltage.len() {
                return Err(BeamlineError::ShapeMismatch {
                    op: "rf_volt_comp",
                    expected: total.len(),
                    got: state.induced_voltage.len(),
                });
            }
            for (v, &ind) in total.iter_mut().zip(state.induced_voltage.iter()) {
                *v += ind;
            }
            ops.linear_interp_kick(
                &state.beam.dt,
                &mut state.beam.de,
                &total,
                &state.profile.bin_centers,
                self.rf.charge,
                self.rf.acceleration_kick,
            )?;
        } else {
            ops.kick(&state.beam.dt, &mut state.beam.de, &self.rf)?;
        }

        ops.drift(&mut state.beam.dt, &state.beam.de, &self.drift)?;

        if let Some(rad) = &self.radiation {
            if rad.quantum_excitation {
                ops.synchrotron_radiation_full(
                    &mut state.beam.de,
                    rad.u0,
                    rad.n_kicks,
                    rad.tau_z,
                    rad.sigma_de,
                    self.drift.energy,
                )?;
            } else {
                ops.synchrotron_radiation(&mut state.beam.de, rad.u0, rad.n_kicks, rad.tau_z)?;
            }
        }
        Ok(())
    }
}

impl Stage for RingRfTracker {
    fn stage_name(&self) -> &str {
        "RingRfTracker"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        self.track_section(ctx)
    }
}

/// Aggregate of per-section trackers, run in ring order within one turn.
#[derive(Debug, Default)]
pub struct FullRingAndRf {
    sections: Vec<RingRfTracker>,
}

impl FullRingAndRf {
    /// Aggregate the given sections.
    #[must_use]
    pub fn new(sections: Vec<RingRfTracker>) -> Self {
        Self { sections }
    }

    /// Number of ring sections.
    #[must_use]
    pub fn n_sections(&self) -> usize {
        self.sections.len()
    }
}

impl Stage for FullRingAndRf {
    fn stage_name(&self) -> &str {
        "FullRingAndRf"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        for section in &self.sections {
            section.track_section(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::BackendContext;
    use crate::beam::Beam;
    use crate::ring::SolverMode;
    use crate::stages::{ProfileState, SimState};

    fn drift() -> DriftParams {
        DriftParams {
            solver: SolverMode::Simple,
            t_rev: 8.9e-5,
            length_ratio: 1.0,
            alpha_order: 0,
            eta_0: 3.48e-4,
            eta_1: 0.0,
            eta_2: 0.0,
            alpha_0: 3.48e-4,
            alpha_1: 0.0,
            alpha_2: 0.0,
            beta: 0.999,
            energy: 450e9,
        }
    }

    fn rf() -> RfParams {
        RfParams {
            voltage: vec![6e6],
            omega_rf: vec![2.0 * std::f64::consts::PI / 2.5e-9],
            phi_rf: vec![0.0],
            charge: 1.0,
            acceleration_kick: 0.0,
        }
    }

    fn state() -> SimState {
        let mut beam = Beam::new(16, 1.0, 1e11);
        for (i, t) in beam.dt.iter_mut().enumerate() {
            *t = (i as f64 / 16.0 - 0.5) * 1e-9;
        }
        SimState::new(beam, ProfileState::new(64, -1.25e-9, 1.25e-9))
    }

    #[test]
    fn direct_kick_changes_energy_then_drift_moves_times() {
        let backend = BackendContext::new();
        let mut st = state();
        let dt_before = st.beam.dt.clone();
        let mut stage = RingRfTracker::new(drift(), rf());
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st,
            turn: 0,
        };
        stage.track(&mut ctx).unwrap();
        assert!(st.beam.de.iter().any(|&e| e != 0.0));
        assert!(st.beam.dt.iter().zip(&dt_before).any(|(a, b)| a != b));
    }

    #[test]
    fn interpolated_path_engages_when_induced_voltage_present() {
        let backend = BackendContext::new();
        let mut st = state();

        // Direct path first.
        let mut direct = RingRfTracker::new(drift(), rf());
        let mut st_direct = state();
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st_direct,
            turn: 0,
        };
        direct.track(&mut ctx).unwrap();

        // Interpolated path with zero induced voltage must approximate it.
        backend
            .ops()
            .slice(
                &st.beam.dt,
                &mut st.profile.hist,
                st.profile.cut_left,
                st.profile.cut_right,
            )
            .unwrap();
        st.induced_voltage = vec![0.0; st.profile.n_slices()];
        let mut interp = RingRfTracker::new(drift(), rf());
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st,
            turn: 0,
        };
        interp.track(&mut ctx).unwrap();

        for (a, b) in st.beam.de.iter().zip(st_direct.beam.de.iter()) {
            // Coarse grid: interpolation error only.
            assert!((a - b).abs() / 6e6 < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn induced_voltage_length_mismatch_is_rejected() {
        let backend = BackendContext::new();
        let mut st = state();
        st.induced_voltage = vec![0.0; 3]; // grid has 64 bins
        let mut stage = RingRfTracker::new(drift(), rf());
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st,
            turn: 0,
        };
        let err = stage.track(&mut ctx);
        assert!(matches!(err, Err(BeamlineError::ShapeMismatch { .. })));
    }

    #[test]
    fn full_ring_tracks_every_section() {
        let backend = BackendContext::new();
        let mut st = state();
        let mut two = FullRingAndRf::new(vec![
            RingRfTracker::new(drift(), rf()),
            RingRfTracker::new(drift(), rf()),
        ]);
        assert_eq!(two.n_sections(), 2);
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st,
            turn: 0,
        };
        two.track(&mut ctx).unwrap();

        let mut st_one = state();
        let mut one = RingRfTracker::new(drift(), rf());
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st_one,
            turn: 0,
        };
        one.track(&mut ctx).unwrap();
        // Two sections kick twice as often; energies must differ.
        assert!(st.beam.de.iter().zip(&st_one.beam.de).any(|(a, b)| a != b));
    }

    #[test]
    fn radiation_damps_energy_offsets() {
        let backend = BackendContext::new();
        let mut st = state();
        st.beam.de.iter_mut().for_each(|e| *e = 1e7);
        let mut rf_quiet = rf();
        rf_quiet.voltage = vec![0.0];
        let mut stage = RingRfTracker::new(drift(), rf_quiet).with_radiation(RadiationParams {
            u0: 0.0,
            n_kicks: 2,
            tau_z: 50.0,
            quantum_excitation: false,
            sigma_de: 0.0,
        });
        let mut ctx = TrackContext {
            backend: &backend,
            state: &mut st,
            turn: 0,
        };
        stage.track(&mut ctx).unwrap();
        assert!(st.beam.de.iter().all(|&e| e > 0.0 && e < 1e7));
    }
}
