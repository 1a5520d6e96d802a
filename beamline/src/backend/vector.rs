// SPDX-License-Identifier: AGPL-3.0-only

//! Rayon-parallel CPU variant.
//!
//! Per-particle arithmetic is shared with the reference backend
//! (`drift_one`, `kick_one`, ...), so the two variants differ only in loop
//! scheduling — parity holds to the last bit for map-style operations and
//! to summation-order tolerance for reductions. Arrays below
//! [`PARALLEL_THRESHOLD`] take the scalar path: forking rayon for a few
//! hundred particles costs more than it saves.

use rayon::prelude::*;

use crate::backend::random::NormalSource;
use crate::backend::reference::{
    check_same_len, drift_one, kick_one, linear_interp_kick_one, radiation_damp_one,
    ReferenceBackend,
};
use crate::backend::{BackendTag, BeamMath};
use crate::error::BeamlineError;
use crate::ring::{DriftParams, RfParams};

/// Below this many elements the scalar path is used.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Rayon-parallel implementation of the full operation set.
#[derive(Debug, Default)]
pub struct VectorBackend {
    rng: NormalSource,
    host: ReferenceBackend,
}

impl VectorBackend {
    /// Vector backend with the default noise seed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BeamMath for VectorBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Vector
    }

    fn set_random_seed(&self, seed: u64) {
        self.rng.reseed(seed);
    }

    fn drift(
        &self,
        dt: &mut [f64],
        de: &[f64],
        params: &DriftParams,
    ) -> Result<(), BeamlineError> {
        check_same_len("drift", dt.len(), de.len())?;
        if dt.len() < PARALLEL_THRESHOLD {
            return self.host.drift(dt, de, params);
        }
        dt.par_iter_mut()
            .zip(de.par_iter())
            .for_each(|(t, &e)| drift_one(t, e, params));
        Ok(())
    }

    fn kick(&self, dt: &[f64], de: &mut [f64], rf: &RfParams) -> Result<(), BeamlineError> {
        rf.validate()?;
        check_same_len("kick", dt.len(), de.len())?;
        if dt.len() < PARALLEL_THRESHOLD {
            return self.host.kick(dt, de, rf);
        }
        de.par_iter_mut()
            .zip(dt.par_iter())
            .for_each(|(e, &t)| kick_one(t, e, rf));
        Ok(())
    }

    fn rf_volt_comp(
        &self,
        rf: &RfParams,
        bin_centers: &[f64],
    ) -> Result<Vec<f64>, BeamlineError> {
        rf.validate()?;
        if bin_centers.len() < PARALLEL_THRESHOLD {
            return self.host.rf_volt_comp(rf, bin_centers);
        }
        let out = bin_centers
            .par_iter()
            .map(|&c| {
                let mut v = 0.0;
                for j in 0..rf.n_rf() {
                    v += rf.voltage[j] * (rf.omega_rf[j] * c + rf.phi_rf[j]).sin();
                }
                v
            })
            .collect();
        Ok(out)
    }

    fn linear_interp_kick(
        &self,
        dt: &[f64],
        de: &mut [f64],
        voltage: &[f64],
        bin_centers: &[f64],
        charge: f64,
        acceleration_kick: f64,
    ) -> Result<(), BeamlineError> {
        check_same_len("linear_interp_kick", dt.len(), de.len())?;
        check_same_len("linear_interp_kick", bin_centers.len(), voltage.len())?;
        if bin_centers.len() < 2 {
            return Err(BeamlineError::ShapeMismatch {
                op: "linear_interp_kick",
                expected: 2,
                got: bin_centers.len(),
            });
        }
        if dt.len() < PARALLEL_THRESHOLD {
            return self.host.linear_interp_kick(
                dt,
                de,
                voltage,
                bin_centers,
                charge,
                acceleration_kick,
            );
        }
        let bin_size =
            (bin_centers[bin_centers.len() - 1] - bin_centers[0]) / (bin_centers.len() - 1) as f64;
        let inv_bin_size = 1.0 / bin_size;
        let first_center = bin_centers[0];
        de.par_iter_mut().zip(dt.par_iter()).for_each(|(e, &t)| {
            linear_interp_kick_one(
                t,
                e,
                voltage,
                first_center,
                inv_bin_size,
                charge,
                acceleration_kick,
            );
        });
        Ok(())
    }

    fn slice(
        &self,
        dt: &[f64],
        profile: &mut [f64],
        cut_left: f64,
        cut_right: f64,
    ) -> Result<(), BeamlineError> {
        if profile.is_empty() || cut_right <= cut_left {
            return Err(BeamlineError::ShapeMismatch {
                op: "slice",
                expected: 1,
                got: profile.len(),
            });
        }
        if dt.len() < PARALLEL_THRESHOLD {
            return self.host.slice(dt, profile, cut_left, cut_right);
        }
        let n_slices = profile.len();
        let inv_bin = n_slices as f64 / (cut_right - cut_left);
        // Per-chunk local histograms, then an exact (integer-count) merge.
        let merged = dt
            .par_chunks(PARALLEL_THRESHOLD)
            .map(|chunk| {
                let mut local = vec![0.0; n_slices];
                for &t in chunk {
                    if t >= cut_left && t < cut_right {
                        let bin = ((t - cut_left) * inv_bin) as usize;
                        if bin < n_slices {
                            local[bin] += 1.0;
                        }
                    }
                }
                local
            })
            .reduce(
                || vec![0.0; n_slices],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b.iter()) {
                        *x += y;
                    }
                    a
                },
            );
        profile.copy_from_slice(&merged);
        Ok(())
    }

    fn beam_phase(
        &self,
        bin_centers: &[f64],
        profile: &[f64],
        alpha: f64,
        omega_rf: f64,
        phi_rf: f64,
    ) -> Result<f64, BeamlineError> {
        // Profile-grid sized: below any useful parallel threshold.
        self.host
            .beam_phase(bin_centers, profile, alpha, omega_rf, phi_rf)
    }

    fn beam_phase_fast(
        &self,
        bin_centers: &[f64],
        profile: &[f64],
        omega_rf: f64,
        phi_rf: f64,
    ) -> Result<f64, BeamlineError> {
        self.host
            .beam_phase_fast(bin_centers, profile, omega_rf, phi_rf)
    }

    fn synchrotron_radiation(
        &self,
        de: &mut [f64],
        u0: f64,
        n_kicks: u32,
        tau_z: f64,
    ) -> Result<(), BeamlineError> {
        if de.len() < PARALLEL_THRESHOLD {
            return self.host.synchrotron_radiation(de, u0, n_kicks, tau_z);
        }
        let nk = n_kicks.max(1);
        let damp = 2.0 / (tau_z * f64::from(nk));
        let u0_per_kick = u0 / f64::from(nk);
        for _ in 0..nk {
            de.par_iter_mut()
                .for_each(|e| radiation_damp_one(e, damp, u0_per_kick));
        }
        Ok(())
    }

    fn synchrotron_radiation_full(
        &self,
        de: &mut [f64],
        u0: f64,
        n_kicks: u32,
        tau_z: f64,
        sigma_de: f64,
        energy: f64,
    ) -> Result<(), BeamlineError> {
        let nk = n_kicks.max(1);
        let damp = 2.0 / (tau_z * f64::from(nk));
        let u0_per_kick = u0 / f64::from(nk);
        let excitation = 2.0 * sigma_de / (tau_z * f64::from(nk)).sqrt() * energy;
        // Noise is drawn sequentially so the stream matches the reference
        // variant for the same seed; only the apply loop parallelizes.
        let mut noise = vec![0.0; de.len()];
        for _ in 0..nk {
            self.rng.fill_normal(&mut noise);
            if de.len() < PARALLEL_THRESHOLD {
                for (e, &r) in de.iter_mut().zip(noise.iter()) {
                    radiation_damp_one(e, damp, u0_per_kick);
                    *e += excitation * r;
                }
            } else {
                de.par_iter_mut().zip(noise.par_iter()).for_each(|(e, &r)| {
                    radiation_damp_one(e, damp, u0_per_kick);
                    *e += excitation * r;
                });
            }
        }
        Ok(())
    }

    fn interp(
        &self,
        x: &[f64],
        xp: &[f64],
        yp: &[f64],
        left: Option<f64>,
        right: Option<f64>,
    ) -> Result<Vec<f64>, BeamlineError> {
        self.host.interp(x, xp, yp, left, right)
    }

    fn convolve(&self, signal: &[f64], kernel: &[f64]) -> Result<Vec<f64>, BeamlineError> {
        if signal.is_empty() || kernel.is_empty() {
            return Err(BeamlineError::ShapeMismatch {
                op: "convolve",
                expected: 1,
                got: 0,
            });
        }
        if signal.len() + kernel.len() < PARALLEL_THRESHOLD {
            return self.host.convolve(signal, kernel);
        }
        let n = signal.len();
        let m = kernel.len();
        let mut out = vec![0.0; n + m - 1];
        out.par_iter_mut().enumerate().for_each(|(k, o)| {
            let j_lo = (k + 1).saturating_sub(m);
            let j_hi = (k + 1).min(n);
            let mut acc = 0.0;
            for j in j_lo..j_hi {
                acc += signal[j] * kernel[k - j];
            }
            *o = acc;
        });
        Ok(out)
    }

    fn mean(&self, x: &[f64]) -> f64 {
        if x.len() < PARALLEL_THRESHOLD {
            return self.host.mean(x);
        }
        x.par_iter().sum::<f64>() / x.len() as f64
    }

    fn std(&self, x: &[f64]) -> f64 {
        if x.len() < PARALLEL_THRESHOLD {
            return self.host.std(x);
        }
        let m = self.mean(x);
        (x.par_iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / x.len() as f64).sqrt()
    }
}
