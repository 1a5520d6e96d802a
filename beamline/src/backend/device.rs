// SPDX-License-Identifier: AGPL-3.0-only

//! GPU variant of the operation set.
//!
//! Beam arrays live host-side between turns; every device operation is a
//! single-shot upload → dispatch → readback (the convenience dispatch
//! pattern — a resident-array variant would batch, at the cost of owning
//! beam memory). The per-particle map kernels (drift, kick family,
//! radiation damping) run as WGSL compute; grid-sized host logic
//! (histogram, profile integrals, interpolation tables, noise generation)
//! runs on the embedded reference path — WGSL has no f64 atomics and those
//! arrays are profile-sized, not beam-sized. The registry contract is
//! behavioral equivalence per operation, not per-op residency.
//!
//! The pipeline set is compiled for one precision at construction: a
//! precision switch builds a new `DeviceBackend`, so no kernel ever runs
//! under a stale width.

use std::sync::Arc;

use crate::backend::reference::{check_same_len, ReferenceBackend};
use crate::backend::{shaders, BackendTag, BeamMath};
use crate::error::BeamlineError;
use crate::gpu::GpuDevice;
use crate::precision::Precision;
use crate::ring::{DriftParams, RfParams, SolverMode};

/// GPU implementation of the operation set, one compiled kernel set per
/// precision.
pub struct DeviceBackend {
    gpu: Arc<GpuDevice>,
    precision: Precision,
    host: ReferenceBackend,
    pipeline_drift: wgpu::ComputePipeline,
    pipeline_kick: wgpu::ComputePipeline,
    pipeline_rf_volt: wgpu::ComputePipeline,
    pipeline_interp_kick: wgpu::ComputePipeline,
    pipeline_radiation: wgpu::ComputePipeline,
}

impl std::fmt::Debug for DeviceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBackend")
            .field("adapter", &self.gpu.adapter_name)
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

const fn solver_code(solver: SolverMode) -> f64 {
    match solver {
        SolverMode::Simple => 0.0,
        SolverMode::Legacy => 1.0,
        SolverMode::Exact => 2.0,
    }
}

impl DeviceBackend {
    /// Compile the kernel set for `precision` on an acquired device.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::NoShaderF64`] for double precision on a device
    /// without f64 shader support.
    pub fn new(gpu: Arc<GpuDevice>, precision: Precision) -> Result<Self, BeamlineError> {
        if precision == Precision::Double && !gpu.has_f64 {
            return Err(BeamlineError::NoShaderF64);
        }
        let wg = gpu.workgroup_size();
        let pipeline_drift = gpu.create_pipeline(&shaders::drift_source(precision, wg), "drift");
        let pipeline_kick = gpu.create_pipeline(&shaders::kick_source(precision, wg), "kick");
        let pipeline_rf_volt =
            gpu.create_pipeline(&shaders::rf_volt_comp_source(precision, wg), "rf_volt_comp");
        let pipeline_interp_kick = gpu.create_pipeline(
            &shaders::linear_interp_kick_source(precision, wg),
            "linear_interp_kick",
        );
        let pipeline_radiation = gpu.create_pipeline(
            &shaders::synchrotron_radiation_source(precision, wg),
            "synchrotron_radiation",
        );
        Ok(Self {
            gpu,
            precision,
            host: ReferenceBackend::new(),
            pipeline_drift,
            pipeline_kick,
            pipeline_rf_volt,
            pipeline_interp_kick,
            pipeline_radiation,
        })
    }

    /// The precision this kernel set was compiled for.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    fn beam_buffer(&self, data: &[f64], label: &str) -> wgpu::Buffer {
        match self.precision {
            Precision::Double => self.gpu.create_f64_buffer(data, label),
            Precision::Single => self.gpu.create_f32_buffer(data, label),
        }
    }

    fn read_beam(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<f64>, BeamlineError> {
        match self.precision {
            Precision::Double => self.gpu.read_back_f64(buffer, count),
            Precision::Single => self.gpu.read_back_f32(buffer, count),
        }
    }
}

impl BeamMath for DeviceBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Device
    }

    fn set_random_seed(&self, seed: u64) {
        self.host.set_random_seed(seed);
    }

    fn drift(
        &self,
        dt: &mut [f64],
        de: &[f64],
        params: &DriftParams,
    ) -> Result<(), BeamlineError> {
        check_same_len("drift", dt.len(), de.len())?;
        if dt.is_empty() {
            return Ok(());
        }
        let packed = [
            solver_code(params.solver),
            params.t_rev * params.length_ratio,
            params.beta,
            params.energy,
            params.eta_0,
            params.eta_1,
            params.eta_2,
            params.alpha_0,
            params.alpha_1,
            params.alpha_2,
            f64::from(params.alpha_order),
        ];
        let buf_dt = self.beam_buffer(dt, "drift_dt");
        let buf_de = self.beam_buffer(de, "drift_de");
        let buf_params = self.beam_buffer(&packed, "drift_params");
        let bind = self
            .gpu
            .create_bind_group(&self.pipeline_drift, &[&buf_dt, &buf_de, &buf_params]);
        self.gpu
            .dispatch(&self.pipeline_drift, &bind, self.gpu.workgroups_for(dt.len()));
        dt.copy_from_slice(&self.read_beam(&buf_dt, dt.len())?);
        Ok(())
    }

    fn kick(&self, dt: &[f64], de: &mut [f64], rf: &RfParams) -> Result<(), BeamlineError> {
        rf.validate()?;
        check_same_len("kick", dt.len(), de.len())?;
        if dt.is_empty() || rf.n_rf() == 0 {
            for e in de.iter_mut() {
                *e += rf.acceleration_kick;
            }
            return Ok(());
        }
        let packed = [rf.n_rf() as f64, rf.charge, rf.acceleration_kick];
        let buf_dt = self.beam_buffer(dt, "kick_dt");
        let buf_de = self.beam_buffer(de, "kick_de");
        let buf_v = self.beam_buffer(&rf.voltage, "kick_voltage");
        let buf_w = self.beam_buffer(&rf.omega_rf, "kick_omega");
        let buf_p = self.beam_buffer(&rf.phi_rf, "kick_phi");
        let buf_params = self.beam_buffer(&packed, "kick_params");
        let bind = self.gpu.create_bind_group(
            &self.pipeline_kick,
            &[&buf_dt, &buf_de, &buf_v, &buf_w, &buf_p, &buf_params],
        );
        self.gpu
            .dispatch(&self.pipeline_kick, &bind, self.gpu.workgroups_for(dt.len()));
        de.copy_from_slice(&self.read_beam(&buf_de, de.len())?);
        Ok(())
    }

    fn rf_volt_comp(
        &self,
        rf: &RfParams,
        bin_centers: &[f64],
    ) -> Result<Vec<f64>, BeamlineError> {
        rf.validate()?;
        if bin_centers.is_empty() || rf.n_rf() == 0 {
            return Ok(vec![0.0; bin_centers.len()]);
        }
        let packed = [rf.n_rf() as f64];
        let zeros = vec![0.0; bin_centers.len()];
        let buf_centers = self.beam_buffer(bin_centers, "rfv_centers");
        let buf_out = self.beam_buffer(&zeros, "rfv_out");
        let buf_v = self.beam_buffer(&rf.voltage, "rfv_voltage");
        let buf_w = self.beam_buffer(&rf.omega_rf, "rfv_omega");
        let buf_p = self.beam_buffer(&rf.phi_rf, "rfv_phi");
        let buf_params = self.beam_buffer(&packed, "rfv_params");
        let bind = self.gpu.create_bind_group(
            &self.pipeline_rf_volt,
            &[&buf_centers, &buf_out, &buf_v, &buf_w, &buf_p, &buf_params],
        );
        self.gpu.dispatch(
            &self.pipeline_rf_volt,
            &bind,
            self.gpu.workgroups_for(bin_centers.len()),
        );
        self.read_beam(&buf_out, bin_centers.len())
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
        if dt.is_empty() {
            return Ok(());
        }
        let bin_size =
            (bin_centers[bin_centers.len() - 1] - bin_centers[0]) / (bin_centers.len() - 1) as f64;
        let packed = [
            bin_centers[0],
            1.0 / bin_size,
            charge,
            acceleration_kick,
            bin_centers.len() as f64,
        ];
        let buf_dt = self.beam_buffer(dt, "lik_dt");
        let buf_de = self.beam_buffer(de, "lik_de");
        let buf_v = self.beam_buffer(voltage, "lik_voltage");
        let buf_params = self.beam_buffer(&packed, "lik_params");
        let bind = self.gpu.create_bind_group(
            &self.pipeline_interp_kick,
            &[&buf_dt, &buf_de, &buf_v, &buf_params],
        );
        self.gpu.dispatch(
            &self.pipeline_interp_kick,
            &bind,
            self.gpu.workgroups_for(dt.len()),
        );
        de.copy_from_slice(&self.read_beam(&buf_de, de.len())?);
        Ok(())
    }

    fn slice(
        &self,
        dt: &[f64],
        profile: &mut [f64],
        cut_left: f64,
        cut_right: f64,
    ) -> Result<(), BeamlineError> {
        self.host.slice(dt, profile, cut_left, cut_right)
    }

    fn beam_phase(
        &self,
        bin_centers: &[f64],
        profile: &[f64],
        alpha: f64,
        omega_rf: f64,
        phi_rf: f64,
    ) -> Result<f64, BeamlineError> {
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
        if de.is_empty() {
            return Ok(());
        }
        let nk = n_kicks.max(1);
        let packed = [
            2.0 / (tau_z * f64::from(nk)),
            u0 / f64::from(nk),
            f64::from(nk),
        ];
        let buf_de = self.beam_buffer(de, "rad_de");
        let buf_params = self.beam_buffer(&packed, "rad_params");
        let bind = self
            .gpu
            .create_bind_group(&self.pipeline_radiation, &[&buf_de, &buf_params]);
        self.gpu.dispatch(
            &self.pipeline_radiation,
            &bind,
            self.gpu.workgroups_for(de.len()),
        );
        de.copy_from_slice(&self.read_beam(&buf_de, de.len())?);
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
        // Noise stream stays host-side so the sequence matches the other
        // variants for the same seed.
        self.host
            .synchrotron_radiation_full(de, u0, n_kicks, tau_z, sigma_de, energy)
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
        self.host.convolve(signal, kernel)
    }

    fn mean(&self, x: &[f64]) -> f64 {
        self.host.mean(x)
    }

    fn std(&self, x: &[f64]) -> f64 {
        self.host.std(x)
    }
}
