// SPDX-License-Identifier: AGPL-3.0-only

//! Cross-variant parity validation for the backend operation set.
//!
//! Runs every named operation on identical inputs under the reference,
//! vector, and multi-node variants, and — when a GPU adapter is present —
//! the device variant in both precisions. Degrades gracefully to CPU-only
//! checks on machines without a GPU (exit code still reflects the checks
//! that ran).

use synchrospring_beamline::backend::{BackendContext, BeamMath};
use synchrospring_beamline::gpu::GpuDevice;
use synchrospring_beamline::precision::Precision;
use synchrospring_beamline::ring::{DriftParams, RfParams, SolverMode};
use synchrospring_beamline::tolerances::{
    EXACT_F64, GPU_F32_VS_CPU_F64, GPU_VS_CPU_F64, SUMMATION_ORDER_REL,
};
use synchrospring_beamline::validation::ValidationHarness;

fn drift_params(solver: SolverMode) -> DriftParams {
    DriftParams {
        solver,
        t_rev: 8.9e-5,
        length_ratio: 1.0,
        alpha_order: 2,
        eta_0: 3.48e-4,
        eta_1: 1.0e-7,
        eta_2: 0.0,
        alpha_0: 3.48e-4,
        alpha_1: 1.0e-7,
        alpha_2: 0.0,
        beta: 0.999,
        energy: 450e9,
    }
}

fn rf_params() -> RfParams {
    RfParams {
        voltage: vec![6e6, 0.6e6],
        omega_rf: vec![2.513e9, 5.026e9],
        phi_rf: vec![0.0, std::f64::consts::PI],
        charge: 1.0,
        acceleration_kick: 100.0,
    }
}

fn test_beam(n: usize) -> (Vec<f64>, Vec<f64>) {
    let dt: Vec<f64> = (0..n)
        .map(|i| (i as f64 / n as f64 - 0.5) * 2.0e-9)
        .collect();
    let de: Vec<f64> = (0..n)
        .map(|i| (((i * 2654_435_761) % n) as f64 / n as f64 - 0.5) * 2.0e6)
        .collect();
    (dt, de)
}

fn max_rel_diff(a: &[f64], b: &[f64], scale: f64) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs() / scale)
        .fold(0.0, f64::max)
}

fn check_variant_parity(
    harness: &mut ValidationHarness,
    label: &str,
    variant: &dyn BeamMath,
    reference: &dyn BeamMath,
    tol: f64,
) {
    let n = 20_000;
    let (dt0, de0) = test_beam(n);

    // drift (all solvers)
    for solver in [SolverMode::Simple, SolverMode::Legacy, SolverMode::Exact] {
        let p = drift_params(solver);
        let mut dt_a = dt0.clone();
        let mut dt_b = dt0.clone();
        if reference.drift(&mut dt_a, &de0, &p).is_err() || variant.drift(&mut dt_b, &de0, &p).is_err() {
            harness.check_true(&format!("{label}: drift {} ran", p.solver.name()), false);
            continue;
        }
        harness.check_upper(
            &format!("{label}: drift {} parity", p.solver.name()),
            max_rel_diff(&dt_a, &dt_b, 1e-9),
            tol,
        );
    }

    // kick
    let rf = rf_params();
    let mut de_a = de0.clone();
    let mut de_b = de0.clone();
    let kick_ok =
        reference.kick(&dt0, &mut de_a, &rf).is_ok() && variant.kick(&dt0, &mut de_b, &rf).is_ok();
    harness.check_true(&format!("{label}: kick ran"), kick_ok);
    harness.check_upper(
        &format!("{label}: kick parity"),
        max_rel_diff(&de_a, &de_b, rf.voltage[0]),
        tol,
    );

    // rf_volt_comp + linear_interp_kick
    let bin_centers: Vec<f64> = (0..256)
        .map(|i| -1.25e-9 + 2.5e-9 * (i as f64 + 0.5) / 256.0)
        .collect();
    match (
        reference.rf_volt_comp(&rf, &bin_centers),
        variant.rf_volt_comp(&rf, &bin_centers),
    ) {
        (Ok(va), Ok(vb)) => {
            harness.check_upper(
                &format!("{label}: rf_volt_comp parity"),
                max_rel_diff(&va, &vb, rf.voltage[0]),
                tol,
            );
            let mut lik_a = de0.clone();
            let mut lik_b = de0.clone();
            let ok = reference
                .linear_interp_kick(&dt0, &mut lik_a, &va, &bin_centers, 1.0, 50.0)
                .is_ok()
                && variant
                    .linear_interp_kick(&dt0, &mut lik_b, &vb, &bin_centers, 1.0, 50.0)
                    .is_ok();
            harness.check_true(&format!("{label}: linear_interp_kick ran"), ok);
            harness.check_upper(
                &format!("{label}: linear_interp_kick parity"),
                max_rel_diff(&lik_a, &lik_b, rf.voltage[0]),
                tol,
            );
        }
        _ => harness.check_true(&format!("{label}: rf_volt_comp ran"), false),
    }

    // slice histogram (integer counts: exact on every variant)
    let mut prof_a = vec![0.0; 128];
    let mut prof_b = vec![0.0; 128];
    let slice_ok = reference.slice(&dt0, &mut prof_a, -1e-9, 1e-9).is_ok()
        && variant.slice(&dt0, &mut prof_b, -1e-9, 1e-9).is_ok();
    harness.check_true(&format!("{label}: slice ran"), slice_ok);
    harness.check_abs(
        &format!("{label}: slice parity"),
        max_rel_diff(&prof_a, &prof_b, 1.0),
        0.0,
        0.5,
    );

    // synchrotron radiation (damping)
    let mut rad_a = de0.clone();
    let mut rad_b = de0;
    let rad_ok = reference.synchrotron_radiation(&mut rad_a, 1e3, 4, 200.0).is_ok()
        && variant.synchrotron_radiation(&mut rad_b, 1e3, 4, 200.0).is_ok();
    harness.check_true(&format!("{label}: synchrotron_radiation ran"), rad_ok);
    harness.check_upper(
        &format!("{label}: synchrotron_radiation parity"),
        max_rel_diff(&rad_a, &rad_b, 1e6),
        tol,
    );
}

fn main() {
    println!("synchroSpring beamline — backend parity validation");
    let mut harness = ValidationHarness::new("backend parity");

    let ctx = BackendContext::new();
    let reference = ctx.ops();

    // CPU variants first.
    let mut vector_ctx = BackendContext::new();
    vector_ctx.use_vector();
    check_variant_parity(&mut harness, "vector", vector_ctx.ops(), reference, EXACT_F64);

    let mut mn_ctx = BackendContext::new();
    mn_ctx.use_multi_node(4);
    check_variant_parity(&mut harness, "multi_node", mn_ctx.ops(), reference, EXACT_F64);

    // Reductions tolerate summation reorder only.
    let (_, de) = test_beam(50_000);
    harness.check_rel(
        "vector: mean",
        vector_ctx.ops().mean(&de),
        reference.mean(&de),
        SUMMATION_ORDER_REL.max(1e-9),
    );
    harness.check_rel(
        "vector: std",
        vector_ctx.ops().std(&de),
        reference.std(&de),
        SUMMATION_ORDER_REL.max(1e-9),
    );

    // Device variant, when an adapter exists.
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("  tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(GpuDevice::acquire(GpuDevice::default_adapter_index())) {
        Ok(gpu) => {
            println!("  GPU: {} (f64: {})", gpu.adapter_name, gpu.has_f64);
            let mut gpu_ctx = BackendContext::new();
            if gpu.has_f64 {
                match gpu_ctx.use_device(&gpu, Precision::Double) {
                    Ok(()) => check_variant_parity(
                        &mut harness,
                        "device f64",
                        gpu_ctx.ops(),
                        reference,
                        GPU_VS_CPU_F64,
                    ),
                    Err(e) => {
                        harness.check_true("device f64: activated", false);
                        eprintln!("  device f64 activation failed: {e}");
                    }
                }
            }
            match gpu_ctx.use_device(&gpu, Precision::Single) {
                Ok(()) => check_variant_parity(
                    &mut harness,
                    "device f32",
                    gpu_ctx.ops(),
                    reference,
                    GPU_F32_VS_CPU_F64,
                ),
                Err(e) => {
                    harness.check_true("device f32: activated", false);
                    eprintln!("  device f32 activation failed: {e}");
                }
            }
        }
        Err(e) => {
            println!("  no GPU adapter ({e}) — device checks skipped");
        }
    }

    std::process::exit(harness.summarize());
}
