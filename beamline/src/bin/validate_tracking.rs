// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end tracking validation.
//!
//! Assembles the full pipeline (profile → induced voltage → RF tracker →
//! monitor) from a built-in config, tracks a few hundred turns, and checks
//! the invariants the pipeline contract promises: turn-counter
//! monotonicity, pipeline ordering, stable synchrotron motion, and
//! reference/vector trace agreement.

use synchrospring_beamline::backend::BackendContext;
use synchrospring_beamline::config::SimulationConfig;
use synchrospring_beamline::tolerances::SUMMATION_ORDER_REL;
use synchrospring_beamline::validation::ValidationHarness;

const CONFIG_JSON: &str = r#"{
    "n_turns": 200,
    "beam": {
        "n_macroparticles": 20000,
        "sigma_dt": 4.0e-10,
        "sigma_de": 5.0e7,
        "charge": 1.0,
        "intensity": 1.0e11,
        "seed": 42
    },
    "ring": {
        "solver": "simple",
        "t_rev": 8.9e-5,
        "length_ratio": 1.0,
        "alpha_order": 0,
        "eta_0": 3.48e-4,
        "eta_1": 0.0,
        "eta_2": 0.0,
        "alpha_0": 3.48e-4,
        "alpha_1": 0.0,
        "alpha_2": 0.0,
        "beta": 0.9999995,
        "energy": 4.5e11
    },
    "rf": {
        "voltage": [6.0e6],
        "omega_rf": [2.5132741e9],
        "phi_rf": [3.14159265358979],
        "charge": 1.0,
        "acceleration_kick": 0.0
    },
    "profile": {
        "n_slices": 128,
        "cut_left": -1.25e-9,
        "cut_right": 1.25e-9
    },
    "stages": ["BunchMonitor", "RingRfTracker", "TotalInducedVoltage", "Profile"],
    "resonators": [
        { "R_shunt_ohm": 5.0e5, "frequency_hz": 1.0e9, "Q": 1.0 }
    ],
    "monitor_every": 10
}"#;

/// Track the configured turns on one backend and return the final RMS
/// bunch length and energy spread.
fn run(cfg: &SimulationConfig, backend: &BackendContext) -> Result<Vec<f64>, String> {
    let mut state = cfg.build_state();
    let mut tracker = cfg.assemble().map_err(|e| e.to_string())?;

    for _ in 0..cfg.n_turns {
        tracker.track(backend, &mut state).map_err(|e| e.to_string())?;
    }
    if tracker.turn() != cfg.n_turns {
        return Err(format!("turn counter {} != {}", tracker.turn(), cfg.n_turns));
    }

    let ops = backend.ops();
    Ok(vec![ops.std(&state.beam.dt), ops.std(&state.beam.de)])
}

fn main() {
    println!("synchroSpring beamline — end-to-end tracking validation");
    let mut harness = ValidationHarness::new("tracking");

    let cfg = match SimulationConfig::from_json(CONFIG_JSON) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("  config: {e}");
            std::process::exit(1);
        }
    };

    match cfg.assemble() {
        Ok(tracker) => {
            let names = tracker.pipeline_names().join(" --> ");
            println!("  pipeline: [{names}]");
            harness.check_true(
                "pipeline order matches the fixed table",
                names == "Profile --> TotalInducedVoltage --> RingRfTracker --> BunchMonitor",
            );
        }
        Err(e) => {
            eprintln!("  assemble: {e}");
            std::process::exit(1);
        }
    }

    let reference = BackendContext::new();
    let mut vector = BackendContext::new();
    vector.use_vector();

    let (ref_out, vec_out) = match (run(&cfg, &reference), run(&cfg, &vector)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("  tracking failed: {e}");
            std::process::exit(1);
        }
    };

    // Bunch stays inside the profile window and keeps a sane RMS length.
    harness.check_upper("final rms bunch length below window", ref_out[0], 1.25e-9);
    harness.check_true("final rms bunch length nonzero", ref_out[0] > 1e-11);
    harness.check_true("final rms energy spread nonzero", ref_out[1] > 0.0);

    // Reference and vector runs of the same physics agree.
    harness.check_rel(
        "reference vs vector: rms bunch length",
        vec_out[0],
        ref_out[0],
        SUMMATION_ORDER_REL.max(1e-9),
    );
    harness.check_rel(
        "reference vs vector: rms energy spread",
        vec_out[1],
        ref_out[1],
        SUMMATION_ORDER_REL.max(1e-9),
    );

    std::process::exit(harness.summarize());
}
