// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: pipeline assembly and tracker public API.
//!
//! Exercises the ordering table, stable insertion, the append escape hatch,
//! and the turn-counter contract across module boundaries.

use synchrospring_beamline::assembler::{Assembler, FnStage, Stage, TrackContext, Tracker};
use synchrospring_beamline::backend::BackendContext;
use synchrospring_beamline::beam::Beam;
use synchrospring_beamline::error::BeamlineError;
use synchrospring_beamline::stages::{ProfileState, SimState};

fn named(name: &str) -> Box<dyn Stage> {
    let name = name.to_string();
    Box::new(FnStage::new(name, |_ctx: &mut TrackContext<'_>| Ok(())))
}

fn counting(name: &str, log: std::rc::Rc<std::cell::RefCell<Vec<String>>>) -> Box<dyn Stage> {
    let tag = name.to_string();
    Box::new(FnStage::new(name.to_string(), move |_ctx: &mut TrackContext<'_>| {
        log.borrow_mut().push(tag.clone());
        Ok(())
    }))
}

fn state() -> SimState {
    SimState::new(Beam::new(16, 1.0, 1e11), ProfileState::new(32, -1e-9, 1e-9))
}

#[test]
fn four_stage_scenario_is_permutation_invariant() {
    // Spec scenario: {Plot, Profile, TotalInducedVoltage, BunchMonitor}
    // always assembles to table order.
    let expected = vec!["Profile", "TotalInducedVoltage", "BunchMonitor", "Plot"];
    let perms: [[&str; 4]; 4] = [
        ["Plot", "Profile", "TotalInducedVoltage", "BunchMonitor"],
        ["Profile", "Plot", "BunchMonitor", "TotalInducedVoltage"],
        ["BunchMonitor", "TotalInducedVoltage", "Plot", "Profile"],
        ["TotalInducedVoltage", "BunchMonitor", "Profile", "Plot"],
    ];
    for perm in perms {
        let tracker = Assembler::assemble(perm.iter().map(|&n| named(n)).collect());
        assert_eq!(tracker.pipeline_names(), expected, "input {perm:?}");
    }
}

#[test]
fn lower_rank_always_precedes_higher_rank() {
    let pairs = [
        ("Profile", "TotalInducedVoltage"),
        ("TotalInducedVoltage", "RingRfTracker"),
        ("RingRfTracker", "BunchMonitor"),
        ("BunchMonitor", "Plot"),
        ("Profile", "Plot"),
    ];
    for (low, high) in pairs {
        // Supply in reversed order; assembly must still sort low first.
        let tracker = Assembler::assemble(vec![named(high), named(low)]);
        assert_eq!(tracker.pipeline_names(), vec![low, high]);
    }
}

#[test]
fn unknown_types_go_last_preserving_input_order() {
    // Spec: [X(unknown), A(rank 2), Y(unknown)] assembles to [A, X, Y].
    let tracker = Assembler::assemble(vec![named("X"), named("FullRingAndRf"), named("Y")]);
    assert_eq!(tracker.pipeline_names(), vec!["FullRingAndRf", "X", "Y"]);
}

#[test]
fn same_input_order_yields_same_pipeline() {
    let build = || {
        Assembler::assemble(vec![
            named("Zeta"),
            named("Plot"),
            named("Alpha"),
            named("Profile"),
            named("Zeta"),
        ])
        .pipeline_names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
    };
    assert_eq!(build(), build());
    assert_eq!(
        build(),
        vec!["Profile", "Plot", "Zeta", "Alpha", "Zeta"]
    );
}

#[test]
fn append_stage_places_last_even_with_lower_rank() {
    let mut tracker = Assembler::assemble(vec![named("BunchMonitor"), named("Plot")]);
    tracker.append_stage(named("Profile"));
    tracker.append_stage(named("TotalInducedVoltage"));
    assert_eq!(
        tracker.pipeline_names(),
        vec!["BunchMonitor", "Plot", "Profile", "TotalInducedVoltage"]
    );
}

#[test]
fn execution_follows_pipeline_order_not_input_order() {
    let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut tracker = Assembler::assemble(vec![
        counting("Plot", log.clone()),
        counting("Profile", log.clone()),
        counting("RingRfTracker", log.clone()),
    ]);
    let backend = BackendContext::new();
    let mut st = state();
    tracker.track(&backend, &mut st).unwrap();
    assert_eq!(*log.borrow(), vec!["Profile", "RingRfTracker", "Plot"]);
}

#[test]
fn n_successful_turns_count_exactly_n() {
    let backend = BackendContext::new();
    let mut st = state();
    let mut tracker = Assembler::assemble(vec![named("Profile")]);
    for _ in 0..100 {
        tracker.track(&backend, &mut st).unwrap();
    }
    assert_eq!(tracker.turn(), 100);
}

#[test]
fn stage_failure_propagates_and_freezes_the_counter() {
    let backend = BackendContext::new();
    let mut st = state();
    let mut remaining = 2_u32;
    let flaky = FnStage::new("Flaky", move |_ctx: &mut TrackContext<'_>| {
        if remaining == 0 {
            return Err(BeamlineError::UnsupportedMode("flaky".into()));
        }
        remaining -= 1;
        Ok(())
    });
    let mut tracker = Assembler::assemble(vec![Box::new(flaky) as Box<dyn Stage>]);

    tracker.track(&backend, &mut st).unwrap();
    tracker.track(&backend, &mut st).unwrap();
    assert_eq!(tracker.turn(), 2);

    for _ in 0..3 {
        let err = tracker.track(&backend, &mut st);
        assert!(matches!(err, Err(BeamlineError::UnsupportedMode(_))));
        assert_eq!(tracker.turn(), 2, "failed turn must not advance the counter");
    }
}

#[test]
fn later_stage_failure_keeps_earlier_mutations() {
    let backend = BackendContext::new();
    let mut st = state();
    let writer = FnStage::new("Profile", |ctx: &mut TrackContext<'_>| {
        ctx.state.beam.de[0] += 1.0;
        Ok(())
    });
    let bomb = FnStage::new("Plot", |_ctx: &mut TrackContext<'_>| {
        Err(BeamlineError::UnknownOperation("bomb".into()))
    });
    let mut tracker = Assembler::assemble(vec![
        Box::new(writer) as Box<dyn Stage>,
        Box::new(bomb) as Box<dyn Stage>,
    ]);
    assert!(tracker.track(&backend, &mut st).is_err());
    // No rollback of partially-mutated shared state.
    assert_eq!(st.beam.de[0], 1.0);
    assert_eq!(tracker.turn(), 0);
}

#[test]
fn empty_tracker_still_advances() {
    let backend = BackendContext::new();
    let mut st = state();
    let mut tracker = Tracker::new();
    assert!(tracker.is_empty());
    tracker.track(&backend, &mut st).unwrap();
    assert_eq!(tracker.turn(), 1);
}

#[test]
fn stages_receive_the_pre_increment_turn_number() {
    let backend = BackendContext::new();
    let mut st = state();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let seen_inner = seen.clone();
    let probe = FnStage::new("Probe", move |ctx: &mut TrackContext<'_>| {
        seen_inner.borrow_mut().push(ctx.turn);
        Ok(())
    });
    let mut tracker = Assembler::assemble(vec![Box::new(probe) as Box<dyn Stage>]);
    for _ in 0..3 {
        tracker.track(&backend, &mut st).unwrap();
    }
    assert_eq!(*seen.borrow(), vec![0, 1, 2]);
}
