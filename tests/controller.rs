// COSCHED SERVICE CONTROLLER TESTS
// SCHMITT-TRIGGER DETECTION (PURE), THEN CONTROLLER STEPS AGAINST A BUILT SchedState

mod common;

use std::time::Instant;

use common::*;
use cosched::controller::{self, Reclaim};
use cosched::cores::CoreList;
use cosched::engine::{self, TickCtx};
use cosched::job::JobState;
use cosched::monitor::UtilWindow;
use cosched::scheduler::SchedState;
use cosched::tuning::{
    detect_placement, should_print_telemetry, LcsPlacement, SchedConfig,
    DEFAULT_HIGH_PCT, DEFAULT_LOW_PCT,
};

const LOW: f64 = DEFAULT_LOW_PCT;
const HIGH: f64 = DEFAULT_HIGH_PCT;

// === DETECTION (SCHMITT TRIGGER) ===

// CORE-0 WINDOW SIZED TO THE TRACE, OLDEST SAMPLE FIRST
fn core0(samples: &[f64]) -> UtilWindow {
    let mut w = UtilWindow::new(1, samples.len().max(2));
    for &s in samples {
        w.push(&[s]).unwrap();
    }
    w
}

#[test]
fn isolated_to_shared_on_full_high_window() {
    let r = detect_placement(LcsPlacement::Isolated, &core0(&[90.0, 90.0]), LOW, HIGH, true);
    assert_eq!(r, LcsPlacement::Shared);
}

#[test]
fn high_threshold_is_inclusive() {
    let r = detect_placement(LcsPlacement::Isolated, &core0(&[HIGH, HIGH]), LOW, HIGH, false);
    assert_eq!(r, LcsPlacement::Shared);
}

#[test]
fn single_spike_does_not_grow_service() {
    let r = detect_placement(LcsPlacement::Isolated, &core0(&[30.0, 95.0]), LOW, HIGH, true);
    assert_eq!(r, LcsPlacement::Isolated);
}

#[test]
fn shared_to_isolated_needs_quiet_window_and_waiting_job() {
    let quiet = core0(&[LOW, 12.0]);
    assert_eq!(
        detect_placement(LcsPlacement::Shared, &quiet, LOW, HIGH, true),
        LcsPlacement::Isolated
    );
    // NOTHING TO HAND CORE 1 TO
    assert_eq!(
        detect_placement(LcsPlacement::Shared, &quiet, LOW, HIGH, false),
        LcsPlacement::Shared
    );
}

#[test]
fn dead_zone_holds_either_placement() {
    let mid = core0(&[41.0, 69.0]);
    assert_eq!(detect_placement(LcsPlacement::Shared, &mid, LOW, HIGH, true), LcsPlacement::Shared);
    assert_eq!(detect_placement(LcsPlacement::Isolated, &mid, LOW, HIGH, true), LcsPlacement::Isolated);
}

#[test]
fn partial_window_never_transitions() {
    let mut w = UtilWindow::new(1, 3);
    assert_eq!(detect_placement(LcsPlacement::Shared, &w, LOW, HIGH, true), LcsPlacement::Shared);
    w.push(&[95.0]).unwrap();
    w.push(&[95.0]).unwrap();
    assert_eq!(detect_placement(LcsPlacement::Isolated, &w, LOW, HIGH, true), LcsPlacement::Isolated);
    w.push(&[95.0]).unwrap();
    assert_eq!(detect_placement(LcsPlacement::Isolated, &w, LOW, HIGH, true), LcsPlacement::Shared);
}

#[test]
fn telemetry_every_fourth_tick_unless_changed() {
    assert!(should_print_telemetry(4, false, false));
    assert!(!should_print_telemetry(5, false, false));
    assert!(should_print_telemetry(5, true, false));
    assert!(should_print_telemetry(5, false, true));
}

#[test]
fn config_rejects_inverted_thresholds() {
    let mut cfg = SchedConfig::default();
    assert!(cfg.validate().is_ok());
    cfg.low_pct = 80.0;
    assert!(cfg.validate().is_err());
    cfg.low_pct = 40.0;
    cfg.cores = 2;
    assert!(cfg.validate().is_err());
}

#[test]
fn config_rejects_more_cores_than_online() {
    let cfg = config(&[], None);
    assert!(cfg.check_online(4).is_ok());
    assert!(cfg.check_online(8).is_ok());
    let err = cfg.check_online(2).unwrap_err();
    assert!(format!("{:#}", err).contains("4 CORES REQUESTED, ONLY 2 ONLINE"));
}

#[test]
fn state_rejects_invalid_config() {
    let mut cfg = config(&[], None);
    cfg.window = 0;
    assert!(SchedState::new(vec![single("dedup", 55)], &cfg).is_err());
}

// === CONTROLLER STEPS ===

fn fill(state: &mut SchedState, cpu0: f64) {
    for _ in 0..2 {
        state.window.push(&[cpu0, 0.0, 0.0, 0.0]).unwrap();
    }
}

fn step(
    state: &mut SchedState,
    cfg: &SchedConfig,
    world: &Shared,
    fresh: bool,
    reclaim: Reclaim,
) -> Option<LcsPlacement> {
    let mut rt = FakeRuntime(world.clone());
    let mut svc = FakeService(world.clone());
    let mut ctx = TickCtx {
        state,
        runtime: &mut rt,
        service: &mut svc,
        config: cfg,
        now: Instant::now(),
        fresh_sample: fresh,
    };
    controller::step(&mut ctx, reclaim).unwrap()
}

fn admit(state: &mut SchedState, cfg: &SchedConfig, world: &Shared, name: &str, cores: &[usize]) {
    let mut rt = FakeRuntime(world.clone());
    let mut svc = FakeService(world.clone());
    let mut ctx = TickCtx {
        state,
        runtime: &mut rt,
        service: &mut svc,
        config: cfg,
        now: Instant::now(),
        fresh_sample: true,
    };
    engine::admit(&mut ctx, name, CoreList::from_cores(cores.iter().copied())).unwrap();
}

#[test]
fn partial_window_skips_decision() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(vec![single("dedup", 55)], &cfg);
    state.window.push(&[5.0, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(step(&mut state, &cfg, &w, true, Reclaim::Preempt), None);
    assert_eq!(state.lcs, LcsPlacement::Shared);
    assert!(w.borrow().service.is_empty());
}

#[test]
fn stale_sample_skips_decision() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(vec![single("dedup", 55)], &cfg);
    fill(&mut state, 5.0);
    assert_eq!(step(&mut state, &cfg, &w, false, Reclaim::Preempt), None);
    assert_eq!(step(&mut state, &cfg, &w, true, Reclaim::Preempt), Some(LcsPlacement::Isolated));
    assert_eq!(w.borrow().service, vec![CoreList::from_cores([0])]);
    assert_eq!(state.placement_changes, 1);
}

#[test]
fn quiet_service_without_waiting_jobs_keeps_both_cores() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(vec![], &cfg);
    fill(&mut state, 1.0);
    assert_eq!(step(&mut state, &cfg, &w, true, Reclaim::Preempt), None);
    assert_eq!(state.lcs, LcsPlacement::Shared);
}

#[test]
fn reclaim_by_preemption_pauses_every_elastic_core_occupant() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(
        vec![single("dedup", 55), single("canneal", 165), single("vips", 60)],
        &cfg,
    );
    state.lcs = LcsPlacement::Isolated;
    admit(&mut state, &cfg, &w, "dedup", &[1]);
    admit(&mut state, &cfg, &w, "canneal", &[1]);
    admit(&mut state, &cfg, &w, "vips", &[3]);
    fill(&mut state, 90.0);

    assert_eq!(step(&mut state, &cfg, &w, true, Reclaim::Preempt), Some(LcsPlacement::Shared));
    assert_eq!(state.registry.job("dedup").unwrap().state(), JobState::Paused);
    assert_eq!(state.registry.job("canneal").unwrap().state(), JobState::Paused);
    assert_eq!(state.registry.job("vips").unwrap().state(), JobState::Running);
    assert_eq!(state.preemptions, 2);
    assert_eq!(w.borrow().service.last(), Some(&CoreList::from_cores([0, 1])));
    assert_eq!(engine::free_cores(&state), vec![2]);
}

#[test]
fn reclaim_by_repin_shrinks_wide_job() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(vec![wide("canneal", 3, 240)], &cfg);
    state.lcs = LcsPlacement::Isolated;
    admit(&mut state, &cfg, &w, "canneal", &[1, 2, 3]);
    fill(&mut state, 90.0);

    assert_eq!(step(&mut state, &cfg, &w, true, Reclaim::Repin), Some(LcsPlacement::Shared));
    let job = state.registry.job("canneal").unwrap();
    assert_eq!(job.state(), JobState::Running);
    assert_eq!(job.cores().as_slice(), &[2, 3]);
    assert_eq!(w.borrow().cpuset["canneal"], CoreList::from_cores([2, 3]));
    assert_eq!(state.preemptions, 0);
}

#[test]
fn reclaim_by_repin_moves_job_pinned_only_to_core_one() {
    let cfg = config(&[], None);
    let w = Shared::default();
    let mut state = state_with(vec![single("dedup", 35)], &cfg);
    state.lcs = LcsPlacement::Isolated;
    admit(&mut state, &cfg, &w, "dedup", &[1]);
    fill(&mut state, 95.0);

    step(&mut state, &cfg, &w, true, Reclaim::Repin);
    assert_eq!(state.registry.job("dedup").unwrap().cores().as_slice(), &[2, 3]);
}
