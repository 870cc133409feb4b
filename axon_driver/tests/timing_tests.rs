//! End-to-end timing scenarios driven through the simulation rig.
//!
//! Each test scripts inputs the way a motion core would, runs the
//! interrupt loop over simulated time and asserts on the recorded
//! peripheral timeline.

use axon_common::settings::Settings;
use axon_common::signals::{AxisSignals, ControlSignals, SpindleState, StepCommand};
use axon_driver::{RampPhase, SimRig};

fn step_x(new_block: bool) -> StepCommand {
    StepCommand::new(AxisSignals::X, AxisSignals::X, new_block)
}

#[test]
fn every_step_pulse_has_matching_edges() {
    let mut rig = SimRig::new(&Settings::default()).unwrap();
    rig.driver.set_cycle_period_us(100);
    for i in 0..20 {
        rig.driver.host_mut().push(step_x(i == 0));
    }
    rig.driver.wake_up();
    rig.run_for_us(100 * 21);
    rig.driver.go_idle(true);

    let writes = rig.driver.hw().step_port_writes();
    let asserts = writes.iter().filter(|(_, b)| !b.is_empty()).count();
    let clears = writes.iter().filter(|(_, b)| b.is_empty()).count();
    assert_eq!(asserts, 20);
    assert!(clears >= 20);
    // Port ends released.
    assert!(rig.driver.hw().step_bits().is_empty());

    // Each assert is followed by a clear exactly one pulse width later.
    let mut last_assert = None;
    for (t, bits) in &writes {
        if !bits.is_empty() {
            last_assert = Some(*t);
        } else if let Some(t0) = last_assert.take() {
            assert_eq!(t - t0, 10, "pulse width drifted");
        }
    }
}

#[test]
fn direction_is_written_only_on_block_boundaries() {
    let mut rig = SimRig::new(&Settings::default()).unwrap();
    rig.driver.set_cycle_period_us(100);
    rig.driver.host_mut().push(step_x(true));
    for _ in 0..9 {
        rig.driver.host_mut().push(step_x(false));
    }
    rig.driver.wake_up();
    let t0 = rig.driver.hw().now_us();
    rig.run_for_us(100 * 11);

    let dir_writes: Vec<_> = rig
        .driver
        .hw()
        .dir_port_writes()
        .into_iter()
        .filter(|(t, _)| *t > t0)
        .collect();
    assert_eq!(dir_writes.len(), 1);
    assert_eq!(dir_writes[0].1, AxisSignals::X);
}

#[test]
fn ramp_converges_in_the_expected_tick_count() {
    let mut s = Settings::default();
    s.spindle.ramped = true;
    s.spindle.min_duty = 0;
    let mut rig = SimRig::new(&s).unwrap();

    // 0 to 1000 at 20 per tick, one tick every 2 ms: 50 ticks, 100 ms.
    rig.driver.spindle_set_state(SpindleState::ON, 1000.0);
    rig.run_for_us(98_000);
    assert_eq!(rig.driver.ramp_phase(), RampPhase::RampingUp);
    assert!(rig.driver.hw().pwm_compare() < 1000);

    rig.run_for_us(2_000);
    assert_eq!(rig.driver.hw().pwm_compare(), 1000);
    assert_eq!(rig.driver.ramp_phase(), RampPhase::Steady);
    // Tick source shuts itself off once settled.
    assert!(!rig.driver.hw().systick_is_enabled());
}

#[test]
fn spindle_off_while_off_changes_nothing() {
    let mut rig = SimRig::new(&Settings::default()).unwrap();
    rig.driver.spindle_set_state(SpindleState::empty(), 0.0);
    let compare_writes = rig.driver.hw().pwm_compare_history().len();
    assert!(!rig.driver.hw().pwm_is_enabled());

    rig.driver.spindle_set_state(SpindleState::empty(), 0.0);
    assert!(!rig.driver.hw().pwm_is_enabled());
    // No compare writes and no enable cycling on the repeat.
    assert_eq!(rig.driver.hw().pwm_compare_history().len(), compare_writes);
}

#[test]
fn bouncing_limit_reports_once_at_the_window_end() {
    let mut s = Settings::default();
    s.debounce.enabled = true;
    let mut rig = SimRig::new(&s).unwrap();
    rig.driver.limits_enable(true);

    rig.driver.hw_mut().set_limit_inputs(AxisSignals::X);
    let t0 = rig.driver.hw().now_us();
    rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
    rig.run_for_us(5_000);
    rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
    rig.run_for_us(60_000);

    let events = &rig.driver.host().limit_events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0 - t0, 32_000);
    assert_eq!(events[0].1, AxisSignals::X);
}

#[test]
fn delayed_pulse_orders_match_before_timeout() {
    let mut s = Settings::default();
    s.stepper.pulse_width_us = 8;
    s.stepper.pulse_delay_us = 5;
    let mut rig = SimRig::new(&s).unwrap();
    rig.driver.set_cycle_period_us(300);
    rig.driver.host_mut().push(step_x(true));
    rig.driver.wake_up();
    let t0 = rig.driver.hw().now_us();
    rig.run_for_us(600);

    let writes = rig.driver.hw().step_port_writes();
    let assert_at = writes
        .iter()
        .find(|(_, b)| *b == AxisSignals::X)
        .map(|(t, _)| *t)
        .unwrap();
    let clear_at = writes
        .iter()
        .find(|(t, b)| *t > assert_at && b.is_empty())
        .map(|(t, _)| *t)
        .unwrap();
    assert_eq!(assert_at - (t0 + 300), 5);
    assert_eq!(clear_at - assert_at, 8);
}

#[test]
fn laser_ppi_density_survives_a_block_change() {
    let mut s = Settings::default();
    s.laser.enabled = true;
    s.laser.ppi = 127.0;
    s.laser.pulse_length_us = 30;
    let mut rig = SimRig::new(&s).unwrap();
    assert!(rig.driver.set_laser_mode(true));
    rig.driver.set_cycle_period_us(100);

    // Block 1: 10 steps/mm -> 2 steps per pulse, for 4 steps.
    let mut cmd = StepCommand {
        step_bits: AxisSignals::X,
        dir_bits: AxisSignals::empty(),
        new_block: true,
        spindle_duty: 800,
        steps_per_mm: 10.0,
    };
    rig.driver.host_mut().push(cmd);
    cmd.new_block = false;
    for _ in 0..3 {
        rig.driver.host_mut().push(cmd);
    }
    // Block 2: 20 steps/mm -> 4 steps per pulse, for 8 steps.
    cmd.new_block = true;
    cmd.steps_per_mm = 20.0;
    rig.driver.host_mut().push(cmd);
    cmd.new_block = false;
    for _ in 0..7 {
        rig.driver.host_mut().push(cmd);
    }
    rig.driver.wake_up();
    rig.run_for_us(100 * 13);

    let ons: Vec<u64> = rig
        .driver
        .hw()
        .spindle_enable_history()
        .iter()
        .filter(|(_, on)| *on)
        .map(|(t, _)| *t)
        .collect();
    // Steps 1 and 3 pulse in block 1. The countdown reaches zero right
    // at the boundary, so block 2 pulses on its first step and then
    // every 4 steps.
    assert_eq!(ons.len(), 4);
    assert_eq!(ons[1] - ons[0], 200);
    assert_eq!(ons[3] - ons[2], 400);

    // Every pulse is exactly the configured length.
    let history = rig.driver.hw().spindle_enable_history();
    for (t, on) in &history {
        if *on {
            assert!(history.contains(&(*t + 30, false)));
        }
    }
}

#[test]
fn control_signal_reaches_the_host_with_polarity_applied() {
    let mut s = Settings::default();
    s.control.invert = ControlSignals::SAFETY_DOOR.bits();
    let mut rig = SimRig::new(&s).unwrap();

    // Door input low reads asserted under the invert mask.
    rig.driver
        .hw_mut()
        .trigger_control_edge(ControlSignals::SAFETY_DOOR);
    rig.run_for_us(100);

    let events = &rig.driver.host().control_events;
    assert_eq!(events.len(), 1);
    assert!(events[0].1.contains(ControlSignals::SAFETY_DOOR));
}

#[test]
fn blocking_delay_runs_alongside_a_ramp() {
    let mut s = Settings::default();
    s.spindle.ramped = true;
    let mut rig = SimRig::new(&s).unwrap();
    rig.driver.spindle_set_state(SpindleState::ON, 2000.0);

    let t0 = rig.driver.hw().now_us();
    rig.driver.delay_ms(20, None);
    assert_eq!(rig.driver.hw().now_us() - t0, 20_000);
    // 10 ramp ticks happened during the wait.
    assert_eq!(rig.driver.hw().pwm_compare(), 125 + 10 * 20);
}
