//! Pulse generator micro-benchmark.
//!
//! Measures throughput of the hot interrupt paths on the software
//! backend:
//! - cycle handler + pulse start (immediate mode)
//! - cycle handler + pulse start (delayed mode)
//! - ramp tick
//! - laser PPI cycle handler

use criterion::{Criterion, criterion_group, criterion_main};

use axon_common::settings::Settings;
use axon_common::signals::{AxisSignals, SpindleState, StepCommand};
use axon_driver::SimRig;

fn step_cmd(i: u64) -> StepCommand {
    StepCommand::new(AxisSignals::X | AxisSignals::Y, AxisSignals::Y, i == 0)
}

fn bench_pulse_immediate(c: &mut Criterion) {
    let mut rig = SimRig::new(&Settings::default()).unwrap();
    let mut i = 0u64;

    c.bench_function("pulse_start_immediate", |b| {
        b.iter(|| {
            rig.driver.host_mut().push(step_cmd(i));
            rig.driver.on_cycle_timer();
            rig.driver.hw_mut().advance_us(20);
            rig.run_for_us(0);
            i += 1;
            if i % 4096 == 0 {
                rig.driver.hw_mut().clear_events();
            }
        });
    });
}

fn bench_pulse_delayed(c: &mut Criterion) {
    let mut settings = Settings::default();
    settings.stepper.pulse_delay_us = 4;
    let mut rig = SimRig::new(&settings).unwrap();
    let mut i = 0u64;

    c.bench_function("pulse_start_delayed", |b| {
        b.iter(|| {
            rig.driver.host_mut().push(step_cmd(i));
            rig.driver.on_cycle_timer();
            rig.driver.hw_mut().advance_us(20);
            rig.run_for_us(0);
            i += 1;
            if i % 4096 == 0 {
                rig.driver.hw_mut().clear_events();
            }
        });
    });
}

fn bench_ramp_tick(c: &mut Criterion) {
    let mut settings = Settings::default();
    settings.spindle.ramped = true;
    let mut rig = SimRig::new(&settings).unwrap();
    rig.driver.spindle_set_state(SpindleState::ON, 4000.0);
    let mut i = 0u64;

    c.bench_function("systick_with_active_ramp", |b| {
        b.iter(|| {
            // Bounce the target so the ramp never settles.
            if i % 128 == 0 {
                let rpm = if (i / 128) % 2 == 0 { 300.0 } else { 4000.0 };
                rig.driver.spindle_update_rpm(rpm);
                rig.driver.hw_mut().clear_events();
            }
            rig.driver.hw_mut().advance_us(1_000);
            rig.run_for_us(0);
            i += 1;
        });
    });
}

fn bench_laser_ppi(c: &mut Criterion) {
    let mut settings = Settings::default();
    settings.laser.enabled = true;
    settings.laser.ppi = 600.0;
    settings.laser.pulse_length_us = 5;
    let mut rig = SimRig::new(&settings).unwrap();
    rig.driver.set_laser_mode(true);
    let mut i = 0u64;

    c.bench_function("pulse_start_ppi", |b| {
        b.iter(|| {
            let mut cmd = step_cmd(i);
            cmd.spindle_duty = 900;
            cmd.steps_per_mm = 80.0;
            rig.driver.host_mut().push(cmd);
            rig.driver.on_cycle_timer();
            rig.driver.hw_mut().advance_us(20);
            rig.run_for_us(0);
            i += 1;
            if i % 4096 == 0 {
                rig.driver.hw_mut().clear_events();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_pulse_immediate,
    bench_pulse_delayed,
    bench_ramp_tick,
    bench_laser_ppi,
);
criterion_main!(benches);
