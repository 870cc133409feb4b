//! Spindle output control: on/off/direction, direct PWM duty, and the
//! tick-driven ramp.
//!
//! Duty values live in PWM timer ticks throughout. RPM enters exactly
//! once, at [`Host::duty_from_rpm`](crate::driver::Host::duty_from_rpm),
//! and the result is clamped into the configured `[min, max]` range so a
//! commanded speed can never overshoot the hardware window.

use axon_common::settings::SpindleSettings;
use axon_common::signals::SpindleState;
use axon_hal::Peripherals;
use tracing::trace;

use crate::driver::{Host, OutputDriver};

/// Derived PWM duty domain for the active snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpindlePwm {
    /// PWM period [ticks].
    pub period: u32,
    /// Duty written when the spindle is commanded off.
    pub off_value: u32,
    /// Lowest controllable duty; also the ramp seed.
    pub min_value: u32,
    /// Highest controllable duty.
    pub max_value: u32,
}

impl SpindlePwm {
    pub fn derive(s: &SpindleSettings) -> Self {
        Self {
            period: s.pwm_period,
            off_value: s.off_duty,
            min_value: s.min_duty,
            max_value: s.max_duty,
        }
    }

    /// Clamp a computed duty into the controllable range.
    pub fn clamp(&self, duty: u32) -> u32 {
        duty.clamp(self.min_value, self.max_value)
    }
}

/// Observable position of the ramp relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    /// PWM output disabled.
    Off,
    RampingUp,
    RampingDown,
    /// Enabled and settled at the target duty.
    Steady,
}

/// Ramp progress, advanced from the tick scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct RampState {
    /// A ramp is in flight; the tick scheduler keeps itself enabled.
    pub active: bool,
    /// Duty currently on the compare register.
    pub current: i32,
    pub target: i32,
    /// Signed per-tick increment.
    pub step: i32,
    /// Milliseconds since the last ramp tick.
    pub elapsed_ms: u32,
}

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    fn spindle_on(&mut self) {
        self.hw
            .set_spindle_enable(!self.settings.spindle.on_invert);
    }

    pub(crate) fn spindle_off(&mut self) {
        self.hw.set_spindle_enable(self.settings.spindle.on_invert);
    }

    fn spindle_dir(&mut self, ccw: bool) {
        self.hw
            .set_spindle_dir(ccw != self.settings.spindle.ccw_invert);
    }

    /// Apply a commanded spindle state and speed in one call.
    ///
    /// With a variable spindle, off or zero RPM routes through the
    /// off-duty path; otherwise direction is set before the duty so the
    /// output never spins the wrong way at speed.
    pub fn spindle_set_state(&mut self, state: SpindleState, rpm: f32) {
        if self.pwm.is_some() {
            if !state.contains(SpindleState::ON) || rpm == 0.0 {
                self.spindle_set_speed(self.pwm_off_value());
                self.spindle_off();
            } else {
                self.spindle_dir(state.contains(SpindleState::CCW));
                let duty = self.host.duty_from_rpm(rpm);
                let duty = self.pwm.map(|p| p.clamp(duty)).unwrap_or(duty);
                self.spindle_set_speed(duty);
            }
        } else if state.contains(SpindleState::ON) {
            self.spindle_dir(state.contains(SpindleState::CCW));
            self.spindle_on();
        } else {
            self.spindle_off();
        }
    }

    /// Read back the logical spindle state from the outputs.
    pub fn spindle_get_state(&mut self) -> SpindleState {
        let mut state = SpindleState::empty();
        let on = if self.pwm.is_some() {
            self.pwm_enabled || self.hw.read_spindle_enable() != self.settings.spindle.on_invert
        } else {
            self.hw.read_spindle_enable() != self.settings.spindle.on_invert
        };
        if on {
            state |= SpindleState::ON;
        }
        if self.hw.read_spindle_dir() != self.settings.spindle.ccw_invert {
            state |= SpindleState::CCW;
        }
        state
    }

    /// Re-apply speed while running (feed/speed override path).
    pub fn spindle_update_rpm(&mut self, rpm: f32) {
        if self.pwm.is_some() {
            let duty = if rpm == 0.0 {
                self.pwm_off_value()
            } else {
                let duty = self.host.duty_from_rpm(rpm);
                self.pwm.map(|p| p.clamp(duty)).unwrap_or(duty)
            };
            self.spindle_set_speed(duty);
        }
    }

    /// Where the ramp is right now.
    pub fn ramp_phase(&self) -> RampPhase {
        if !self.pwm_enabled {
            RampPhase::Off
        } else if !self.ramp.active || self.ramp.current == self.ramp.target {
            RampPhase::Steady
        } else if self.ramp.step > 0 {
            RampPhase::RampingUp
        } else {
            RampPhase::RampingDown
        }
    }

    fn pwm_off_value(&self) -> u32 {
        self.pwm.map(|p| p.off_value).unwrap_or(0)
    }

    /// Load a new duty, ramped or direct per the active snapshot.
    pub(crate) fn spindle_set_speed(&mut self, duty: u32) {
        if self.settings.spindle.ramped {
            self.spindle_set_speed_ramped(duty);
        } else {
            self.spindle_set_speed_direct(duty);
        }
    }

    fn spindle_set_speed_direct(&mut self, duty: u32) {
        let off_value = self.pwm_off_value();
        if duty == off_value {
            if self.settings.spindle.disable_with_zero_speed {
                self.spindle_off();
            }
            if self.settings.spindle.always_on {
                self.hw.pwm_set_compare(off_value);
                self.hw.pwm_enable();
                self.pwm_enabled = true;
            } else if self.pwm_enabled {
                self.hw.pwm_disable();
                self.pwm_enabled = false;
            }
        } else {
            self.hw.pwm_set_compare(duty);
            if !self.pwm_enabled {
                self.spindle_on();
                self.hw.pwm_enable();
                self.pwm_enabled = true;
            }
        }
    }

    fn spindle_set_speed_ramped(&mut self, duty: u32) {
        let off_value = self.pwm_off_value();
        if duty == off_value {
            // Ramp down to zero; the final tick disables the output.
            self.ramp.target = off_value as i32;
            self.ramp.step = -(self.settings.spindle.ramp_step as i32);
        } else {
            if !self.pwm_enabled {
                // Seed at the bottom of the controllable range so the
                // ramp always sweeps from a known, spinnable duty.
                let seed = self.pwm.map(|p| p.min_value).unwrap_or(0) as i32;
                self.ramp.current = seed;
                self.hw.pwm_set_compare(seed as u32);
                self.spindle_on();
                self.hw.pwm_enable();
                self.pwm_enabled = true;
            }
            self.ramp.target = duty as i32;
            self.ramp.step = if self.ramp.target >= self.ramp.current {
                self.settings.spindle.ramp_step as i32
            } else {
                -(self.settings.spindle.ramp_step as i32)
            };
        }
        if self.ramp.target == self.ramp.current {
            self.ramp.active = false;
            return;
        }
        self.ramp.elapsed_ms = 0;
        self.ramp.active = true;
        self.hw.systick_enable();
    }

    /// One ramp increment. Runs from the tick scheduler at the configured
    /// cadence while a ramp is active.
    pub(crate) fn ramp_tick(&mut self) {
        let next = self.ramp.current + self.ramp.step;
        // Clamp, never overshoot.
        self.ramp.current = if self.ramp.step > 0 {
            next.min(self.ramp.target)
        } else {
            next.max(self.ramp.target)
        };
        self.hw.pwm_set_compare(self.ramp.current as u32);
        trace!(duty = self.ramp.current, "ramp tick");

        if self.ramp.current == self.ramp.target {
            self.ramp.active = false;
            let off_value = self.pwm_off_value() as i32;
            if self.ramp.current == off_value {
                if self.settings.spindle.disable_with_zero_speed {
                    self.spindle_off();
                }
                if !self.settings.spindle.always_on {
                    self.hw.pwm_disable();
                    self.pwm_enabled = false;
                }
            }
        }
    }
}
