//! Owned driver context and lifecycle.
//!
//! All mutable driver state lives in [`OutputDriver`], constructed once at
//! startup and passed by reference into every operation and interrupt
//! entry point. There are no singletons and no allocation after
//! construction.

use axon_common::caps::DriverCaps;
use axon_common::layout::{self, LayoutError, Region};
use axon_common::settings::{Settings, SettingsError};
use axon_common::signals::{AxisSignals, ControlSignals, CoolantState, SpindleState, StepCommand};
use axon_hal::{IsrCell, Peripherals};
use thiserror::Error;
use tracing::{debug, info};

use crate::debounce::DebounceState;
use crate::laser::LaserPpi;
use crate::pulse::PulseMode;
use crate::spindle::{RampState, SpindlePwm};

/// Startup failure; halts bring-up rather than running half-configured.
#[derive(Debug, Error)]
pub enum InitError {
    /// Reserved nonvolatile regions overlap.
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// The initial settings snapshot was rejected.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Completion callback for a non-blocking delay. Fires from tick-scheduler
/// context.
pub type DelayCallback<P, H> = fn(&mut OutputDriver<P, H>);

/// The upstream side of the driver: the motion executor and the
/// fault/limit/control handler.
pub trait Host {
    /// Pull the next step command. Called once per cycle-timer interrupt;
    /// `None` when no motion is executing.
    fn next_step_command(&mut self) -> Option<StepCommand>;

    /// A clean (post-invert, post-debounce) limit signal set.
    fn limit_event(&mut self, signals: AxisSignals);

    /// A clean control signal set.
    fn control_event(&mut self, signals: ControlSignals);

    /// PWM-duty-from-RPM computation point, supplied by the core. The
    /// driver clamps the result into the configured duty domain.
    fn duty_from_rpm(&mut self, rpm: f32) -> u32;
}

/// The interrupt-driven output timing subsystem.
///
/// Generic over the peripheral capability backend `P` and the upstream
/// host `H`. The `on_*` methods are the interrupt entry points; everything
/// else runs in synchronous context.
pub struct OutputDriver<P: Peripherals, H: Host> {
    pub(crate) hw: P,
    pub(crate) host: H,
    pub(crate) settings: Settings,
    caps: DriverCaps,

    // Lookup state re-derived on every applied snapshot
    pub(crate) step_invert: AxisSignals,
    pub(crate) dir_invert: AxisSignals,
    pub(crate) limit_invert: AxisSignals,
    pub(crate) control_invert: ControlSignals,
    pub(crate) coolant_invert: CoolantState,
    pub(crate) pulse_mode: PulseMode,

    // Pulse generator
    pub(crate) pending_step_bits: AxisSignals,

    // Spindle
    pub(crate) pwm: Option<SpindlePwm>,
    pub(crate) pwm_enabled: bool,
    pub(crate) ramp: RampState,

    // Inputs
    pub(crate) probe_invert: bool,
    pub(crate) probe_triggered: IsrCell<bool>,
    pub(crate) debounce: DebounceState,

    // Tick scheduler
    pub(crate) delay_remaining: IsrCell<u32>,
    pub(crate) delay_callback: Option<DelayCallback<P, H>>,

    // Laser PPI
    pub(crate) laser: LaserPpi,
    pub(crate) laser_mode: bool,
}

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Construct an unconfigured driver. [`init`](Self::init) must run
    /// before any output is produced.
    pub fn new(hw: P, host: H) -> Self {
        Self {
            hw,
            host,
            settings: Settings::default(),
            caps: DriverCaps::empty(),
            step_invert: AxisSignals::empty(),
            dir_invert: AxisSignals::empty(),
            limit_invert: AxisSignals::empty(),
            control_invert: ControlSignals::empty(),
            coolant_invert: CoolantState::empty(),
            pulse_mode: PulseMode::Immediate,
            pending_step_bits: AxisSignals::empty(),
            pwm: None,
            pwm_enabled: false,
            ramp: RampState::default(),
            probe_invert: false,
            probe_triggered: IsrCell::new(false),
            debounce: DebounceState::default(),
            delay_remaining: IsrCell::new(0),
            delay_callback: None,
            laser: LaserPpi::default(),
            laser_mode: false,
        }
    }

    /// Bring the driver up: check the reserved nonvolatile layout, apply
    /// the initial snapshot and force all outputs to their idle state.
    ///
    /// A layout overlap is fatal; startup halts rather than risking
    /// corrupt storage.
    pub fn init(&mut self, settings: &Settings, regions: &[Region]) -> Result<(), InitError> {
        layout::verify_disjoint(regions)?;
        self.settings_changed(settings)?;

        self.go_idle(true);
        self.spindle_set_state(SpindleState::empty(), 0.0);
        self.set_coolant(CoolantState::empty());

        info!(caps = ?self.caps, "output driver initialized");
        Ok(())
    }

    /// Apply a new settings snapshot.
    ///
    /// The snapshot is validated as a whole first; a rejected snapshot
    /// leaves the running configuration completely untouched.
    pub fn settings_changed(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.settings = *settings;

        self.step_invert = AxisSignals::from_bits_truncate(settings.stepper.step_invert);
        self.dir_invert = AxisSignals::from_bits_truncate(settings.stepper.dir_invert);
        self.limit_invert = AxisSignals::from_bits_truncate(settings.limits.invert);
        self.control_invert = ControlSignals::from_bits_truncate(settings.control.invert);
        self.coolant_invert = CoolantState::from_bits_truncate(settings.coolant.invert);

        // Spindle PWM domain
        self.pwm = settings
            .spindle
            .variable
            .then(|| SpindlePwm::derive(&settings.spindle));
        if let Some(pwm) = self.pwm {
            self.hw.pwm_set_period(pwm.period);
            self.hw.pwm_set_idle_high(settings.spindle.pwm_invert);
        } else {
            self.ramp = RampState::default();
        }

        // Pulse timer: delayed mode arms a match event at the delay
        // boundary, immediate mode is plain timeout.
        let width = settings.stepper.pulse_width_us as u32;
        let delay = settings.stepper.pulse_delay_us as u32;
        if delay > 0 {
            self.pulse_mode = PulseMode::Delayed;
            self.hw.pulse_timer_configure(width + delay, Some(width));
        } else {
            self.pulse_mode = PulseMode::Immediate;
            self.hw.pulse_timer_configure(width, None);
        }

        // Input groups
        self.hw.configure_limit_irqs(
            self.limit_invert,
            AxisSignals::from_bits_truncate(settings.limits.disable_pullup),
        );
        self.hw.configure_control_irqs(
            self.control_invert,
            ControlSignals::from_bits_truncate(settings.control.disable_pullup),
        );
        self.hw.control_irqs_enable(true);
        self.probe_configure(false);

        // Hold de-energized axes, energize the rest.
        let hold = AxisSignals::from_bits_truncate(settings.stepper.deenergize);
        self.enable_steppers(AxisSignals::ALL_AXES.difference(hold));

        if !settings.laser.enabled {
            self.laser_mode = false;
        }

        self.caps = Self::derive_caps(settings, self.pwm.is_some());
        debug!(caps = ?self.caps, "settings snapshot applied");
        Ok(())
    }

    fn derive_caps(settings: &Settings, variable: bool) -> DriverCaps {
        let mut caps = DriverCaps::SPINDLE_DIR
            | DriverCaps::MIST_CONTROL
            | DriverCaps::STEP_PULSE_DELAY
            | DriverCaps::LIMITS_PULL_UP
            | DriverCaps::CONTROL_PULL_UP;
        if settings.probe.pull_up {
            caps |= DriverCaps::PROBE_PULL_UP;
        }
        if variable {
            caps |= DriverCaps::VARIABLE_SPINDLE;
            if settings.spindle.ramped {
                caps |= DriverCaps::RAMPED_SPINDLE;
            }
        }
        if settings.debounce.enabled || settings.debounce.control_enabled {
            caps |= DriverCaps::SOFTWARE_DEBOUNCE;
        }
        if settings.laser.enabled {
            caps |= DriverCaps::LASER_PPI;
        }
        caps
    }

    /// Capability negotiation record for the active snapshot.
    pub fn caps(&self) -> DriverCaps {
        self.caps
    }

    /// Peripheral backend access (observation hooks of the software
    /// backend, mostly).
    pub fn hw(&self) -> &P {
        &self.hw
    }

    /// Mutable peripheral backend access.
    pub fn hw_mut(&mut self) -> &mut P {
        &mut self.hw
    }

    /// Upstream host access.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable upstream host access.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // ── Stepper lifecycle ──

    /// Energize drivers and start the cycle timer. The upstream executor
    /// will be polled for one command per cycle interrupt.
    pub fn wake_up(&mut self) {
        self.laser.next_pulse = 0;
        self.enable_steppers(AxisSignals::ALL_AXES);
        self.hw.cycle_timer_start();
    }

    /// Stop issuing cycles. A pulse-timer expiry that is already in
    /// flight still clears the step outputs and is harmless.
    pub fn go_idle(&mut self, clear_signals: bool) {
        self.hw.cycle_timer_stop();
        if clear_signals {
            self.set_step_outputs(AxisSignals::empty());
            self.set_dir_outputs(AxisSignals::empty());
        }
    }

    /// Set the period between step cycle interrupts.
    pub fn set_cycle_period_us(&mut self, period_us: u32) {
        self.hw.cycle_timer_set_period_us(period_us);
    }

    /// Cycle timer interrupt: pull one command and start its pulse.
    pub fn on_cycle_timer(&mut self) {
        if let Some(cmd) = self.host.next_step_command() {
            if self.laser_mode {
                self.start_pulse_ppi(&cmd);
            } else {
                self.start_pulse(&cmd);
            }
        }
    }

    /// Energize the given axes (post-invert pattern goes to the disable
    /// outputs).
    pub fn enable_steppers(&mut self, enable: AxisSignals) {
        let invert = AxisSignals::from_bits_truncate(self.settings.stepper.enable_invert);
        self.hw.set_stepper_disable(enable ^ invert);
    }

    /// Enable or disable hard-limit pin-change interrupts. Honors the
    /// `hard_enabled` setting.
    pub fn limits_enable(&mut self, on: bool) {
        self.hw
            .limit_irqs_enable(on && self.settings.limits.hard_enabled);
    }

    // ── Coolant ──

    /// Drive the coolant outputs.
    pub fn set_coolant(&mut self, mode: CoolantState) {
        self.hw.write_coolant_bits(mode ^ self.coolant_invert);
    }

    /// Read back the logical coolant state.
    pub fn coolant_state(&mut self) -> CoolantState {
        self.hw.read_coolant_bits() ^ self.coolant_invert
    }

    // ── Output helpers ──

    /// Write the step port, applying the configured invert mask.
    pub(crate) fn set_step_outputs(&mut self, bits: AxisSignals) {
        self.hw.write_step_bits(bits ^ self.step_invert);
    }

    /// Write the direction port, applying the configured invert mask.
    pub(crate) fn set_dir_outputs(&mut self, bits: AxisSignals) {
        self.hw.write_dir_bits(bits ^ self.dir_invert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_hal::sim::SimPeripherals;
    use crate::rig::RecordingHost;

    fn driver() -> OutputDriver<SimPeripherals, RecordingHost> {
        OutputDriver::new(SimPeripherals::new(), RecordingHost::default())
    }

    #[test]
    fn init_halts_on_overlapping_regions() {
        let mut d = driver();
        let regions = [
            Region {
                name: "settings",
                address: 0,
                size: 512,
            },
            Region {
                name: "driver",
                address: 256,
                size: 512,
            },
        ];
        assert!(matches!(
            d.init(&Settings::default(), &regions),
            Err(InitError::Layout(_))
        ));
    }

    #[test]
    fn rejected_snapshot_leaves_config_untouched() {
        let mut d = driver();
        d.init(&Settings::default(), &[]).unwrap();
        let caps_before = d.caps();
        let mode_before = d.pulse_mode;

        let mut bad = Settings::default();
        bad.stepper.pulse_width_us = 0;
        bad.debounce.enabled = true; // would otherwise add a capability
        assert!(d.settings_changed(&bad).is_err());
        assert_eq!(d.caps(), caps_before);
        assert_eq!(d.pulse_mode, mode_before);
    }

    #[test]
    fn caps_follow_snapshot_features() {
        let mut d = driver();
        let mut s = Settings::default();
        s.spindle.ramped = true;
        s.debounce.enabled = true;
        s.laser.enabled = true;
        d.init(&s, &[]).unwrap();
        let caps = d.caps();
        assert!(caps.contains(DriverCaps::VARIABLE_SPINDLE));
        assert!(caps.contains(DriverCaps::RAMPED_SPINDLE));
        assert!(caps.contains(DriverCaps::SOFTWARE_DEBOUNCE));
        assert!(caps.contains(DriverCaps::LASER_PPI));

        s.spindle.variable = false;
        s.spindle.ramped = false;
        s.debounce.enabled = false;
        s.laser.enabled = false;
        d.settings_changed(&s).unwrap();
        let caps = d.caps();
        assert!(!caps.contains(DriverCaps::VARIABLE_SPINDLE));
        assert!(!caps.contains(DriverCaps::SOFTWARE_DEBOUNCE));
    }

    #[test]
    fn delayed_mode_selected_by_pulse_delay() {
        let mut d = driver();
        let mut s = Settings::default();
        s.stepper.pulse_delay_us = 3;
        d.init(&s, &[]).unwrap();
        assert_eq!(d.pulse_mode, PulseMode::Delayed);

        s.stepper.pulse_delay_us = 0;
        d.settings_changed(&s).unwrap();
        assert_eq!(d.pulse_mode, PulseMode::Immediate);
    }
}
