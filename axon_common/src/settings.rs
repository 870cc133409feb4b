//! Driver settings snapshot: TOML loading and whole-snapshot validation.
//!
//! The snapshot is validated as a unit before anything is applied. A
//! rejected snapshot is reported via [`SettingsError`] and must leave the
//! running configuration untouched; partial application is never allowed.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default software debounce window.
pub const DEBOUNCE_WINDOW_MS_DEFAULT: u16 = 32;

/// Upper bound on the total pulse span (width + delay). A span beyond this
/// would overlap the shortest supported cycle period.
pub const MAX_PULSE_SPAN_US: u32 = 1_000;

/// Settings validation / loading error.
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    /// An unsupported or out-of-range value; the snapshot is rejected
    /// as a whole and nothing is applied.
    #[error("rejected setting: {0}")]
    Rejected(String),
    /// File read error.
    #[error("failed to read {path}: {reason}")]
    Io {
        /// Path of the settings file.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
    /// TOML parse error.
    #[error("settings parse error: {0}")]
    Parse(String),
}

// ─── Snapshot Sections ──────────────────────────────────────────────

/// Step/direction output timing and polarity.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StepperSettings {
    /// Duration a step output stays asserted per step [µs]. Must be > 0.
    pub pulse_width_us: u16,
    /// Delay between direction settle and step assertion [µs].
    /// 0 selects immediate pulse mode.
    pub pulse_delay_us: u16,
    /// Step output invert mask (axis bit layout).
    pub step_invert: u8,
    /// Direction output invert mask (axis bit layout).
    pub dir_invert: u8,
    /// Stepper disable output invert mask (axis bit layout).
    pub enable_invert: u8,
    /// Axes left de-energized after configuration (axis bit layout).
    pub deenergize: u8,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            pulse_width_us: 10,
            pulse_delay_us: 0,
            step_invert: 0,
            dir_invert: 0,
            enable_invert: 0,
            deenergize: 0,
        }
    }
}

/// Spindle PWM duty domain and ramp behaviour.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SpindleSettings {
    /// Variable (PWM) spindle enabled. When false the spindle is plain
    /// on/off control and the duty domain is ignored.
    pub variable: bool,
    /// PWM period [timer ticks].
    pub pwm_period: u32,
    /// Minimum duty of the controllable range [timer ticks].
    pub min_duty: u32,
    /// Maximum duty of the controllable range [timer ticks].
    pub max_duty: u32,
    /// Duty loaded when the spindle is commanded off [timer ticks].
    pub off_duty: u32,
    /// Invert the spindle enable output.
    pub on_invert: bool,
    /// Invert the spindle direction output.
    pub ccw_invert: bool,
    /// Invert the PWM output level.
    pub pwm_invert: bool,
    /// Disable the enable output once a ramp-down reaches zero.
    pub disable_with_zero_speed: bool,
    /// Keep the PWM timer running at `off_duty` instead of disabling it.
    pub always_on: bool,
    /// Ramp duty changes instead of applying them directly.
    pub ramped: bool,
    /// Duty change per ramp tick [timer ticks]. Fixed magnitude.
    pub ramp_step: u32,
    /// Ramp tick cadence [ms].
    pub ramp_cadence_ms: u32,
}

impl Default for SpindleSettings {
    fn default() -> Self {
        Self {
            variable: true,
            pwm_period: 5_000,
            min_duty: 125,
            max_duty: 5_000,
            off_duty: 0,
            on_invert: false,
            ccw_invert: false,
            pwm_invert: false,
            disable_with_zero_speed: true,
            always_on: false,
            ramped: false,
            ramp_step: 20,
            ramp_cadence_ms: 2,
        }
    }
}

/// Limit input group configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LimitsSettings {
    /// Hard limit interrupts enabled.
    pub hard_enabled: bool,
    /// Limit input invert mask (axis bit layout).
    pub invert: u8,
    /// Pull-down instead of pull-up per axis (axis bit layout).
    pub disable_pullup: u8,
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            hard_enabled: true,
            invert: 0,
            disable_pullup: 0,
        }
    }
}

/// Control input group configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Control input invert mask (control bit layout).
    pub invert: u8,
    /// Pull-down instead of pull-up per input (control bit layout).
    pub disable_pullup: u8,
}

/// Coolant output configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CoolantSettings {
    /// Coolant output invert mask (coolant bit layout).
    pub invert: u8,
}

/// Probe input configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Probe input is normal-high.
    pub invert: bool,
    /// Probe input pulled up rather than down.
    pub pull_up: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            invert: false,
            pull_up: true,
        }
    }
}

/// Software debounce configuration for the limit/control input groups.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
    /// Software debounce of the limit input group.
    pub enabled: bool,
    /// Also debounce the control input group.
    pub control_enabled: bool,
    /// Quiet window after a raw edge before trusting the input state [ms].
    pub window_ms: u16,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            control_enabled: false,
            window_ms: DEBOUNCE_WINDOW_MS_DEFAULT,
        }
    }
}

/// Laser/PPI pulse modulation configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Laser PPI mode available.
    pub enabled: bool,
    /// Pulses per inch equivalent rate.
    pub ppi: f32,
    /// Fixed laser pulse length [µs].
    pub pulse_length_us: u32,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ppi: 600.0,
            pulse_length_us: 1_500,
        }
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────

/// Complete driver settings snapshot.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Step/direction timing and polarity.
    pub stepper: StepperSettings,
    /// Spindle duty domain and ramp behaviour.
    pub spindle: SpindleSettings,
    /// Limit input group.
    pub limits: LimitsSettings,
    /// Control input group.
    pub control: ControlSettings,
    /// Coolant outputs.
    pub coolant: CoolantSettings,
    /// Probe input.
    pub probe: ProbeSettings,
    /// Software debounce.
    pub debounce: DebounceSettings,
    /// Laser/PPI modulation.
    pub laser: LaserSettings,
}

impl Settings {
    /// Parse a snapshot from TOML text. The result is parsed only, not
    /// yet validated.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Load a snapshot from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate the whole snapshot.
    ///
    /// Any failure rejects the snapshot as a unit; callers must not apply
    /// any part of a rejected snapshot.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.stepper.pulse_width_us == 0 {
            return Err(SettingsError::Rejected("pulse_width_us must be > 0".into()));
        }
        let span = self.stepper.pulse_width_us as u32 + self.stepper.pulse_delay_us as u32;
        if span > MAX_PULSE_SPAN_US {
            return Err(SettingsError::Rejected(format!(
                "pulse span {span}µs exceeds {MAX_PULSE_SPAN_US}µs"
            )));
        }

        if self.spindle.variable {
            if self.spindle.pwm_period == 0 {
                return Err(SettingsError::Rejected("pwm_period must be > 0".into()));
            }
            if self.spindle.min_duty >= self.spindle.max_duty {
                return Err(SettingsError::Rejected(
                    "spindle min_duty must be below max_duty".into(),
                ));
            }
            if self.spindle.max_duty > self.spindle.pwm_period {
                return Err(SettingsError::Rejected(
                    "spindle max_duty exceeds pwm_period".into(),
                ));
            }
            if self.spindle.off_duty > self.spindle.max_duty {
                return Err(SettingsError::Rejected(
                    "spindle off_duty exceeds max_duty".into(),
                ));
            }
            if self.spindle.ramped && (self.spindle.ramp_step == 0 || self.spindle.ramp_cadence_ms == 0)
            {
                return Err(SettingsError::Rejected(
                    "ramped spindle needs non-zero ramp_step and ramp_cadence_ms".into(),
                ));
            }
        }

        if (self.debounce.enabled || self.debounce.control_enabled) && self.debounce.window_ms == 0 {
            return Err(SettingsError::Rejected(
                "debounce window_ms must be > 0 when enabled".into(),
            ));
        }

        if self.laser.enabled {
            if !(self.laser.ppi > 0.0) {
                return Err(SettingsError::Rejected("laser ppi must be > 0".into()));
            }
            if self.laser.pulse_length_us == 0 {
                return Err(SettingsError::Rejected(
                    "laser pulse_length_us must be > 0".into(),
                ));
            }
        }

        Ok(())
    }
}
