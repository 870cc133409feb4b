//! Driver capability negotiation record.
//!
//! Announces which optional driver modes are active. The record is derived
//! when a settings snapshot is applied and consulted once by the motion
//! core at configuration time; it never changes mid-motion.

use bitflags::bitflags;

bitflags! {
    /// Optional driver modes, consulted once at configuration time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriverCaps: u16 {
        /// PWM (variable speed) spindle control.
        const VARIABLE_SPINDLE = 0x0001;
        /// Spindle duty changes are ramped rather than applied directly.
        const RAMPED_SPINDLE   = 0x0002;
        /// Spindle direction output present.
        const SPINDLE_DIR      = 0x0004;
        /// Step pulses start with a configurable delay after direction.
        const STEP_PULSE_DELAY = 0x0008;
        /// Software debounce of limit/control inputs.
        const SOFTWARE_DEBOUNCE = 0x0010;
        /// Laser PPI pulse modulation.
        const LASER_PPI        = 0x0020;
        /// Mist coolant output present.
        const MIST_CONTROL     = 0x0040;
        /// Probe input uses an internal pull-up.
        const PROBE_PULL_UP    = 0x0080;
        /// Limit inputs use internal pull-ups.
        const LIMITS_PULL_UP   = 0x0100;
        /// Control inputs use internal pull-ups.
        const CONTROL_PULL_UP  = 0x0200;
    }
}

impl Default for DriverCaps {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_start_empty() {
        assert!(DriverCaps::default().is_empty());
    }

    #[test]
    fn caps_compose() {
        let caps = DriverCaps::VARIABLE_SPINDLE | DriverCaps::STEP_PULSE_DELAY;
        assert!(caps.contains(DriverCaps::VARIABLE_SPINDLE));
        assert!(!caps.contains(DriverCaps::SOFTWARE_DEBOUNCE));
    }
}
