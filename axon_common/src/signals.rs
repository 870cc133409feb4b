//! Signal bitsets exchanged between the motion core and the output driver.
//!
//! All groups are fixed-width bitsets whose bit-to-physical-pin mapping is
//! owned by the peripheral capability layer. Signals are produced freshly
//! per read and XORed against the configured invert mask before being
//! reported upward; they are never persisted.

use bitflags::bitflags;
use static_assertions::const_assert;

bitflags! {
    /// Per-axis signal bits.
    ///
    /// The step, direction and limit groups all share this layout, so the
    /// same invert-mask arithmetic applies to each.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxisSignals: u8 {
        /// X axis.
        const X = 1 << 0;
        /// Y axis.
        const Y = 1 << 1;
        /// Z axis.
        const Z = 1 << 2;
    }
}

impl AxisSignals {
    /// Mask covering every configured axis.
    pub const ALL_AXES: Self =
        Self::from_bits_truncate(Self::X.bits() | Self::Y.bits() | Self::Z.bits());
}

impl Default for AxisSignals {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Control button / door signal bits, triggered = 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlSignals: u8 {
        /// Reset / abort input.
        const RESET = 1 << 0;
        /// Feed hold input.
        const FEED_HOLD = 1 << 1;
        /// Cycle start input.
        const CYCLE_START = 1 << 2;
        /// Safety door ajar input.
        const SAFETY_DOOR = 1 << 3;
    }
}

impl Default for ControlSignals {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Spindle output state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpindleState: u8 {
        /// Spindle energized.
        const ON = 1 << 0;
        /// Counter-clockwise rotation selected.
        const CCW = 1 << 1;
    }
}

impl Default for SpindleState {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Coolant output state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CoolantState: u8 {
        /// Flood coolant output.
        const FLOOD = 1 << 0;
        /// Mist coolant output.
        const MIST = 1 << 1;
    }
}

impl Default for CoolantState {
    fn default() -> Self {
        Self::empty()
    }
}

/// One step command, delivered by the upstream motion executor per cycle.
///
/// Direction outputs may legally change only when [`new_block`] is set,
/// i.e. on the first command of a new motion block.
///
/// [`new_block`]: StepCommand::new_block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepCommand {
    /// Axes to step this cycle.
    pub step_bits: AxisSignals,
    /// Direction outputs for the executing block.
    pub dir_bits: AxisSignals,
    /// True only for the first command of a new motion block.
    pub new_block: bool,
    /// Spindle duty programmed for the executing block. Consumed by the
    /// laser/PPI pulse modulator only; ignored otherwise.
    pub spindle_duty: u16,
    /// Steps per millimetre of the executing block. Consumed by the
    /// laser/PPI pulse modulator only; ignored otherwise.
    pub steps_per_mm: f32,
}

// Copied by value on every cycle interrupt; keep it register-friendly.
const_assert!(core::mem::size_of::<StepCommand>() <= 16);

impl StepCommand {
    /// Plain motion command with no laser payload.
    pub fn new(step_bits: AxisSignals, dir_bits: AxisSignals, new_block: bool) -> Self {
        Self {
            step_bits,
            dir_bits,
            new_block,
            spindle_duty: 0,
            steps_per_mm: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_invert_is_involutive() {
        let invert = AxisSignals::X | AxisSignals::Z;
        let raw = AxisSignals::Y | AxisSignals::Z;
        assert_eq!((raw ^ invert) ^ invert, raw);
    }

    #[test]
    fn all_axes_mask_covers_every_axis() {
        assert!(AxisSignals::ALL_AXES.contains(AxisSignals::X));
        assert!(AxisSignals::ALL_AXES.contains(AxisSignals::Y));
        assert!(AxisSignals::ALL_AXES.contains(AxisSignals::Z));
    }

    #[test]
    fn step_command_defaults_carry_no_laser_payload() {
        let cmd = StepCommand::new(AxisSignals::X, AxisSignals::empty(), true);
        assert_eq!(cmd.spindle_duty, 0);
        assert_eq!(cmd.steps_per_mm, 0.0);
        assert!(cmd.new_block);
    }
}
