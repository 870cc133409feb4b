//! Laser PPI pulse modulation.
//!
//! In laser mode the spindle enable output fires in fixed-length pulses
//! at a programmed pulses-per-inch density instead of staying on. The
//! cycle handler counts steps; every `steps_per_pulse` cycles it turns
//! the laser on and arms a one-shot that turns it off again after the
//! configured pulse length.

use axon_common::signals::StepCommand;
use axon_hal::Peripherals;
use tracing::debug;

use crate::driver::{Host, OutputDriver};
use crate::pulse::PulseMode;

const MM_PER_INCH: f32 = 25.4;

/// PPI counters for the executing block.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaserPpi {
    /// Steps between laser pulses for the executing block.
    pub(crate) steps_per_pulse: u32,
    /// Steps remaining until the next pulse.
    pub(crate) next_pulse: u32,
    /// Duty last programmed; a change resets the pulse phase.
    pub(crate) current_duty: u32,
}

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Switch PPI modulation on or off. Refused (returning `false`) when
    /// the active snapshot does not provide the laser capability.
    pub fn set_laser_mode(&mut self, on: bool) -> bool {
        if on && !self.settings.laser.enabled {
            return false;
        }
        self.laser_mode = on;
        self.laser = LaserPpi::default();
        debug!(on, "laser mode");
        true
    }

    /// Whether PPI modulation is active.
    pub fn laser_mode(&self) -> bool {
        self.laser_mode
    }

    /// Cycle handler for laser mode: PPI bookkeeping, then the normal
    /// step pulse.
    pub(crate) fn start_pulse_ppi(&mut self, cmd: &StepCommand) {
        if cmd.new_block {
            self.set_dir_outputs(cmd.dir_bits);
            let spp = ((cmd.steps_per_mm * MM_PER_INCH / self.settings.laser.ppi) as u32).max(1);
            // Rescale an in-flight countdown so pulse density stays
            // continuous across block boundaries.
            if self.laser.steps_per_pulse != 0 && self.laser.next_pulse != 0 {
                self.laser.next_pulse = self.laser.next_pulse * spp / self.laser.steps_per_pulse;
            }
            self.laser.steps_per_pulse = spp;
        }

        // Duty feeds the PWM carrier only; the enable output stays under
        // PPI control.
        let duty = cmd.spindle_duty as u32;
        if duty != self.laser.current_duty {
            self.hw.pwm_set_compare(duty);
            if !self.pwm_enabled {
                self.hw.pwm_enable();
                self.pwm_enabled = true;
            }
            self.laser.current_duty = duty;
            self.laser.next_pulse = 0;
        }

        if cmd.step_bits.is_empty() {
            return;
        }

        if self.laser.next_pulse == 0 {
            self.laser.next_pulse = self.laser.steps_per_pulse - 1;
            if self.laser.current_duty != self.pwm.map(|p| p.off_value).unwrap_or(0) {
                self.spindle_on_for_pulse();
                self.hw
                    .ppi_timer_start(self.settings.laser.pulse_length_us);
            }
        } else {
            self.laser.next_pulse -= 1;
        }

        match self.pulse_mode {
            PulseMode::Immediate => self.set_step_outputs(cmd.step_bits),
            PulseMode::Delayed => self.pending_step_bits = cmd.step_bits,
        }
        self.hw.pulse_timer_start();
    }

    fn spindle_on_for_pulse(&mut self) {
        self.hw
            .set_spindle_enable(!self.settings.spindle.on_invert);
    }

    /// PPI one-shot expiry: end the laser pulse.
    pub fn on_ppi_timer(&mut self) {
        self.spindle_off();
    }
}
