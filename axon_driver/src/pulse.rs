//! Step pulse generation.
//!
//! One hardware one-shot timer bounds every pulse. In immediate mode the
//! step outputs assert when the pulse starts and the timeout clears them.
//! In delayed mode the same timer carries a second, earlier match event:
//! the match asserts the buffered step bits after the direction setup
//! delay, the timeout clears them. The two events share one interrupt
//! entry point and are told apart by the backend's match flag.

use axon_common::signals::{AxisSignals, StepCommand};
use axon_hal::Peripherals;

use crate::driver::{Host, OutputDriver};

/// How step edges relate to the pulse timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseMode {
    /// Assert on start, clear on timeout.
    Immediate,
    /// Buffer on start, assert on match, clear on timeout.
    Delayed,
}

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Begin one step pulse for a cycle command.
    ///
    /// Direction outputs are written only on a block boundary; an empty
    /// step set writes nothing and arms nothing.
    pub fn start_pulse(&mut self, cmd: &StepCommand) {
        if cmd.new_block {
            self.set_dir_outputs(cmd.dir_bits);
        }
        if cmd.step_bits.is_empty() {
            return;
        }
        match self.pulse_mode {
            PulseMode::Immediate => {
                self.set_step_outputs(cmd.step_bits);
            }
            PulseMode::Delayed => {
                self.pending_step_bits = cmd.step_bits;
            }
        }
        self.hw.pulse_timer_start();
    }

    /// Pulse timer interrupt entry point, shared by the match and timeout
    /// events.
    pub fn on_pulse_timer(&mut self) {
        if self.hw.pulse_timer_take_match() {
            let bits = self.pending_step_bits;
            self.set_step_outputs(bits);
        } else {
            self.set_step_outputs(AxisSignals::empty());
        }
    }
}
