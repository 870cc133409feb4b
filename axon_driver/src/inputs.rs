//! Input sampling and the pin-change interrupt dispatchers.
//!
//! The limit port shares its interrupt with the probe input; the
//! dispatcher reads and clears the pending set once, then fans out. Probe
//! state is captured on the edge into an interrupt-safe cell so synchronous
//! readers never race the pin.

use axon_common::signals::{AxisSignals, ControlSignals};
use axon_hal::Peripherals;
use tracing::trace;

use crate::debounce::DebounceGroup;
use crate::driver::{Host, OutputDriver};

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Sample the limit inputs, post-invert.
    pub fn limits_state(&mut self) -> AxisSignals {
        self.hw.read_limit_bits() ^ self.limit_invert
    }

    /// Sample the control inputs, post-invert.
    pub fn control_state(&mut self) -> ControlSignals {
        self.hw.read_control_bits() ^ self.control_invert
    }

    /// Last probe state captured on a probe edge.
    pub fn probe_state(&self) -> bool {
        self.probe_triggered.load()
    }

    /// Select the probe sense for the next probing move and refresh the
    /// cached state. `is_probe_away` flips the triggering direction.
    pub fn probe_configure(&mut self, is_probe_away: bool) {
        self.probe_invert = self.settings.probe.invert ^ is_probe_away;
        self.hw
            .configure_probe_irq(self.probe_invert, self.settings.probe.pull_up);
        let raw = self.hw.read_probe();
        let invert = self.probe_invert;
        self.probe_triggered.store(&mut self.hw, raw ^ invert);
    }

    /// Limit-port interrupt: one status read serves the axis inputs and
    /// the probe.
    pub fn on_limit_irq(&mut self) {
        let (axes, probe) = self.hw.limit_irq_status();

        if probe {
            let raw = self.hw.read_probe();
            self.probe_triggered.store_in_isr(raw ^ self.probe_invert);
            trace!(triggered = raw ^ self.probe_invert, "probe edge");
        }

        if !axes.is_empty() {
            if self.settings.debounce.enabled {
                self.debounce_arm(DebounceGroup::Limits);
            } else {
                let state = self.limits_state();
                self.host.limit_event(state);
            }
        }
    }

    /// Control-port interrupt.
    pub fn on_control_irq(&mut self) {
        let pending = self.hw.control_irq_status();
        if pending.is_empty() {
            return;
        }
        if self.settings.debounce.control_enabled {
            self.debounce_arm(DebounceGroup::Control);
        } else {
            let state = self.control_state();
            self.host.control_event(state);
        }
    }
}
