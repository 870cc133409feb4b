//! Software debounce for the limit and control input groups.
//!
//! One shared one-shot timer serves both groups. An input edge arms the
//! timer instead of notifying the host; when the window expires the group
//! is re-sampled and the host is notified only if a signal is still
//! asserted. Edges arriving while the window is open are absorbed by the
//! pending sample.

use axon_hal::Peripherals;
use tracing::trace;

use crate::driver::{Host, OutputDriver};

/// Which input group armed the debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceGroup {
    Limits,
    Control,
}

#[derive(Debug, Default)]
pub struct DebounceState {
    pub(crate) armed: Option<DebounceGroup>,
}

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Open the debounce window for a group. A window already open for
    /// either group absorbs the edge.
    pub(crate) fn debounce_arm(&mut self, group: DebounceGroup) {
        if self.debounce.armed.is_some() {
            return;
        }
        self.debounce.armed = Some(group);
        self.hw
            .debounce_timer_start(self.settings.debounce.window_ms as u32 * 1_000);
        trace!(?group, "debounce window opened");
    }

    /// Debounce window expiry: re-sample the arming group and notify the
    /// host only on a persistent signal.
    pub fn on_debounce_timer(&mut self) {
        let Some(group) = self.debounce.armed.take() else {
            return;
        };
        match group {
            DebounceGroup::Limits => {
                let state = self.limits_state();
                if !state.is_empty() {
                    self.host.limit_event(state);
                }
            }
            DebounceGroup::Control => {
                let state = self.control_state();
                if !state.is_empty() {
                    self.host.control_event(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_common::settings::Settings;
    use axon_common::signals::AxisSignals;
    use crate::rig::SimRig;

    fn debounced_settings() -> Settings {
        let mut s = Settings::default();
        s.debounce.enabled = true;
        s
    }

    #[test]
    fn bounce_that_settles_low_is_suppressed() {
        let mut rig = SimRig::new(&debounced_settings()).unwrap();
        rig.driver.limits_enable(true);

        rig.driver.hw_mut().set_limit_inputs(AxisSignals::X);
        rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
        // Goes away before the window closes.
        rig.driver.hw_mut().set_limit_inputs(AxisSignals::empty());
        rig.run_for_us(40_000);

        assert!(rig.driver.host().limit_events.is_empty());
    }

    #[test]
    fn persistent_limit_reports_once_after_window() {
        let mut rig = SimRig::new(&debounced_settings()).unwrap();
        rig.driver.limits_enable(true);

        rig.driver.hw_mut().set_limit_inputs(AxisSignals::Y);
        let t0 = rig.driver.hw().now_us();
        rig.driver.hw_mut().trigger_limit_edge(AxisSignals::Y);
        rig.run_for_us(40_000);

        let events = &rig.driver.host().limit_events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, AxisSignals::Y);
        // Delivered at the end of the 32 ms window, not on the edge.
        assert_eq!(events[0].0 - t0, 32_000);
    }

    #[test]
    fn edges_inside_open_window_are_absorbed() {
        let mut rig = SimRig::new(&debounced_settings()).unwrap();
        rig.driver.limits_enable(true);

        rig.driver.hw_mut().set_limit_inputs(AxisSignals::X);
        rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
        rig.run_for_us(5_000);
        rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
        rig.run_for_us(5_000);
        rig.driver.hw_mut().trigger_limit_edge(AxisSignals::X);
        rig.run_for_us(50_000);

        assert_eq!(rig.driver.host().limit_events.len(), 1);
    }

    #[test]
    fn control_group_can_debounce_independently() {
        use axon_common::signals::ControlSignals;

        let mut s = Settings::default();
        s.debounce.control_enabled = true;
        let mut rig = SimRig::new(&s).unwrap();

        rig.driver.hw_mut().set_control_inputs(ControlSignals::FEED_HOLD);
        rig.driver
            .hw_mut()
            .trigger_control_edge(ControlSignals::FEED_HOLD);
        rig.run_for_us(40_000);

        let events = &rig.driver.host().control_events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, ControlSignals::FEED_HOLD);
    }
}
