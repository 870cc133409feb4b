//! Millisecond tick scheduler.
//!
//! One periodic tick drives two jobs: the spindle ramp cadence and the
//! delay countdown. The tick source stays disabled whenever both jobs are
//! idle and is re-enabled by whichever one arms first, so an idle system
//! takes no tick interrupts at all.

use axon_hal::Peripherals;

use crate::driver::{DelayCallback, Host, OutputDriver};

impl<P: Peripherals, H: Host> OutputDriver<P, H> {
    /// Tick interrupt entry point.
    pub fn on_systick(&mut self) {
        if self.ramp.active {
            self.ramp.elapsed_ms += 1;
            if self.ramp.elapsed_ms >= self.settings.spindle.ramp_cadence_ms {
                self.ramp.elapsed_ms = 0;
                self.ramp_tick();
            }
        }

        let remaining = self.delay_remaining.load();
        if remaining > 0 {
            self.delay_remaining.store_in_isr(remaining - 1);
            if remaining == 1 {
                if let Some(callback) = self.delay_callback.take() {
                    callback(self);
                }
            }
        }

        if !self.ramp.active && self.delay_remaining.load() == 0 {
            self.hw.systick_disable();
        }
    }

    /// Delay for `ms` milliseconds.
    ///
    /// With a callback the call returns immediately and the callback fires
    /// from tick context when the countdown hits zero; a new request
    /// completes a still-pending callback early before replacing it.
    /// Without a callback the call blocks, pumping the tick
    /// source so ramps keep running while it waits. Zero milliseconds with
    /// a callback runs it on the spot.
    pub fn delay_ms(&mut self, ms: u32, callback: Option<DelayCallback<P, H>>) {
        // A pending callback completes early rather than being dropped,
        // whatever kind of request replaces it.
        if let Some(pending) = self.delay_callback.take() {
            self.delay_remaining.store(&mut self.hw, 0);
            pending(self);
        }
        match callback {
            Some(callback) => {
                if ms == 0 {
                    callback(self);
                } else {
                    self.delay_callback = Some(callback);
                    self.delay_remaining.store(&mut self.hw, ms);
                    self.hw.systick_enable();
                }
            }
            None => {
                if ms == 0 {
                    return;
                }
                self.delay_remaining.store(&mut self.hw, ms);
                self.hw.systick_enable();
                while self.delay_remaining.load() > 0 {
                    self.hw.wait_for_tick();
                    self.on_systick();
                }
            }
        }
    }
}
