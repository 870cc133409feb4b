//! Simulation rig: the driver wired to the software peripheral backend
//! with a recording host on top.
//!
//! The rig owns the interrupt dispatch loop the hardware vector table
//! would normally provide. Pending interrupts are drained in priority
//! order and routed to the matching `on_*` entry point; between
//! interrupts, simulated time jumps straight to the next timer deadline.

use std::collections::VecDeque;

use axon_common::settings::Settings;
use axon_common::signals::{AxisSignals, ControlSignals, StepCommand};
use axon_hal::sim::SimPeripherals;
use axon_hal::{IrqEvent, IrqSource};

use crate::driver::{Host, InitError, OutputDriver};

/// Host stub that feeds a scripted command queue and records every
/// notification with its delivery timestamp.
#[derive(Debug)]
pub struct RecordingHost {
    queue: VecDeque<StepCommand>,
    /// Simulated time of the interrupt being dispatched.
    pub now_us: u64,
    /// Limit notifications with delivery times.
    pub limit_events: Vec<(u64, AxisSignals)>,
    /// Control notifications with delivery times.
    pub control_events: Vec<(u64, ControlSignals)>,
    /// Linear RPM-to-duty mapping used by `duty_from_rpm`.
    pub duty_per_rpm: f32,
    /// Scratch counter for delay-callback tests.
    pub marks: u32,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            now_us: 0,
            limit_events: Vec::new(),
            control_events: Vec::new(),
            duty_per_rpm: 1.0,
            marks: 0,
        }
    }
}

impl RecordingHost {
    /// Queue one command for the cycle handler to pull.
    pub fn push(&mut self, cmd: StepCommand) {
        self.queue.push_back(cmd);
    }

    /// Queued commands not yet pulled.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The duty `duty_from_rpm` would produce, for assertions.
    pub fn duty_for(&self, rpm: f32) -> u32 {
        (rpm * self.duty_per_rpm) as u32
    }
}

impl Host for RecordingHost {
    fn next_step_command(&mut self) -> Option<StepCommand> {
        self.queue.pop_front()
    }

    fn limit_event(&mut self, signals: AxisSignals) {
        self.limit_events.push((self.now_us, signals));
    }

    fn control_event(&mut self, signals: ControlSignals) {
        self.control_events.push((self.now_us, signals));
    }

    fn duty_from_rpm(&mut self, rpm: f32) -> u32 {
        (rpm * self.duty_per_rpm) as u32
    }
}

/// Nonvolatile layout used by the rig; mirrors a small EEPROM split
/// between core settings and driver-reserved space.
pub fn default_layout() -> [axon_common::layout::Region; 2] {
    [
        axon_common::layout::Region {
            name: "core-settings",
            address: 0,
            size: 1024,
        },
        axon_common::layout::Region {
            name: "driver-reserved",
            address: 1024,
            size: 256,
        },
    ]
}

/// A fully initialized driver on simulated peripherals.
pub struct SimRig {
    pub driver: OutputDriver<SimPeripherals, RecordingHost>,
}

impl SimRig {
    /// Build and initialize a rig from a settings snapshot.
    pub fn new(settings: &Settings) -> Result<Self, InitError> {
        let mut driver = OutputDriver::new(SimPeripherals::new(), RecordingHost::default());
        driver.init(settings, &default_layout())?;
        Ok(Self { driver })
    }

    /// Run the interrupt loop until simulated time reaches `target_us`.
    pub fn run_until(&mut self, target_us: u64) {
        loop {
            if let Some(ev) = self.driver.hw_mut().pop_irq() {
                self.dispatch(ev);
                continue;
            }
            match self.driver.hw().next_deadline() {
                Some(t) if t <= target_us => self.driver.hw_mut().advance_to(t),
                _ => break,
            }
        }
        self.driver.hw_mut().advance_to(target_us);
        while let Some(ev) = self.driver.hw_mut().pop_irq() {
            self.dispatch(ev);
        }
    }

    /// Run for `dt_us` of simulated time from now.
    pub fn run_for_us(&mut self, dt_us: u64) {
        let target = self.driver.hw().now_us() + dt_us;
        self.run_until(target);
    }

    fn dispatch(&mut self, ev: IrqEvent) {
        self.driver.host_mut().now_us = ev.at_us;
        match ev.source {
            IrqSource::PulseTimer => self.driver.on_pulse_timer(),
            IrqSource::CycleTimer => self.driver.on_cycle_timer(),
            IrqSource::DebounceTimer => self.driver.on_debounce_timer(),
            IrqSource::PpiTimer => self.driver.on_ppi_timer(),
            IrqSource::Systick => self.driver.on_systick(),
            IrqSource::LimitPort => self.driver.on_limit_irq(),
            IrqSource::ControlPort => self.driver.on_control_irq(),
        }
    }
}
