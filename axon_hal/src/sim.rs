//! Deterministic software backend.
//!
//! `SimPeripherals` models the ports and timers of the capability seam
//! against a simulated microsecond clock. Every electrical transition is
//! timestamped into an event log, and timer expirations are queued as
//! [`IrqEvent`]s ordered by arrival time and priority, so a harness can
//! route them into the driver exactly the way the hardware vectors would.
//!
//! Tests drive the backend by advancing simulated time, never by real
//! interrupts.

use axon_common::signals::{AxisSignals, ControlSignals, CoolantState};
use heapless::Vec as BoundedVec;
use tracing::{trace, warn};

use crate::{IrqControl, IrqEvent, IrqSource, Peripherals};

/// Systick period [µs].
const TICK_US: u64 = 1_000;

/// Bound on undelivered interrupts; a harness drains between deadlines.
const PENDING_IRQ_CAP: usize = 16;

/// One recorded electrical transition or timer arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// Step output port written.
    StepPort(AxisSignals),
    /// Direction output port written.
    DirPort(AxisSignals),
    /// Stepper disable outputs written.
    StepperDisable(AxisSignals),
    /// Spindle enable output driven.
    SpindleEnable(bool),
    /// Spindle direction output driven.
    SpindleDir(bool),
    /// Coolant output port written.
    CoolantPort(CoolantState),
    /// PWM period register written.
    PwmPeriod(u32),
    /// PWM compare register written.
    PwmCompare(u32),
    /// PWM timer enabled/disabled.
    PwmEnabled(bool),
    /// PWM idle level selected.
    PwmIdleHigh(bool),
    /// A one-shot or periodic timer was armed.
    TimerArmed(IrqSource),
    /// Systick interrupt enabled/disabled.
    SystickEnabled(bool),
}

/// Software implementation of [`Peripherals`] with a timestamped log.
#[derive(Debug)]
pub struct SimPeripherals {
    now_us: u64,
    log: Vec<(u64, SimEvent)>,

    irq_depth: u32,
    max_irq_depth: u32,

    // Output latches
    step_bits: AxisSignals,
    dir_bits: AxisSignals,
    spindle_on: bool,
    spindle_ccw: bool,
    coolant: CoolantState,

    // Input latches (set by test hooks)
    limit_in: AxisSignals,
    control_in: ControlSignals,
    probe_in: bool,

    // Pending edge flags, read-and-cleared by the driver ISRs
    limit_iflags: AxisSignals,
    probe_iflag: bool,
    control_iflags: ControlSignals,
    limit_irqs_on: bool,
    control_irqs_on: bool,
    probe_irq_on: bool,

    // Pulse one-shot
    pulse_load_us: u32,
    pulse_match_us: Option<u32>,
    pulse_timeout_at: Option<u64>,
    pulse_match_at: Option<u64>,
    pulse_match_flag: bool,

    // Cycle timer
    cycle_period_us: u32,
    cycle_running: bool,
    cycle_next_at: u64,

    // Debounce / PPI one-shots
    debounce_at: Option<u64>,
    ppi_at: Option<u64>,

    // Spindle PWM
    pwm_period: u32,
    pwm_compare: u32,
    pwm_enabled: bool,
    pwm_idle_high: bool,

    // Systick
    systick_on: bool,
    next_tick_at: u64,

    pending: BoundedVec<IrqEvent, PENDING_IRQ_CAP>,
}

impl Default for SimPeripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeripherals {
    /// Fresh backend at t = 0 with all outputs idle.
    pub fn new() -> Self {
        Self {
            now_us: 0,
            log: Vec::new(),
            irq_depth: 0,
            max_irq_depth: 0,
            step_bits: AxisSignals::empty(),
            dir_bits: AxisSignals::empty(),
            spindle_on: false,
            spindle_ccw: false,
            coolant: CoolantState::empty(),
            limit_in: AxisSignals::empty(),
            control_in: ControlSignals::empty(),
            probe_in: false,
            limit_iflags: AxisSignals::empty(),
            probe_iflag: false,
            control_iflags: ControlSignals::empty(),
            limit_irqs_on: false,
            control_irqs_on: false,
            probe_irq_on: false,
            pulse_load_us: 0,
            pulse_match_us: None,
            pulse_timeout_at: None,
            pulse_match_at: None,
            pulse_match_flag: false,
            cycle_period_us: 0,
            cycle_running: false,
            cycle_next_at: 0,
            debounce_at: None,
            ppi_at: None,
            pwm_period: 0,
            pwm_compare: 0,
            pwm_enabled: false,
            pwm_idle_high: false,
            systick_on: false,
            next_tick_at: TICK_US,
            pending: BoundedVec::new(),
        }
    }

    fn record(&mut self, event: SimEvent) {
        trace!(t_us = self.now_us, ?event, "sim transition");
        self.log.push((self.now_us, event));
    }

    fn push_irq(&mut self, source: IrqSource) {
        let event = IrqEvent {
            at_us: self.now_us,
            source,
        };
        if self.pending.push(event).is_err() {
            warn!(?source, "pending interrupt queue full; event dropped");
        }
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.due_candidates().into_iter().map(|(at, _)| at).min()
    }

    fn due_candidates(&self) -> Vec<(u64, IrqSource)> {
        let mut out = Vec::with_capacity(6);
        if let Some(at) = self.pulse_match_at {
            out.push((at, IrqSource::PulseTimer));
        }
        if let Some(at) = self.pulse_timeout_at {
            out.push((at, IrqSource::PulseTimer));
        }
        // An unset cycle period would expire at the same instant forever.
        if self.cycle_running && self.cycle_period_us > 0 {
            out.push((self.cycle_next_at, IrqSource::CycleTimer));
        }
        if let Some(at) = self.debounce_at {
            out.push((at, IrqSource::DebounceTimer));
        }
        if let Some(at) = self.ppi_at {
            out.push((at, IrqSource::PpiTimer));
        }
        if self.systick_on {
            out.push((self.next_tick_at, IrqSource::Systick));
        }
        out
    }

    /// Advance simulated time, firing every due expiry in (time, priority)
    /// order. Fired interrupts land in the pending queue; delivery is the
    /// harness's job.
    pub fn advance_to(&mut self, target_us: u64) {
        loop {
            let due = self
                .due_candidates()
                .into_iter()
                .filter(|(at, _)| *at <= target_us)
                .min_by_key(|(at, source)| (*at, source.priority()));
            let Some((at, source)) = due else { break };

            self.now_us = self.now_us.max(at);
            match source {
                IrqSource::PulseTimer => {
                    // Match fires at or before the timeout by construction.
                    if self.pulse_match_at == Some(at) {
                        self.pulse_match_at = None;
                        self.pulse_match_flag = true;
                    } else {
                        self.pulse_timeout_at = None;
                    }
                }
                IrqSource::CycleTimer => {
                    self.cycle_next_at = at + self.cycle_period_us as u64;
                }
                IrqSource::DebounceTimer => self.debounce_at = None,
                IrqSource::PpiTimer => self.ppi_at = None,
                IrqSource::Systick => self.next_tick_at = at + TICK_US,
                IrqSource::LimitPort | IrqSource::ControlPort => unreachable!(),
            }
            self.push_irq(source);
        }
        self.now_us = self.now_us.max(target_us);
    }

    /// Advance by a duration.
    pub fn advance_us(&mut self, dt_us: u64) {
        self.advance_to(self.now_us + dt_us);
    }

    /// Pop the oldest undelivered interrupt.
    pub fn pop_irq(&mut self) -> Option<IrqEvent> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    // ── Test hooks: inputs ──

    /// Set the raw limit input levels (no edge interrupt generated).
    pub fn set_limit_inputs(&mut self, bits: AxisSignals) {
        self.limit_in = bits;
    }

    /// Set the raw control input levels (no edge interrupt generated).
    pub fn set_control_inputs(&mut self, bits: ControlSignals) {
        self.control_in = bits;
    }

    /// Set the raw probe input level (no edge interrupt generated).
    pub fn set_probe_input(&mut self, high: bool) {
        self.probe_in = high;
    }

    /// Raise a limit pin-change interrupt for `changed` axes at the
    /// current raw levels.
    pub fn trigger_limit_edge(&mut self, changed: AxisSignals) {
        if self.limit_irqs_on {
            self.limit_iflags |= changed;
            self.push_irq(IrqSource::LimitPort);
        }
    }

    /// Raise a probe edge on the shared limit port.
    pub fn trigger_probe_edge(&mut self) {
        if self.probe_irq_on {
            self.probe_iflag = true;
            self.push_irq(IrqSource::LimitPort);
        }
    }

    /// Raise a control pin-change interrupt for `changed` inputs.
    pub fn trigger_control_edge(&mut self, changed: ControlSignals) {
        if self.control_irqs_on {
            self.control_iflags |= changed;
            self.push_irq(IrqSource::ControlPort);
        }
    }

    // ── Test hooks: observation ──

    /// Current simulated time [µs].
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Full transition log.
    pub fn events(&self) -> &[(u64, SimEvent)] {
        &self.log
    }

    /// Drop the accumulated transition log (benchmarks and long scenarios).
    pub fn clear_events(&mut self) {
        self.log.clear();
    }

    /// Timestamped step port writes.
    pub fn step_port_writes(&self) -> Vec<(u64, AxisSignals)> {
        self.log
            .iter()
            .filter_map(|&(t, e)| match e {
                SimEvent::StepPort(bits) => Some((t, bits)),
                _ => None,
            })
            .collect()
    }

    /// Timestamped direction port writes.
    pub fn dir_port_writes(&self) -> Vec<(u64, AxisSignals)> {
        self.log
            .iter()
            .filter_map(|&(t, e)| match e {
                SimEvent::DirPort(bits) => Some((t, bits)),
                _ => None,
            })
            .collect()
    }

    /// Timestamped PWM compare register writes.
    pub fn pwm_compare_history(&self) -> Vec<(u64, u32)> {
        self.log
            .iter()
            .filter_map(|&(t, e)| match e {
                SimEvent::PwmCompare(ticks) => Some((t, ticks)),
                _ => None,
            })
            .collect()
    }

    /// Timestamped spindle enable transitions.
    pub fn spindle_enable_history(&self) -> Vec<(u64, bool)> {
        self.log
            .iter()
            .filter_map(|&(t, e)| match e {
                SimEvent::SpindleEnable(on) => Some((t, on)),
                _ => None,
            })
            .collect()
    }

    /// Deepest interrupt-mask nesting observed.
    pub fn max_irq_mask_depth(&self) -> u32 {
        self.max_irq_depth
    }

    /// Whether the PWM timer output is currently enabled.
    pub fn pwm_is_enabled(&self) -> bool {
        self.pwm_enabled
    }

    /// Current PWM compare register value.
    pub fn pwm_compare(&self) -> u32 {
        self.pwm_compare
    }

    /// Whether the systick interrupt is currently enabled.
    pub fn systick_is_enabled(&self) -> bool {
        self.systick_on
    }

    /// Current step output latch.
    pub fn step_bits(&self) -> AxisSignals {
        self.step_bits
    }

    /// Current direction output latch.
    pub fn dir_bits(&self) -> AxisSignals {
        self.dir_bits
    }
}

impl IrqControl for SimPeripherals {
    fn irq_mask(&mut self) {
        self.irq_depth += 1;
        self.max_irq_depth = self.max_irq_depth.max(self.irq_depth);
    }

    fn irq_unmask(&mut self) {
        debug_assert!(self.irq_depth > 0, "unbalanced interrupt unmask");
        self.irq_depth = self.irq_depth.saturating_sub(1);
    }
}

impl Peripherals for SimPeripherals {
    fn write_step_bits(&mut self, bits: AxisSignals) {
        self.step_bits = bits;
        self.record(SimEvent::StepPort(bits));
    }

    fn write_dir_bits(&mut self, bits: AxisSignals) {
        self.dir_bits = bits;
        self.record(SimEvent::DirPort(bits));
    }

    fn set_stepper_disable(&mut self, bits: AxisSignals) {
        self.record(SimEvent::StepperDisable(bits));
    }

    fn set_spindle_enable(&mut self, on: bool) {
        self.spindle_on = on;
        self.record(SimEvent::SpindleEnable(on));
    }

    fn set_spindle_dir(&mut self, ccw: bool) {
        self.spindle_ccw = ccw;
        self.record(SimEvent::SpindleDir(ccw));
    }

    fn write_coolant_bits(&mut self, bits: CoolantState) {
        self.coolant = bits;
        self.record(SimEvent::CoolantPort(bits));
    }

    fn read_spindle_enable(&mut self) -> bool {
        self.spindle_on
    }

    fn read_spindle_dir(&mut self) -> bool {
        self.spindle_ccw
    }

    fn read_coolant_bits(&mut self) -> CoolantState {
        self.coolant
    }

    fn read_limit_bits(&mut self) -> AxisSignals {
        self.limit_in
    }

    fn read_control_bits(&mut self) -> ControlSignals {
        self.control_in
    }

    fn read_probe(&mut self) -> bool {
        self.probe_in
    }

    fn limit_irq_status(&mut self) -> (AxisSignals, bool) {
        let flags = (self.limit_iflags, self.probe_iflag);
        self.limit_iflags = AxisSignals::empty();
        self.probe_iflag = false;
        flags
    }

    fn control_irq_status(&mut self) -> ControlSignals {
        core::mem::take(&mut self.control_iflags)
    }

    fn limit_irqs_enable(&mut self, on: bool) {
        self.limit_irqs_on = on;
    }

    fn control_irqs_enable(&mut self, on: bool) {
        self.control_irqs_on = on;
    }

    fn configure_limit_irqs(&mut self, _invert: AxisSignals, _pullup_disable: AxisSignals) {
        // Edge polarity is implicit in the test hooks; nothing to model.
    }

    fn configure_control_irqs(&mut self, _invert: ControlSignals, _pullup_disable: ControlSignals) {}

    fn configure_probe_irq(&mut self, _falling_edge: bool, _pull_up: bool) {
        self.probe_irq_on = true;
    }

    fn pulse_timer_configure(&mut self, load_us: u32, match_us: Option<u32>) {
        self.pulse_load_us = load_us;
        self.pulse_match_us = match_us;
    }

    fn pulse_timer_start(&mut self) {
        self.pulse_timeout_at = Some(self.now_us + self.pulse_load_us as u64);
        self.pulse_match_at = self
            .pulse_match_us
            .map(|m| self.now_us + (self.pulse_load_us - m) as u64);
        self.record(SimEvent::TimerArmed(IrqSource::PulseTimer));
    }

    fn pulse_timer_take_match(&mut self) -> bool {
        core::mem::take(&mut self.pulse_match_flag)
    }

    fn cycle_timer_set_period_us(&mut self, period_us: u32) {
        self.cycle_period_us = period_us;
    }

    fn cycle_timer_start(&mut self) {
        self.cycle_running = true;
        self.cycle_next_at = self.now_us + self.cycle_period_us as u64;
        self.record(SimEvent::TimerArmed(IrqSource::CycleTimer));
    }

    fn cycle_timer_stop(&mut self) {
        self.cycle_running = false;
    }

    fn debounce_timer_start(&mut self, window_us: u32) {
        self.debounce_at = Some(self.now_us + window_us as u64);
        self.record(SimEvent::TimerArmed(IrqSource::DebounceTimer));
    }

    fn ppi_timer_start(&mut self, pulse_length_us: u32) {
        self.ppi_at = Some(self.now_us + pulse_length_us as u64);
        self.record(SimEvent::TimerArmed(IrqSource::PpiTimer));
    }

    fn pwm_set_period(&mut self, ticks: u32) {
        self.pwm_period = ticks;
        self.record(SimEvent::PwmPeriod(ticks));
    }

    fn pwm_set_compare(&mut self, ticks: u32) {
        self.pwm_compare = ticks;
        self.record(SimEvent::PwmCompare(ticks));
    }

    fn pwm_enable(&mut self) {
        self.pwm_enabled = true;
        self.record(SimEvent::PwmEnabled(true));
    }

    fn pwm_disable(&mut self) {
        self.pwm_enabled = false;
        self.record(SimEvent::PwmEnabled(false));
    }

    fn pwm_set_idle_high(&mut self, high: bool) {
        self.pwm_idle_high = high;
        self.record(SimEvent::PwmIdleHigh(high));
    }

    fn systick_enable(&mut self) {
        if !self.systick_on {
            self.systick_on = true;
            self.next_tick_at = (self.now_us / TICK_US + 1) * TICK_US;
            self.record(SimEvent::SystickEnabled(true));
        }
    }

    fn systick_disable(&mut self) {
        if self.systick_on {
            self.systick_on = false;
            self.record(SimEvent::SystickEnabled(false));
        }
    }

    fn wait_for_tick(&mut self) {
        let boundary = (self.now_us / TICK_US + 1) * TICK_US;
        self.advance_to(boundary);
        // The tick that woke us is observed by the caller, not queued.
        if let Some(pos) = self
            .pending
            .iter()
            .position(|e| e.source == IrqSource::Systick && e.at_us == boundary)
        {
            self.pending.remove(pos);
        }
    }
}
