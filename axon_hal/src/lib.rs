//! AXON Peripheral Capability Layer
//!
//! Defines the hardware seam the output driver is written against, plus a
//! deterministic software backend for tests and the demo harness.
//!
//! # Module Structure
//!
//! - [`lib`](self) - `Peripherals` / `IrqControl` traits, `IsrCell`, `IrqSource`
//! - [`sim`] - `SimPeripherals` software backend with timestamped event log
//!
//! All capability calls are infallible synchronous register-style writes;
//! validation happens upstream when a settings snapshot is applied, never
//! in the hot path.

use core::cell::Cell;
use core::ops::{BitAnd, BitOr};

use axon_common::signals::{AxisSignals, ControlSignals, CoolantState};

pub mod sim;

// ─── Interrupt Sources ──────────────────────────────────────────────

/// Interrupt sources the driver handles.
///
/// Priority ordering is part of the timing contract: the pulse-clear
/// interrupt must preempt the cycle-issue interrupt so a clean falling
/// edge is always delivered before the next rising edge is requested.
/// Debounce, PPI and systick timing tolerance is orders of magnitude
/// looser, so they run below both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqSource {
    /// One-shot step pulse timer (match or timeout).
    PulseTimer,
    /// Periodic step cycle timer.
    CycleTimer,
    /// One-shot debounce window timer.
    DebounceTimer,
    /// One-shot laser PPI pulse-length timer.
    PpiTimer,
    /// 1 ms system tick.
    Systick,
    /// Limit/probe input group edge.
    LimitPort,
    /// Control input group edge.
    ControlPort,
}

impl IrqSource {
    /// Dispatch priority; lower values preempt higher ones.
    pub const fn priority(self) -> u8 {
        match self {
            IrqSource::PulseTimer => 0,
            IrqSource::CycleTimer => 1,
            _ => 2,
        }
    }
}

/// A pending interrupt with its (simulated) arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqEvent {
    /// Arrival time [µs since start].
    pub at_us: u64,
    /// Which source fired.
    pub source: IrqSource,
}

// ─── Interrupt Masking ──────────────────────────────────────────────

/// Interrupt masking capability.
///
/// Multi-byte state shared between interrupt and synchronous context must
/// only be mutated with interrupts masked; [`IsrCell`] routes every
/// read-modify-write through this trait.
pub trait IrqControl {
    /// Mask all maskable interrupts. Nests.
    fn irq_mask(&mut self);

    /// Unmask interrupts (one nesting level).
    fn irq_unmask(&mut self);

    /// Run `f` with interrupts masked.
    fn irqs_masked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        self.irq_mask();
        let result = f(self);
        self.irq_unmask();
        result
    }
}

// ─── IsrCell ────────────────────────────────────────────────────────

/// State shared between interrupt handlers and synchronous code.
///
/// Plain loads are fine on a single core; every read-modify-write goes
/// through an explicit mask-interrupts-and-swap primitive instead of an
/// ordinary unguarded update.
#[derive(Debug)]
pub struct IsrCell<T: Copy>(Cell<T>);

impl<T: Copy> IsrCell<T> {
    /// Wrap an initial value.
    pub const fn new(value: T) -> Self {
        Self(Cell::new(value))
    }

    /// Single read; safe without masking on a single core.
    pub fn load(&self) -> T {
        self.0.get()
    }

    /// Assign with interrupts masked.
    pub fn store(&self, irq: &mut impl IrqControl, value: T) {
        irq.irqs_masked(|_| self.0.set(value));
    }

    /// Assign and return the previous value, with interrupts masked.
    pub fn swap(&self, irq: &mut impl IrqControl, value: T) -> T {
        irq.irqs_masked(|_| self.0.replace(value))
    }

    /// Store from interrupt context, where masking is implicit.
    pub fn store_in_isr(&self, value: T) {
        self.0.set(value);
    }
}

impl<T: Copy + BitOr<Output = T>> IsrCell<T> {
    /// Set bits and return the previous value, with interrupts masked.
    pub fn fetch_or(&self, irq: &mut impl IrqControl, bits: T) -> T {
        irq.irqs_masked(|_| {
            let prev = self.0.get();
            self.0.set(prev | bits);
            prev
        })
    }
}

impl<T: Copy + BitAnd<Output = T>> IsrCell<T> {
    /// Clear to `mask` and return the previous value, with interrupts masked.
    pub fn fetch_and(&self, irq: &mut impl IrqControl, mask: T) -> T {
        irq.irqs_masked(|_| {
            let prev = self.0.get();
            self.0.set(prev & mask);
            prev
        })
    }
}

// ─── Peripherals ────────────────────────────────────────────────────

/// The peripheral capability seam.
///
/// Every call is an infallible synchronous register write/read. A
/// production backend binds these to real ports and timers; [`sim`]
/// provides a deterministic software backend that timestamps every
/// electrical transition.
///
/// Timer conventions follow countdown hardware: a one-shot loaded with
/// `load_us` raises its timeout after `load_us` µs; an optional match at
/// `match_us` fires when the countdown *reaches* that value, i.e.
/// `load_us - match_us` µs after start. Match and timeout share one
/// interrupt source, disambiguated by a status flag read at ISR entry.
pub trait Peripherals: IrqControl {
    // ── Step/direction outputs ──

    /// Write the step output port (post-invert bit pattern).
    fn write_step_bits(&mut self, bits: AxisSignals);

    /// Write the direction output port (post-invert bit pattern).
    fn write_dir_bits(&mut self, bits: AxisSignals);

    /// Write the stepper disable outputs (post-invert bit pattern).
    fn set_stepper_disable(&mut self, bits: AxisSignals);

    // ── Spindle / coolant outputs ──

    /// Drive the spindle enable output.
    fn set_spindle_enable(&mut self, on: bool);

    /// Drive the spindle direction output.
    fn set_spindle_dir(&mut self, ccw: bool);

    /// Write the coolant output port (post-invert bit pattern).
    fn write_coolant_bits(&mut self, bits: CoolantState);

    /// Read back the spindle enable output level.
    fn read_spindle_enable(&mut self) -> bool;

    /// Read back the spindle direction output level.
    fn read_spindle_dir(&mut self) -> bool;

    /// Read back the coolant output port.
    fn read_coolant_bits(&mut self) -> CoolantState;

    // ── Inputs ──

    /// Sample the raw limit input port.
    fn read_limit_bits(&mut self) -> AxisSignals;

    /// Sample the raw control input port.
    fn read_control_bits(&mut self) -> ControlSignals;

    /// Sample the raw probe input.
    fn read_probe(&mut self) -> bool;

    /// Read and clear the pending limit-port edge flags.
    /// Returns (changed axes, probe edge pending).
    fn limit_irq_status(&mut self) -> (AxisSignals, bool);

    /// Read and clear the pending control-port edge flags.
    fn control_irq_status(&mut self) -> ControlSignals;

    /// Enable or disable limit pin-change interrupts.
    fn limit_irqs_enable(&mut self, on: bool);

    /// Enable or disable control pin-change interrupts.
    fn control_irqs_enable(&mut self, on: bool);

    /// Configure limit edge polarity and pull direction from invert masks.
    fn configure_limit_irqs(&mut self, invert: AxisSignals, pullup_disable: AxisSignals);

    /// Configure control edge polarity and pull direction from invert masks.
    fn configure_control_irqs(&mut self, invert: ControlSignals, pullup_disable: ControlSignals);

    /// Configure probe edge polarity and pull direction.
    fn configure_probe_irq(&mut self, falling_edge: bool, pull_up: bool);

    // ── Step pulse one-shot timer ──

    /// Load the pulse timer. `match_us` of `None` selects plain timeout
    /// (immediate pulse mode).
    fn pulse_timer_configure(&mut self, load_us: u32, match_us: Option<u32>);

    /// Arm the pulse one-shot.
    fn pulse_timer_start(&mut self);

    /// Read and clear the pulse timer match flag; distinguishes match
    /// from timeout at ISR entry.
    fn pulse_timer_take_match(&mut self) -> bool;

    // ── Step cycle timer ──

    /// Set the periodic cycle timer period.
    fn cycle_timer_set_period_us(&mut self, period_us: u32);

    /// Start the cycle timer.
    fn cycle_timer_start(&mut self);

    /// Stop the cycle timer. An in-flight expiry may still be delivered
    /// and must be treated as a no-op by the handler.
    fn cycle_timer_stop(&mut self);

    // ── Debounce / PPI one-shots ──

    /// Arm the debounce window one-shot.
    fn debounce_timer_start(&mut self, window_us: u32);

    /// Arm the laser PPI pulse-length one-shot.
    fn ppi_timer_start(&mut self, pulse_length_us: u32);

    // ── Spindle PWM ──

    /// Set the PWM period [timer ticks].
    fn pwm_set_period(&mut self, ticks: u32);

    /// Set the PWM compare register [timer ticks].
    fn pwm_set_compare(&mut self, ticks: u32);

    /// Enable the PWM timer output.
    fn pwm_enable(&mut self);

    /// Disable the PWM timer output.
    fn pwm_disable(&mut self);

    /// Select the PWM output idle level.
    fn pwm_set_idle_high(&mut self, high: bool);

    // ── Systick ──

    /// Enable the 1 ms tick interrupt.
    fn systick_enable(&mut self);

    /// Disable the 1 ms tick interrupt.
    fn systick_disable(&mut self);

    /// Block until the next millisecond boundary. Used only by the
    /// blocking delay, never from interrupt context.
    fn wait_for_tick(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingIrq {
        depth: i32,
        max_depth: i32,
    }

    impl IrqControl for CountingIrq {
        fn irq_mask(&mut self) {
            self.depth += 1;
            self.max_depth = self.max_depth.max(self.depth);
        }
        fn irq_unmask(&mut self) {
            self.depth -= 1;
        }
    }

    #[test]
    fn isr_cell_swap_returns_previous() {
        let mut irq = CountingIrq {
            depth: 0,
            max_depth: 0,
        };
        let cell = IsrCell::new(5u32);
        assert_eq!(cell.swap(&mut irq, 9), 5);
        assert_eq!(cell.load(), 9);
        assert_eq!(irq.depth, 0);
        assert_eq!(irq.max_depth, 1);
    }

    #[test]
    fn isr_cell_bit_ops_mask_interrupts() {
        let mut irq = CountingIrq {
            depth: 0,
            max_depth: 0,
        };
        let cell = IsrCell::new(0b0011u16);
        assert_eq!(cell.fetch_or(&mut irq, 0b0100), 0b0011);
        assert_eq!(cell.fetch_and(&mut irq, 0b0110), 0b0111);
        assert_eq!(cell.load(), 0b0110);
        assert_eq!(irq.depth, 0);
    }

    #[test]
    fn pulse_clear_preempts_cycle_issue() {
        assert!(IrqSource::PulseTimer.priority() < IrqSource::CycleTimer.priority());
        assert!(IrqSource::CycleTimer.priority() < IrqSource::Systick.priority());
        assert!(IrqSource::CycleTimer.priority() < IrqSource::DebounceTimer.priority());
    }
}
