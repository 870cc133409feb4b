//! AXON Output Driver
//!
//! The real-time output layer of a motion-control stack: converts step
//! commands from the upstream motion executor into precisely timed
//! electrical transitions, ramps spindle PWM duty, debounces noisy
//! digital inputs and dispatches clean signal sets upward.
//!
//! Everything here runs either in interrupt context (the `on_*` entry
//! points) or in the caller's synchronous context (configuration, the
//! blocking delay). There is no blocking and no allocation inside any
//! interrupt entry point.
//!
//! # Module Structure
//!
//! - [`driver`] - Owned driver context, lifecycle, configuration
//! - [`pulse`] - Step pulse generation (immediate and delayed modes)
//! - [`spindle`] - Spindle PWM duty control and ramping
//! - [`debounce`] - Software debounce of the input groups
//! - [`inputs`] - Limit/control/probe dispatch
//! - [`tick`] - Shared millisecond tick scheduler and delays
//! - [`laser`] - Laser PPI pulse modulation
//! - [`rig`] - Deterministic harness over the software backend

pub mod debounce;
pub mod driver;
pub mod inputs;
pub mod laser;
pub mod pulse;
pub mod rig;
pub mod spindle;
pub mod tick;

pub use crate::driver::{Host, InitError, OutputDriver};
pub use crate::rig::{RecordingHost, SimRig};
pub use crate::spindle::RampPhase;
