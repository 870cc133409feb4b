//! Common re-exports for AXON workspace crates.

pub use crate::caps::DriverCaps;
pub use crate::layout::{LayoutError, Region, verify_disjoint};
pub use crate::settings::{Settings, SettingsError};
pub use crate::signals::{AxisSignals, ControlSignals, CoolantState, SpindleState, StepCommand};
