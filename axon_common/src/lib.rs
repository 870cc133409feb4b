//! AXON Common Library
//!
//! Shared vocabulary for the AXON workspace: the signal bitsets exchanged
//! with the motion core, the driver settings snapshot with TOML loading and
//! whole-snapshot validation, the capability negotiation record, and the
//! nonvolatile layout checker used at startup.
//!
//! # Module Structure
//!
//! - [`signals`] - Axis/control/spindle/coolant bitsets and `StepCommand`
//! - [`settings`] - Settings snapshot, TOML loading, validation
//! - [`caps`] - Driver capability negotiation record
//! - [`layout`] - Reserved nonvolatile region overlap checking
//! - [`prelude`] - Common re-exports for convenience

pub mod caps;
pub mod layout;
pub mod prelude;
pub mod settings;
pub mod signals;
