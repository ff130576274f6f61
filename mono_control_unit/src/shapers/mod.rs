//! Setpoint shapers: additive pitch offsets layered on the base setpoint.
//!
//! Order matters and is fixed: nose angling, then adaptive torque response,
//! then turn tilt. Each shaper ramps its own interpolant at its own step
//! size; the supervisor sums their offsets into the final setpoint.

pub mod noseangle;
pub mod torquetilt;
pub mod turntilt;

pub use noseangle::NoseAngler;
pub use torquetilt::{LoopFeedback, TorqueTilt};
pub use turntilt::TurnTilt;
