//! # Mono Control Unit
//!
//! Hard-realtime balance controller for a single-wheel board. A fixed-rate
//! loop reads the IMU and motor telemetry, shapes a pitch setpoint
//! (centering ramp, nose bias, adaptive torque response, turn tilt,
//! reverse-stop, tilt-backs), runs the balance PID, and writes a motor
//! current — all wrapped by a ride supervisor that decides when riding is
//! permitted and routes every fault to braking.
//!
//! ## Architecture
//!
//! 1. **[`inputs`]** — per-tick sampling and derived signals
//! 2. **[`faults`]** — debounced fault detection
//! 3. **[`setpoint`]** + **[`shapers`]** — setpoint target and additive offsets
//! 4. **[`pid`]** — adaptive-gain balance PID
//! 5. **[`output`]** — current clamping, engage clicks, brake timeout
//! 6. **[`supervisor`]** — the ride state machine tying it together
//! 7. **[`cycle`]** — loop pacing, overshoot correction, RT setup
//!
//! ## Zero-Allocation Loop
//!
//! All runtime state is owned by one [`supervisor::Supervisor`] created at
//! configuration time; the tick path performs no heap allocation. External
//! readers take immutable [`telemetry::Snapshot`] copies of scalar fields.

pub mod cycle;
pub mod faults;
pub mod filter;
pub mod inputs;
pub mod lock;
pub mod output;
pub mod pid;
pub mod ports;
pub mod setpoint;
pub mod shapers;
pub mod sim;
pub mod supervisor;
pub mod telemetry;
pub mod tuning;

mod util;
