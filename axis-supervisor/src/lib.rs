//! Cyclic supervisor for a stepper-motor axis behind a Modbus-TCP PLC,
//! based on [tokio-modbus](https://github.com/slowtec/tokio-modbus).
//!
//! ## Control loop
//!
//! Every cycle the supervisor
//!
//! - reads the three selector coils (auto mode, hand mode, E-stop) in one
//!   batched request,
//! - re-reads the motor direction coil, keeping the controller authoritative
//!   so a restart or an HMI override resumes from the last commanded
//!   direction instead of a default,
//! - holds the axis entirely while the E-stop is asserted,
//! - inverts and commits the direction bit after a full sweep of pulses, and
//! - either acknowledges hand mode or issues one timed step pulse in auto
//!   mode.
//!
//! A bus failure aborts the cycle before any output write; the pulse counter
//! and direction carry over untouched, so the motor misses a step rather
//! than stepping on corrupted state.
//!
//! See [`control::Supervisor`] for the state machine and `simulator`
//! (feature `simulator`) for an in-process PLC stand-in used by the
//! integration tests and examples.

/// Coil-level bus adapter over the tokio-modbus client
pub mod bus;
/// Named tunables for the supervisor
pub mod config;
/// The cyclic control state machine
pub mod control;
/// Error taxonomy
pub mod error;
/// Motor pulse driver
pub mod pulse;
/// Named coil points and the fixed tag registry
pub mod tags;

/// In-process PLC stand-in (based on tokio-modbus [server examples](https://github.com/slowtec/tokio-modbus/tree/main/examples))
#[cfg(feature = "simulator")]
pub mod simulator;
