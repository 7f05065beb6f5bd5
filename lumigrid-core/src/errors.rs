//! Error Types for Control-Loop Failures
//!
//! ## Design Philosophy
//!
//! LumiGrid's error system follows the constraints of the devices it runs on:
//!
//! 1. **Small Size**: Variants carry a few words of context at most, since
//!    errors travel through the sense/actuate hot paths every cycle.
//!
//! 2. **No Heap Allocation**: Error data is inline - no String, only
//!    `&'static str` for messages. Deterministic memory usage on nodes.
//!
//! 3. **Copy Semantics**: Errors implement Copy so loops can record and
//!    forward them without move complications.
//!
//! 4. **Recovery-Oriented**: Each variant maps to one recovery policy -
//!    skip the cycle, drop the node, abort the calibration pass - so callers
//!    match on the variant, not on message text.
//!
//! ## Error Categories
//!
//! ### Model and Numeric
//! - `DimensionMismatch`: vector/matrix shapes disagree with the gain model
//! - `IndexOutOfRange`: sensor index beyond the model's current rows
//! - `InvalidValue`: NaN or infinite reading/target entered the loop
//! - `Solve`: the dimming LP failed for a reason other than infeasibility
//!   (infeasibility itself is not an error - the planner falls back to
//!   full brightness)
//!
//! ### Collaborator Faults
//! - `ActuatorUnavailable`: the bulb driver cannot act or report state
//! - `SensorFault`: a reading could not be produced
//! - `NodeFault`: a specific sensing node misbehaved; carries the index so
//!   the controller can tear that node down and delete its gain row

use thiserror_no_std::Error;

use crate::simplex::SolveError;

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Control-loop errors - kept small for node use
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ControlError {
    /// Vector or matrix shape disagrees with the gain model
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length/row count the operation required
        expected: usize,
        /// Length/row count actually supplied
        actual: usize,
    },

    /// Bulb driver cannot act or report its state
    #[error("Actuator unavailable: {reason}")]
    ActuatorUnavailable {
        reason: &'static str,
    },

    /// A sensor reading could not be produced
    #[error("Sensor fault: {reason}")]
    SensorFault {
        reason: &'static str,
    },

    /// A specific sensing node misbehaved (protocol violation, dead socket)
    #[error("Sensing node {index} fault")]
    NodeFault {
        /// Index of the node in the controller's ordering
        index: usize,
    },

    /// Sensor index outside the model's current row range
    #[error("Sensor index {index} out of range (have {len})")]
    IndexOutOfRange {
        /// Offending index
        index: usize,
        /// Rows currently in the model
        len: usize,
    },

    /// Value makes no sense in the model (NaN, infinity)
    #[error("Invalid value: not a valid number")]
    InvalidValue,

    /// The dimming LP failed for a non-infeasibility reason
    #[error("Dimming solve failed: {0}")]
    Solve(#[from] SolveError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::DimensionMismatch { expected, actual } =>
                defmt::write!(fmt, "Dimension mismatch: expected {}, got {}", expected, actual),
            Self::ActuatorUnavailable { reason } =>
                defmt::write!(fmt, "Actuator unavailable: {}", reason),
            Self::SensorFault { reason } =>
                defmt::write!(fmt, "Sensor fault: {}", reason),
            Self::NodeFault { index } =>
                defmt::write!(fmt, "Node {} fault", index),
            Self::IndexOutOfRange { index, len } =>
                defmt::write!(fmt, "Index {} out of range ({})", index, len),
            Self::InvalidValue =>
                defmt::write!(fmt, "Invalid value"),
            Self::Solve(e) =>
                defmt::write!(fmt, "Solve failed: {}", e),
        }
    }
}
