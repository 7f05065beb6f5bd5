//! Core control engine for LumiGrid
//!
//! Models and algorithms for closed-loop lighting control: a calibrated
//! linear gain model (bulb dimming -> sensor illuminance), discounted
//! occupancy scoring, and a minimal-power dimming planner driven by a
//! linear-program solver.
//!
//! Designed to run on the controller and on constrained sensing nodes:
//! - `no_std` compatible (requires `alloc` for model storage)
//! - No threads or sockets; concurrency lives in the runtime crates
//! - All fallible operations return typed errors
//!
//! ```no_run
//! use lumigrid_core::{GainModel, PowerModel, plan_dimming};
//!
//! let model = GainModel::from_parts(
//!     vec![vec![2.0, 0.0], vec![0.0, 2.0]],
//!     vec![0.0, 0.0],
//! ).unwrap();
//!
//! // Minimal-power levels meeting 1 lux at both sensors.
//! let plan = plan_dimming(&model, &[1.0, 1.0], &PowerModel::default()).unwrap();
//! assert!(plan.satisfies_targets);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

pub mod calibrate;
pub mod errors;
pub mod gain;
pub mod matrix;
pub mod occupancy;
pub mod optimize;
pub mod protocol;
pub mod simplex;
pub mod traits;

#[cfg(feature = "persist")]
pub mod store;

// Public API
pub use calibrate::{CalibrationConfig, CalibrationKind};
pub use errors::{ControlError, ControlResult};
pub use gain::GainModel;
pub use occupancy::{MotionHistory, OccupancyConfig, OccupancyTracker};
pub use optimize::{plan_dimming, targets_from_signals, DimmingPlan, PowerModel};
pub use traits::{DimmingActuator, NodeSignal, SensorArray, SensorSnapshot};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
