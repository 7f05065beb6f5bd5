//! Central Controller Runtime for LumiGrid
//!
//! The controller owns the room: it holds one socket per sensing node,
//! polls them at ~10Hz, publishes illuminance and targets into versioned
//! state cells, and restarts a cancellable optimizer worker whenever the
//! target vector changes. The worker loads the calibrated gain model,
//! solves the minimal-power dimming program, applies the result across the
//! bulb bank, and folds the observed residual back into the environmental
//! offset.
//!
//! Layering:
//!
//! - [`config`] - deployment configuration with every empirical constant
//! - [`nodes`] - protocol clients and the [`nodes::SensorNet`] fan-in
//! - [`actuation`] - dim-to-control conversion, persistence, and the
//!   concurrently applied [`actuation::BulbBank`]
//! - [`state`] - sequence-numbered single-writer cells for the
//!   sense-to-optimize hand-off
//! - [`sensing`] - the sense-and-publish loop
//! - [`supervisor`] - the `Optimize`/`Pause`/`Close` command loop and the
//!   optimizer worker it cancels and respawns
//! - [`calibration`] - calibration runner that persists the swept model
//! - [`sim`] - deterministic room model for tests and demos
//!
//! All algorithmic work (scoring, calibration math, the LP) lives in
//! `lumigrid-core`; this crate provides the threads, sockets, and files.

#![deny(unsafe_code)]

pub mod actuation;
pub mod calibration;
pub mod config;
pub mod nodes;
pub mod sensing;
pub mod sim;
pub mod state;
pub mod supervisor;

pub use actuation::{BulbBank, BulbDriver, DimStore, DimmingCurve};
pub use calibration::{calibrate_and_store, CalibrateError};
pub use config::{ConfigError, ControllerConfig, NodeConfig, NodeKind};
pub use nodes::{NodeClient, SensorNet};
pub use sensing::{Recoverable, SenseConfig, SenseHandle, SenseLoop};
pub use sim::SimulatedRoom;
pub use state::{SharedState, StateCell};
pub use supervisor::{ControlCommand, OptimizerConfig, OptimizerContext, OptimizerSupervisor};
