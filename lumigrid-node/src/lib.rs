//! Sensing-Node Runtime for LumiGrid
//!
//! Everything a per-room sensing node runs: a background motion-polling
//! loop feeding the occupancy tracker, a last-known-value wrapper over the
//! light driver, and a TCP responder that answers the controller's
//! line-protocol requests.
//!
//! The node is deliberately thin. All scoring and protocol logic lives in
//! `lumigrid-core`; this crate adds the threads, sockets, and driver seams
//! that only make sense with `std`.
//!
//! ## Wiring
//!
//! ```no_run
//! use std::sync::{atomic::AtomicBool, Arc, Mutex};
//! use lumigrid_core::occupancy::OccupancyTracker;
//! use lumigrid_node::{
//!     drivers::LastKnownLight,
//!     motion::MotionPoller,
//!     responder::{OccupancySignal, Responder, ResponderConfig},
//! };
//! # use lumigrid_node::drivers::{DriverError, LightSensor, MotionSensor};
//! # struct Pir; struct Tsl;
//! # impl MotionSensor for Pir {
//! #     fn read_motion(&mut self) -> Result<bool, DriverError> { Ok(false) }
//! # }
//! # impl LightSensor for Tsl {
//! #     fn read_illuminance(&mut self) -> Result<f32, DriverError> { Ok(0.0) }
//! # }
//!
//! let tracker = Arc::new(Mutex::new(OccupancyTracker::<500>::new()));
//! let poller = MotionPoller::spawn(Pir, Arc::clone(&tracker), MotionPoller::DEFAULT_CADENCE);
//!
//! let responder = Responder::new(ResponderConfig::new("0.0.0.0:1234", "omega-f13d")).unwrap();
//! let mut light = LastKnownLight::new(Tsl);
//! let mut signal = OccupancySignal::new(tracker);
//! let stop = AtomicBool::new(false);
//! responder.serve(&mut light, &mut signal, &stop).unwrap();
//! poller.stop();
//! ```

#![deny(unsafe_code)]

pub mod drivers;
pub mod motion;
pub mod responder;

pub use drivers::{DriverError, LastKnownLight, LightSensor, MotionSensor};
pub use motion::MotionPoller;
pub use responder::{
    NodeError, OccupancySignal, Responder, ResponderConfig, SignalSource, TargetLuxSignal,
};

/// Motion samples a deployed node retains (~75s at the 0.15s cadence)
pub const MOTION_HISTORY_SIZE: usize = 500;
