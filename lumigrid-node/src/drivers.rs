//! Driver seams for the node's physical sensors
//!
//! The actual I2C/GPIO wrappers are external collaborators; this module
//! defines the traits they implement and the fallback policy for the light
//! path. Light-sensor buses glitch under load, and a dropped reading must
//! not stall the responder, so reads go through [`LastKnownLight`]: on a
//! transient fault the previous good value is returned and the fault is
//! logged, never propagated.

use thiserror::Error;

/// Failures a sensor driver can report
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Transient bus fault; retrying later usually succeeds
    #[error("Sensor bus error: {reason}")]
    Bus {
        /// Driver-supplied description of the fault
        reason: &'static str,
    },

    /// Driver was never brought up
    #[error("Sensor not initialized")]
    Uninitialized,
}

/// Illuminance driver (e.g. a TSL2561 behind I2C)
pub trait LightSensor {
    /// Reads raw illuminance in sensor counts
    fn read_illuminance(&mut self) -> Result<f32, DriverError>;
}

/// Binary motion driver (e.g. a PIR element on a GPIO pin)
pub trait MotionSensor {
    /// Reads the current motion bit
    fn read_motion(&mut self) -> Result<bool, DriverError>;
}

/// Last-known-value wrapper over a light driver
///
/// `read` never fails: a faulting driver yields the previous good reading
/// (0.0 before the first success), and a successful read refreshes it.
pub struct LastKnownLight<T> {
    inner: T,
    last: f32,
}

impl<T: LightSensor> LastKnownLight<T> {
    /// Wraps a light driver; the fallback starts at 0.0
    pub fn new(inner: T) -> Self {
        Self { inner, last: 0.0 }
    }

    /// Reads illuminance, falling back to the last good value on fault
    pub fn read(&mut self) -> f32 {
        match self.inner.read_illuminance() {
            Ok(value) => {
                self.last = value;
                value
            }
            Err(e) => {
                log::warn!("light read failed ({e}); using last known value {}", self.last);
                self.last
            }
        }
    }

    /// The most recent good reading
    pub fn last_known(&self) -> f32 {
        self.last
    }
}
