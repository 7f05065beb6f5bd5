//! Core traits at the hardware seam
//!
//! These traits are the boundary between the control algorithms and the
//! collaborators that touch hardware or the network. Keep them simple -
//! the runtime crates provide the concurrency.

use core::time::Duration;

use alloc::vec::Vec;

use crate::errors::ControlResult;

/// One sampled value from a sensing endpoint, beyond raw illuminance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeSignal {
    /// Stationary node: binary occupancy decision
    Occupancy(bool),
    /// Portable node: the user's preference target in lux (0 = no requirement)
    TargetLux(f32),
}

/// Simultaneous readings from every sensing endpoint, index-aligned
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Illuminance per sensor, in lux
    pub illuminance: Vec<f32>,
    /// Occupancy or target signal per sensor
    pub signals: Vec<NodeSignal>,
}

/// Bulb bank the controller dims
///
/// Implementations apply levels to hardware and persist the last applied
/// vector; they are the sole writer of dimming state.
pub trait DimmingActuator {
    /// Number of independently addressable bulbs
    fn bulb_count(&self) -> usize;

    /// Applies a full dimming vector, then waits `settle` for light output
    /// to stabilize before returning
    fn set_dimming(&mut self, levels: &[f32], settle: Duration) -> ControlResult<()>;

    /// Adjusts one bulb by `delta` (clamped into [0, 1]), waits `settle`,
    /// and returns the level actually applied
    fn change_dim_on_bulb(&mut self, bulb: usize, delta: f32, settle: Duration)
        -> ControlResult<f32>;

    /// Last applied dimming vector; fails if no state has ever been applied
    /// or restored
    fn dim_levels(&self) -> ControlResult<Vec<f32>>;
}

/// Bank of sensing endpoints the controller reads
pub trait SensorArray {
    /// Number of endpoints currently attached
    fn sensor_count(&self) -> usize;

    /// Reads all endpoints; errors carry the failing node's index so the
    /// caller can tear it down
    fn read(&mut self) -> ControlResult<SensorSnapshot>;
}
