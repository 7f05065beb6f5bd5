//! Deterministic room model for tests and demos
//!
//! [`SimulatedRoom`] stands in for the physical room: a true linear model
//! `R = A·d + ambient` behind the same driver seams the real hardware
//! uses. The bulb side decodes applied control values back into dimming
//! levels through the real curve, so quantization behaves like the
//! deployed fixtures; the sensor side reads the linear model noise-free.
//!
//! The ambient vector can be changed mid-run to simulate daylight, and the
//! signal vector to simulate occupancy changes.

use std::sync::{Arc, Mutex, PoisonError};

use lumigrid_core::errors::ControlResult;
use lumigrid_core::gain::GainModel;
use lumigrid_core::matrix;
use lumigrid_core::traits::{NodeSignal, SensorArray, SensorSnapshot};

use crate::actuation::{BulbDriver, DimmingCurve};

/// Shared, deterministic stand-in for a physical room
#[derive(Clone)]
pub struct SimulatedRoom {
    truth: Arc<GainModel>,
    ambient: Arc<Mutex<Vec<f32>>>,
    levels: Arc<Mutex<Vec<f32>>>,
    signals: Arc<Mutex<Vec<NodeSignal>>>,
    curve: DimmingCurve,
}

impl SimulatedRoom {
    /// Room whose true contributions and initial ambient come from `truth`
    pub fn new(truth: GainModel) -> Self {
        let sensors = truth.sensor_count();
        let bulbs = truth.bulb_count();
        Self {
            ambient: Arc::new(Mutex::new(truth.environment().to_vec())),
            levels: Arc::new(Mutex::new(vec![0.0; bulbs])),
            signals: Arc::new(Mutex::new(vec![NodeSignal::Occupancy(false); sensors])),
            truth: Arc::new(truth),
            curve: DimmingCurve::default(),
        }
    }

    /// The true model the room runs on
    pub fn truth(&self) -> &GainModel {
        &self.truth
    }

    /// Bulb-driver handle into this room
    pub fn bulbs(&self) -> SimBulbs {
        SimBulbs {
            curve: self.curve,
            levels: Arc::clone(&self.levels),
        }
    }

    /// Sensor-array handle into this room
    pub fn sensors(&self) -> SimSensors {
        SimSensors {
            truth: Arc::clone(&self.truth),
            ambient: Arc::clone(&self.ambient),
            levels: Arc::clone(&self.levels),
            signals: Arc::clone(&self.signals),
        }
    }

    /// True dimming levels currently in effect
    pub fn dim_levels(&self) -> Vec<f32> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Changes one sensor's signal (occupancy or preference)
    pub fn set_signal(&self, sensor: usize, signal: NodeSignal) {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)[sensor] = signal;
    }

    /// Changes one sensor's ambient illuminance (simulated daylight)
    pub fn set_ambient(&self, sensor: usize, lux: f32) {
        self.ambient.lock().unwrap_or_else(PoisonError::into_inner)[sensor] = lux;
    }
}

/// [`BulbDriver`] half of a [`SimulatedRoom`]
pub struct SimBulbs {
    curve: DimmingCurve,
    levels: Arc<Mutex<Vec<f32>>>,
}

impl BulbDriver for SimBulbs {
    fn bulb_count(&self) -> usize {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn apply(&self, bulb: usize, control: Option<u8>) -> ControlResult<()> {
        let level = self.curve.dimming_level(control);
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)[bulb] = level;
        Ok(())
    }
}

/// [`SensorArray`] half of a [`SimulatedRoom`]
pub struct SimSensors {
    truth: Arc<GainModel>,
    ambient: Arc<Mutex<Vec<f32>>>,
    levels: Arc<Mutex<Vec<f32>>>,
    signals: Arc<Mutex<Vec<NodeSignal>>>,
}

impl SensorArray for SimSensors {
    fn sensor_count(&self) -> usize {
        self.truth.sensor_count()
    }

    fn read(&mut self) -> ControlResult<SensorSnapshot> {
        let levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let bulb_light = matrix::matvec(self.truth.contribution(), &levels)?;
        let ambient = self.ambient.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(SensorSnapshot {
            illuminance: bulb_light
                .iter()
                .zip(ambient.iter())
                .map(|(bulb, amb)| bulb + amb)
                .collect(),
            signals: self.signals.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        })
    }
}
