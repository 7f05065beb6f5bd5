//! Gain-Model Calibration
//!
//! ## Overview
//!
//! Calibration estimates the contribution matrix by finite differences:
//! perturb one bulb at a time, watch every sensor, and take the absolute
//! illuminance delta per unit of dimming as that bulb's column. After the
//! sweep, the environmental offset is the residual of the baseline readings
//! against the recovered matrix.
//!
//! ## Sweep
//!
//! For each bulb `j`, with baseline levels `d` and baseline readings `R`:
//!
//! 1. Pick the perturbation direction: step down if `d[j]` sits above the
//!    pivot, step up otherwise, so the perturbed level stays inside [0, 1].
//! 2. Apply the perturbation to bulb `j` alone, wait the settle time, and
//!    read `R'`.
//! 3. Column `j` of `A` is `|R' - R| / step`, elementwise over sensors.
//! 4. Revert bulb `j`. No measurement follows the revert, so it may use a
//!    zero settle.
//!
//! Then `E = R - A·d`.
//!
//! ## Failure Semantics
//!
//! The sweep never persists anything - it returns the finished model or an
//! error, so a failure partway through cannot leave a half-updated artifact
//! on disk. Bulbs may be left mid-perturbation on error; the caller owns
//! retry and cleanup. If the actuator cannot report its levels at all
//! (driver never initialized), the sweep aborts before touching anything.

use core::time::Duration;

use alloc::vec;
use alloc::vec::Vec;

use crate::errors::{ControlError, ControlResult};
use crate::gain::GainModel;
use crate::matrix;
use crate::traits::{DimmingActuator, SensorArray};

// Macro for optional logging
#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Sweep parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// Dimming perturbation magnitude applied to each bulb in turn
    pub step: f32,
    /// Levels above this step down, levels at or below step up
    pub pivot: f32,
    /// Level applied to every bulb before an initial sweep
    pub baseline: f32,
    /// Wait after each actuation before trusting a reading
    pub settle: Duration,
    /// Wait after reverting a bulb (no reading follows, so zero works)
    pub revert_settle: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step: 0.35,
            pivot: 0.65,
            baseline: 0.8,
            settle: Duration::from_secs(2),
            revert_settle: Duration::ZERO,
        }
    }
}

impl CalibrationConfig {
    fn validate(&self) -> ControlResult<()> {
        let plausible = self.step.is_finite()
            && self.step > 0.0
            && self.pivot.is_finite()
            && (0.0..=1.0).contains(&self.baseline);
        if plausible {
            Ok(())
        } else {
            Err(ControlError::InvalidValue)
        }
    }
}

/// Whether the sweep starts from a fresh baseline or the current levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind {
    /// First calibration: drive all bulbs to the baseline level, then sweep
    Initial,
    /// Re-calibration: sweep from whatever levels are currently applied
    Refresh,
}

/// Runs a full calibration sweep and returns the estimated model
///
/// Does not persist anything; see the module docs for failure semantics.
pub fn run<A, S>(
    actuator: &mut A,
    sensors: &mut S,
    config: &CalibrationConfig,
    kind: CalibrationKind,
) -> ControlResult<GainModel>
where
    A: DimmingActuator + ?Sized,
    S: SensorArray + ?Sized,
{
    config.validate()?;

    let bulbs = actuator.bulb_count();
    if bulbs == 0 {
        return Err(ControlError::ActuatorUnavailable {
            reason: "no bulbs to calibrate",
        });
    }

    if kind == CalibrationKind::Initial {
        actuator.set_dimming(&vec![config.baseline; bulbs], config.settle)?;
    }

    let baseline_levels = actuator.dim_levels()?;
    if baseline_levels.len() != bulbs {
        return Err(ControlError::DimensionMismatch {
            expected: bulbs,
            actual: baseline_levels.len(),
        });
    }

    let baseline = read_illuminance(sensors)?;
    if baseline.is_empty() {
        return Err(ControlError::SensorFault {
            reason: "no sensors attached",
        });
    }

    // One column per bulb, transposed into sensor rows afterwards
    let mut columns: Vec<Vec<f32>> = Vec::with_capacity(bulbs);
    for j in 0..bulbs {
        let step = if baseline_levels[j] > config.pivot {
            config.step
        } else {
            -config.step
        };

        log_debug!("calibrating bulb {}/{} (step {})", j + 1, bulbs, -step);
        actuator.change_dim_on_bulb(j, -step, config.settle)?;
        let perturbed = read_illuminance(sensors)?;
        if perturbed.len() != baseline.len() {
            return Err(ControlError::DimensionMismatch {
                expected: baseline.len(),
                actual: perturbed.len(),
            });
        }

        columns.push(
            perturbed
                .iter()
                .zip(baseline.iter())
                .map(|(p, b)| libm::fabsf(p - b) / config.step)
                .collect(),
        );

        actuator.change_dim_on_bulb(j, step, config.revert_settle)?;
    }

    let a = matrix::transpose(&columns)?;
    let e = matrix::residual(&baseline, &a, &baseline_levels)?;
    GainModel::from_parts(a, e)
}

fn read_illuminance<S>(sensors: &mut S) -> ControlResult<Vec<f32>>
where
    S: SensorArray + ?Sized,
{
    let snapshot = sensors.read()?;
    if !matrix::all_finite(&snapshot.illuminance) {
        return Err(ControlError::InvalidValue);
    }
    Ok(snapshot.illuminance)
}
