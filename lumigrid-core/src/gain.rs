//! Calibrated Gain Model
//!
//! ## Overview
//!
//! The gain model is the linear map the whole control loop relies on:
//!
//! ```text
//! illuminance[i] ≈ Σ_j A[i][j] · dim[j] + E[i]
//! ```
//!
//! `A` (sensors × bulbs) holds each bulb's marginal illuminance contribution
//! at each sensor per unit dimming; entries are non-negative by construction
//! because calibration stores `|ΔR| / step`. `E` is the environmental offset:
//! illuminance the bulbs do not explain (daylight, fixtures outside the
//! system). `E` entries can go negative when sensor noise pushes the residual
//! below zero; that is expected and harmless.
//!
//! ## Lifecycle
//!
//! - `A` is created or replaced wholesale by a calibration sweep, never
//!   edited entry-by-entry.
//! - `E` is re-estimated continuously by the optimizer loop from the residual
//!   of fresh readings against the last applied dimming vector.
//! - Removing a sensor deletes its row of `A` and entry of `E`, preserving
//!   the order of the remaining rows.
//! - Adding a sensor appends a zero row: until the next calibration pass the
//!   new sensor contributes no modeled bulb effect. That is a documented
//!   approximation, not a bug; the optimizer sees only `E` for that sensor.
//! - A refresh calibration with added sensors goes through
//!   [`GainModel::merge_preserving`], which keeps the established rows and
//!   adopts fresh estimates only for the new sensors.

use alloc::vec;
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{ControlError, ControlResult};
use crate::matrix;

/// Linear illuminance model: contribution matrix plus environmental offset
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GainModel {
    /// Contribution matrix, rows = sensors, columns = bulbs
    a: Vec<Vec<f32>>,
    /// Environmental offset, one entry per sensor
    e: Vec<f32>,
}

impl GainModel {
    /// Model of the given shape with all contributions and offsets zero
    pub fn zeroed(sensors: usize, bulbs: usize) -> Self {
        Self {
            a: vec![vec![0.0; bulbs]; sensors],
            e: vec![0.0; sensors],
        }
    }

    /// Builds a model from a contribution matrix and offset vector
    ///
    /// Rejects ragged matrices, offset length mismatches, and non-finite
    /// entries (a NaN here would poison every later solve).
    pub fn from_parts(a: Vec<Vec<f32>>, e: Vec<f32>) -> ControlResult<Self> {
        let (rows, _) = matrix::dims(&a)?;
        if e.len() != rows {
            return Err(ControlError::DimensionMismatch {
                expected: rows,
                actual: e.len(),
            });
        }
        if !matrix::all_finite(&e) || a.iter().any(|row| !matrix::all_finite(row)) {
            return Err(ControlError::InvalidValue);
        }
        Ok(Self { a, e })
    }

    /// Number of sensors (rows)
    pub fn sensor_count(&self) -> usize {
        self.e.len()
    }

    /// Number of bulbs (columns); 0 for a model with no sensors
    pub fn bulb_count(&self) -> usize {
        self.a.first().map_or(0, Vec::len)
    }

    /// Contribution matrix, rows = sensors
    pub fn contribution(&self) -> &[Vec<f32>] {
        &self.a
    }

    /// Environmental offset per sensor
    pub fn environment(&self) -> &[f32] {
        &self.e
    }

    /// Model prediction: A·d + E
    pub fn predicted_illuminance(&self, dims: &[f32]) -> ControlResult<Vec<f32>> {
        let product = matrix::matvec(&self.a, dims)?;
        Ok(product
            .iter()
            .zip(self.e.iter())
            .map(|(p, e)| p + e)
            .collect())
    }

    /// Re-estimates the environmental offset: E = R - A·d
    ///
    /// `readings` are current illuminances, `dims` the dimming vector in
    /// effect when they were taken. Rejects non-finite readings so a sensor
    /// glitch cannot poison the offset.
    pub fn update_environment(&mut self, readings: &[f32], dims: &[f32]) -> ControlResult<()> {
        if !matrix::all_finite(readings) {
            return Err(ControlError::InvalidValue);
        }
        self.e = matrix::residual(readings, &self.a, dims)?;
        Ok(())
    }

    /// Appends a zero row for a newly attached sensor, returning its index
    ///
    /// The row stays zero until the next calibration pass fills it.
    pub fn add_sensor(&mut self) -> usize {
        let bulbs = self.bulb_count();
        self.a.push(vec![0.0; bulbs]);
        self.e.push(0.0);
        self.e.len() - 1
    }

    /// Deletes a sensor's row and offset, preserving remaining row order
    pub fn remove_sensor(&mut self, index: usize) -> ControlResult<()> {
        if index >= self.e.len() {
            return Err(ControlError::IndexOutOfRange {
                index,
                len: self.e.len(),
            });
        }
        self.a.remove(index);
        self.e.remove(index);
        Ok(())
    }

    /// Merges a fresh calibration into an established model
    ///
    /// Rows and offsets for sensors present in `old` are kept from `old`
    /// (the established estimates are usually less noisy than a single fresh
    /// sweep); rows for sensors added since are adopted from `fresh`.
    /// `fresh` must cover at least `old`'s sensors over the same bulbs.
    pub fn merge_preserving(old: &GainModel, fresh: GainModel) -> ControlResult<GainModel> {
        if fresh.bulb_count() != old.bulb_count() {
            return Err(ControlError::DimensionMismatch {
                expected: old.bulb_count(),
                actual: fresh.bulb_count(),
            });
        }
        if fresh.sensor_count() < old.sensor_count() {
            return Err(ControlError::DimensionMismatch {
                expected: old.sensor_count(),
                actual: fresh.sensor_count(),
            });
        }

        let mut merged = fresh;
        for (i, (row, offset)) in old.a.iter().zip(old.e.iter()).enumerate() {
            merged.a[i] = row.clone();
            merged.e[i] = *offset;
        }
        Ok(merged)
    }
}
