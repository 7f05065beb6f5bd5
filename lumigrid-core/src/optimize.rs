//! Minimal-Power Dimming Planner
//!
//! ## Overview
//!
//! Given the calibrated gain model and per-sensor illuminance targets, the
//! planner finds the cheapest dimming vector that meets every target:
//!
//! ```text
//! minimize    c · d            c_j = power slope per unit dimming
//! subject to  A · d ≥ T - E    deliver what the environment does not
//!             0 ≤ d_j ≤ 1
//! ```
//!
//! Sensors whose target is already covered by the environmental offset
//! (`T[i] ≤ E[i]`, including zero and negative targets) impose no load;
//! their rows are trivially satisfiable.
//!
//! ## Infeasibility Policy
//!
//! When the targets are unreachable even at full brightness, the planner
//! does not fail: it returns the all-ones vector so the room gets as bright
//! as physically possible, flags the plan with
//! `satisfies_targets = false`, and reports the condition at error level.
//! Leaving the bulbs at a stale, possibly dim state would be strictly worse
//! for the occupants. Any other solver failure is a real error and
//! propagates.

use alloc::vec;
use alloc::vec::Vec;

use crate::errors::{ControlError, ControlResult};
use crate::gain::GainModel;
use crate::matrix;
use crate::simplex::{self, LinearProgram, SolveError};
use crate::traits::NodeSignal;

// Macro for optional logging
#[cfg(feature = "log")]
macro_rules! log_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_error {
    ($($arg:tt)*) => {};
}

/// Empirical linear fit of bulb power draw against dimming level
///
/// Fitted on the deployed fixtures: each bulb draws roughly
/// `slope · d + intercept` watts while lit. The intercept is charged only
/// to bulbs that are actually on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerModel {
    /// Watts per unit of dimming level
    pub slope: f32,
    /// Fixed watts drawn by each lit bulb
    pub intercept: f32,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self {
            slope: 3.867_062_05,
            intercept: 1.046_785_41,
        }
    }
}

impl PowerModel {
    /// Dimming level above which a bulb counts as lit
    pub const LIT_THRESHOLD: f32 = 1e-4;

    /// Estimated total draw of a dimming vector, in watts
    pub fn power_estimate(&self, levels: &[f32]) -> f32 {
        let dimming: f32 = levels.iter().sum();
        let lit = levels
            .iter()
            .filter(|&&d| d > Self::LIT_THRESHOLD)
            .count();
        self.slope * dimming + self.intercept * lit as f32
    }
}

/// Planner output: levels to apply plus bookkeeping for the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct DimmingPlan {
    /// Dimming vector to apply, one entry per bulb, in [0, 1]
    pub levels: Vec<f32>,
    /// Estimated power draw of `levels`, in watts
    pub power_estimate: f32,
    /// False when the targets were unreachable and `levels` is the
    /// full-brightness fallback
    pub satisfies_targets: bool,
}

/// Computes the minimal-power dimming vector for the given targets
///
/// `targets` is index-aligned with the model's sensors. See the module docs
/// for the infeasibility policy.
pub fn plan_dimming(
    model: &GainModel,
    targets: &[f32],
    power: &PowerModel,
) -> ControlResult<DimmingPlan> {
    let sensors = model.sensor_count();
    let bulbs = model.bulb_count();

    if targets.len() != sensors {
        return Err(ControlError::DimensionMismatch {
            expected: sensors,
            actual: targets.len(),
        });
    }
    if !matrix::all_finite(targets) {
        return Err(ControlError::InvalidValue);
    }
    if bulbs == 0 {
        return Err(ControlError::ActuatorUnavailable {
            reason: "model has no bulbs",
        });
    }

    // A·d ≥ T - E rewritten as -A·d ≤ E - T
    let constraints: Vec<Vec<f32>> = model
        .contribution()
        .iter()
        .map(|row| row.iter().map(|a| -a).collect())
        .collect();
    let rhs: Vec<f32> = model
        .environment()
        .iter()
        .zip(targets.iter())
        .map(|(e, t)| e - t)
        .collect();

    let lp = LinearProgram {
        objective: vec![power.slope; bulbs],
        constraints,
        rhs,
        bounds: vec![(0.0, 1.0); bulbs],
    };

    match simplex::solve(&lp) {
        Ok(solution) => Ok(DimmingPlan {
            power_estimate: power.power_estimate(&solution.x),
            levels: solution.x,
            satisfies_targets: true,
        }),
        Err(SolveError::Infeasible) => {
            log_error!(
                "dimming targets unreachable at full brightness; \
                 applying maximum output on all {} bulbs",
                bulbs
            );
            let levels = vec![1.0; bulbs];
            Ok(DimmingPlan {
                power_estimate: power.power_estimate(&levels),
                levels,
                satisfies_targets: false,
            })
        }
        Err(other) => Err(other.into()),
    }
}

/// Maps node signals to per-sensor illuminance targets
///
/// Stationary nodes get `occupied_lux` when occupied and 0 otherwise;
/// portable nodes pass their user preference through directly.
pub fn targets_from_signals(signals: &[NodeSignal], occupied_lux: f32) -> Vec<f32> {
    signals
        .iter()
        .map(|signal| match signal {
            NodeSignal::Occupancy(true) => occupied_lux,
            NodeSignal::Occupancy(false) => 0.0,
            NodeSignal::TargetLux(lux) => *lux,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_power() -> PowerModel {
        PowerModel {
            slope: 1.0,
            intercept: 0.0,
        }
    }

    #[test]
    fn minimal_power_solution_on_diagonal_model() {
        let model =
            GainModel::from_parts(vec![vec![2.0, 0.0], vec![0.0, 2.0]], vec![0.0, 0.0]).unwrap();
        let plan = plan_dimming(&model, &[1.0, 1.0], &unit_power()).unwrap();

        assert!(plan.satisfies_targets);
        assert!((plan.levels[0] - 0.5).abs() < 1e-6);
        assert!((plan.levels[1] - 0.5).abs() < 1e-6);
        assert!((plan.power_estimate - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unreachable_targets_fall_back_to_full_brightness() {
        let model =
            GainModel::from_parts(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0.0, 0.0]).unwrap();
        let plan = plan_dimming(&model, &[5.0, 5.0], &unit_power()).unwrap();

        assert!(!plan.satisfies_targets);
        assert_eq!(plan.levels, vec![1.0, 1.0]);
        assert!((plan.power_estimate - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_targets_turn_everything_off() {
        let model =
            GainModel::from_parts(vec![vec![3.0, 1.0], vec![1.0, 3.0]], vec![0.0, 0.0]).unwrap();
        let plan = plan_dimming(&model, &[0.0, 0.0], &unit_power()).unwrap();

        assert!(plan.satisfies_targets);
        assert_eq!(plan.levels, vec![0.0, 0.0]);
        assert_eq!(plan.power_estimate, 0.0);
    }

    #[test]
    fn environment_offsets_reduce_demand() {
        // Sensor 0's target is fully covered by daylight; only sensor 1
        // needs bulb output
        let model =
            GainModel::from_parts(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![2.0, 0.0]).unwrap();
        let plan = plan_dimming(&model, &[1.0, 0.5], &unit_power()).unwrap();

        assert!(plan.satisfies_targets);
        assert!(plan.levels[0].abs() < 1e-6);
        assert!((plan.levels[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn negative_targets_are_trivially_satisfied() {
        let model = GainModel::from_parts(vec![vec![1.0]], vec![0.0]).unwrap();
        let plan = plan_dimming(&model, &[-1.0], &unit_power()).unwrap();
        assert!(plan.satisfies_targets);
        assert_eq!(plan.levels, vec![0.0]);
    }

    #[test]
    fn negative_environment_tightens_demand() {
        // E = -3 means the sensor reads below the bulb model; meeting even
        // a -1 lux target needs A·d ≥ 2, beyond the box, so it falls back
        let model = GainModel::from_parts(vec![vec![1.0]], vec![-3.0]).unwrap();
        let plan = plan_dimming(&model, &[-1.0], &unit_power()).unwrap();
        assert!(!plan.satisfies_targets);
        assert_eq!(plan.levels, vec![1.0]);
    }

    #[test]
    fn rejects_target_length_mismatch() {
        let model = GainModel::zeroed(2, 2);
        assert!(matches!(
            plan_dimming(&model, &[1.0], &unit_power()),
            Err(ControlError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_nan_targets() {
        let model = GainModel::zeroed(1, 1);
        assert_eq!(
            plan_dimming(&model, &[f32::NAN], &unit_power()),
            Err(ControlError::InvalidValue)
        );
    }

    #[test]
    fn power_estimate_charges_lit_bulbs_only() {
        let power = PowerModel {
            slope: 2.0,
            intercept: 1.0,
        };
        assert_eq!(power.power_estimate(&[0.5, 0.0]), 2.0);
        assert_eq!(power.power_estimate(&[0.5, 0.5]), 4.0);
        assert_eq!(power.power_estimate(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn signals_map_to_targets() {
        let signals = [
            NodeSignal::Occupancy(true),
            NodeSignal::Occupancy(false),
            NodeSignal::TargetLux(175.0),
            NodeSignal::TargetLux(0.0),
        ];
        assert_eq!(
            targets_from_signals(&signals, 200.0),
            vec![200.0, 0.0, 175.0, 0.0]
        );
    }
}
