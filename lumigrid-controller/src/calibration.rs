//! Calibration runner
//!
//! Drives the core sweep against the real actuator and sensing net, merges
//! the result with any established model when sensors were added since the
//! last pass, and persists the outcome. The sweep itself never touches
//! storage, so a mid-sweep failure leaves the stored artifacts exactly as
//! they were.

use thiserror::Error;

use lumigrid_core::calibrate::{self, CalibrationConfig, CalibrationKind};
use lumigrid_core::errors::ControlError;
use lumigrid_core::gain::GainModel;
use lumigrid_core::store::{ModelStore, StoreError};
use lumigrid_core::traits::{DimmingActuator, SensorArray};

/// Calibration-pass failures
#[derive(Error, Debug)]
pub enum CalibrateError {
    /// The sweep itself failed; nothing was persisted
    #[error("Calibration sweep failed: {0}")]
    Sweep(#[from] ControlError),

    /// The sweep finished but the model could not be persisted
    #[error("Model persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Runs a calibration pass and persists the resulting model
///
/// A `Refresh` pass against a store whose model has fewer sensors than the
/// fresh sweep keeps the established rows and adopts fresh estimates only
/// for the added sensors, so existing sensors see no discontinuity.
pub fn calibrate_and_store<A, S>(
    actuator: &mut A,
    sensors: &mut S,
    store: &ModelStore,
    config: &CalibrationConfig,
    kind: CalibrationKind,
) -> Result<GainModel, CalibrateError>
where
    A: DimmingActuator + ?Sized,
    S: SensorArray + ?Sized,
{
    let fresh = calibrate::run(actuator, sensors, config, kind)?;
    log::info!(
        "calibration sweep finished: {} sensors x {} bulbs",
        fresh.sensor_count(),
        fresh.bulb_count()
    );

    let model = match (kind, store.load()) {
        (CalibrationKind::Refresh, Ok(old))
            if old.sensor_count() < fresh.sensor_count()
                && old.bulb_count() == fresh.bulb_count() =>
        {
            log::info!(
                "merging {} established sensor rows into the refreshed model",
                old.sensor_count()
            );
            GainModel::merge_preserving(&old, fresh)?
        }
        _ => fresh,
    };

    store.save(&model)?;
    Ok(model)
}
