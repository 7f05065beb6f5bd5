//! Bulb-bank actuation
//!
//! Three pieces sit between a dimming vector and the hardware:
//!
//! - [`DimmingCurve`] converts a dimming fraction to the integer control
//!   value the bulbs accept, via the empirical power-law fit. Levels at or
//!   below the off threshold switch the bulb off entirely - the deployed
//!   fixtures cannot physically hold dimming levels in (0, 0.05].
//! - [`DimStore`] persists the applied vector as one line of floats with
//!   an atomic rename, and restores it on startup.
//! - [`BulbBank`] implements [`DimmingActuator`]: it fans a `set_dimming`
//!   call out across one scoped thread per bulb so the total latency is a
//!   single bulb's, collects per-bulb outcomes into a lock-guarded vector,
//!   persists, and then waits the settle time.
//!
//! `dim_levels` before any vector was ever applied or restored is the
//! failure-if-uninitialized case the calibration sweep aborts on.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use lumigrid_core::errors::{ControlError, ControlResult};
use lumigrid_core::traits::DimmingActuator;

/// Hardware seam: applies one bulb's control value
///
/// `None` means the bulb is switched off. Implementations are called from
/// multiple scoped threads at once and must synchronize internally if the
/// underlying bridge is not thread-safe.
pub trait BulbDriver: Sync {
    /// Number of bulbs the driver addresses
    fn bulb_count(&self) -> usize;

    /// Applies a control value to one bulb
    fn apply(&self, bulb: usize, control: Option<u8>) -> ControlResult<()>;
}

/// Empirical dim-to-control power-law fit: `d = a·control^m + b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimmingCurve {
    /// Power-law scale
    pub a: f32,
    /// Power-law exponent
    pub m: f32,
    /// Dimming offset at control 0
    pub b: f32,
}

impl Default for DimmingCurve {
    fn default() -> Self {
        Self {
            a: 2.641_477_8e-5,
            m: 1.895_077_8,
            b: 0.047_462_53,
        }
    }
}

impl DimmingCurve {
    /// Levels at or below this switch the bulb off
    pub const OFF_THRESHOLD: f32 = 0.05;

    /// Largest control value the bulbs accept
    pub const MAX_CONTROL: u8 = 254;

    /// Control value for a dimming level; `None` switches the bulb off
    pub fn control_value(&self, level: f32) -> Option<u8> {
        if level <= Self::OFF_THRESHOLD {
            return None;
        }
        let level = level.min(1.0);
        let control = ((level - self.b) / self.a).powf(1.0 / self.m);
        Some(control.round().clamp(0.0, Self::MAX_CONTROL as f32) as u8)
    }

    /// Dimming level a control value produces (curve inverse)
    ///
    /// Used by the simulated room to model what the hardware actually does
    /// with a quantized control value.
    pub fn dimming_level(&self, control: Option<u8>) -> f32 {
        match control {
            None => 0.0,
            Some(c) => self.a * (c as f32).powf(self.m) + self.b,
        }
    }
}

/// Applied-dimming persistence: one line of space-separated floats
#[derive(Debug, Clone)]
pub struct DimStore {
    path: PathBuf,
}

impl DimStore {
    /// Store over the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Restores the persisted vector; `None` when no state exists yet
    pub fn load(&self) -> io::Result<Option<Vec<f32>>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        contents
            .split_whitespace()
            .map(|field| {
                field.parse::<f32>().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "bad dimming field")
                })
            })
            .collect::<io::Result<Vec<f32>>>()
            .map(Some)
    }

    /// Persists a vector with an atomic temp-file-then-rename write
    pub fn save(&self, levels: &[f32]) -> io::Result<()> {
        let line = levels
            .iter()
            .map(f32::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let mut tmp_name = OsString::from(self.path.file_name().unwrap_or_default());
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        fs::write(&tmp, line)?;
        fs::rename(&tmp, &self.path)
    }

    /// Path of the persistence file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The ceiling's bulbs behind the [`DimmingActuator`] seam
pub struct BulbBank<D: BulbDriver> {
    driver: D,
    curve: DimmingCurve,
    store: DimStore,
    levels: Option<Vec<f32>>,
}

impl<D: BulbDriver> BulbBank<D> {
    /// Bank over a driver, restoring any persisted dimming state
    pub fn new(driver: D, curve: DimmingCurve, store: DimStore) -> io::Result<Self> {
        let levels = match store.load()? {
            Some(levels) if levels.len() == driver.bulb_count() => {
                log::info!("restored dimming state for {} bulbs", levels.len());
                Some(levels)
            }
            Some(levels) => {
                log::warn!(
                    "persisted dimming state has {} bulbs, bank has {}; discarding",
                    levels.len(),
                    driver.bulb_count()
                );
                None
            }
            None => None,
        };
        Ok(Self {
            driver,
            curve,
            store,
            levels,
        })
    }

    fn persist(&self, levels: &[f32]) -> ControlResult<()> {
        self.store.save(levels).map_err(|e| {
            log::error!("dimming state write failed: {e}");
            ControlError::ActuatorUnavailable {
                reason: "dimming state persistence failed",
            }
        })
    }
}

impl<D: BulbDriver> DimmingActuator for BulbBank<D> {
    fn bulb_count(&self) -> usize {
        self.driver.bulb_count()
    }

    fn set_dimming(&mut self, levels: &[f32], settle: Duration) -> ControlResult<()> {
        let count = self.driver.bulb_count();
        if levels.len() != count {
            return Err(ControlError::DimensionMismatch {
                expected: count,
                actual: levels.len(),
            });
        }
        if levels.iter().any(|level| !level.is_finite()) {
            return Err(ControlError::InvalidValue);
        }

        // Off threshold and upper clamp applied before fan-out so the
        // persisted vector matches what the hardware was told
        let applied: Vec<f32> = levels
            .iter()
            .map(|&level| {
                if level <= DimmingCurve::OFF_THRESHOLD {
                    0.0
                } else {
                    level.min(1.0)
                }
            })
            .collect();

        // One thread per bulb; outcomes land in a lock-guarded vector
        let outcomes: Mutex<Vec<ControlResult<()>>> = Mutex::new(vec![Ok(()); count]);
        thread::scope(|scope| {
            for (bulb, &level) in applied.iter().enumerate() {
                let driver = &self.driver;
                let curve = &self.curve;
                let outcomes = &outcomes;
                scope.spawn(move || {
                    let outcome = driver.apply(bulb, curve.control_value(level));
                    outcomes.lock().unwrap_or_else(PoisonError::into_inner)[bulb] = outcome;
                });
            }
        });

        let outcomes = outcomes.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (bulb, outcome) in outcomes.into_iter().enumerate() {
            if let Err(e) = outcome {
                log::error!("bulb {bulb} failed to actuate: {e}");
                return Err(e);
            }
        }

        self.levels = Some(applied.clone());
        self.persist(&applied)?;
        thread::sleep(settle);
        Ok(())
    }

    fn change_dim_on_bulb(
        &mut self,
        bulb: usize,
        delta: f32,
        settle: Duration,
    ) -> ControlResult<f32> {
        if !delta.is_finite() {
            return Err(ControlError::InvalidValue);
        }
        let levels = self
            .levels
            .as_mut()
            .ok_or(ControlError::ActuatorUnavailable {
                reason: "no dimming state to adjust",
            })?;
        if bulb >= levels.len() {
            return Err(ControlError::ActuatorUnavailable {
                reason: "bulb index out of range",
            });
        }

        // The incremental path bypasses the set-path threshold: taking a
        // bulb to e.g. 0.03 and back must round-trip for calibration, so
        // only near-zero targets switch off
        let target = levels[bulb] + delta;
        let target = if target <= 0.01 {
            0.0
        } else {
            target.min(1.0)
        };

        self.driver.apply(bulb, self.curve.control_value(target))?;
        levels[bulb] = target;
        let snapshot = levels.clone();
        self.persist(&snapshot)?;
        thread::sleep(settle);
        Ok(target)
    }

    fn dim_levels(&self) -> ControlResult<Vec<f32>> {
        self.levels
            .clone()
            .ok_or(ControlError::ActuatorUnavailable {
                reason: "no dimming state applied or restored",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Records the last control value applied per bulb
    struct RecordingDriver {
        controls: Mutex<Vec<Option<u8>>>,
        fail_bulb: Option<usize>,
    }

    impl RecordingDriver {
        fn new(count: usize) -> Self {
            Self {
                controls: Mutex::new(vec![None; count]),
                fail_bulb: None,
            }
        }
    }

    impl BulbDriver for RecordingDriver {
        fn bulb_count(&self) -> usize {
            self.controls.lock().unwrap().len()
        }

        fn apply(&self, bulb: usize, control: Option<u8>) -> ControlResult<()> {
            if self.fail_bulb == Some(bulb) {
                return Err(ControlError::ActuatorUnavailable {
                    reason: "bridge rejected command",
                });
            }
            self.controls.lock().unwrap()[bulb] = control;
            Ok(())
        }
    }

    fn bank_in(dir: &Path, driver: RecordingDriver) -> BulbBank<RecordingDriver> {
        BulbBank::new(
            driver,
            DimmingCurve::default(),
            DimStore::new(dir.join("cur_dim_level.txt")),
        )
        .unwrap()
    }

    #[test]
    fn curve_endpoints() {
        let curve = DimmingCurve::default();
        assert_eq!(curve.control_value(0.0), None);
        assert_eq!(curve.control_value(0.05), None);
        assert_eq!(curve.control_value(-0.3), None);
        assert_eq!(curve.control_value(1.0), Some(254));
        assert_eq!(curve.control_value(2.0), Some(254)); // clamped
    }

    #[test]
    fn curve_is_monotone() {
        let curve = DimmingCurve::default();
        let mut previous = 0u8;
        for step in 1..=20 {
            let level = 0.05 + 0.95 * (step as f32 / 20.0);
            let control = curve.control_value(level).unwrap();
            assert!(control >= previous, "non-monotone at level {level}");
            previous = control;
        }
    }

    #[test]
    fn curve_inverse_round_trips_mid_range() {
        let curve = DimmingCurve::default();
        for &level in &[0.1, 0.3, 0.45, 0.6, 0.8, 0.95] {
            let recovered = curve.dimming_level(curve.control_value(level));
            assert!(
                (recovered - level).abs() < 0.01,
                "level {level} round-tripped to {recovered}"
            );
        }
    }

    #[test]
    fn dim_store_round_trips() {
        let dir = tempdir().unwrap();
        let store = DimStore::new(dir.path().join("cur_dim_level.txt"));

        assert_eq!(store.load().unwrap(), None);
        store.save(&[0.8, 0.0, 0.45]).unwrap();
        assert_eq!(store.load().unwrap(), Some(vec![0.8, 0.0, 0.45]));
    }

    #[test]
    fn dim_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let store = DimStore::new(dir.path().join("cur_dim_level.txt"));
        fs::write(store.path(), "0.5 what 0.1").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn set_then_get_round_trips_unchanged() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(3));

        let levels = vec![0.8, 0.0, 0.45];
        bank.set_dimming(&levels, Duration::ZERO).unwrap();
        assert_eq!(bank.dim_levels().unwrap(), levels);

        // and the persisted copy survives a restart
        let restarted = bank_in(dir.path(), RecordingDriver::new(3));
        assert_eq!(restarted.dim_levels().unwrap(), levels);
    }

    #[test]
    fn mismatched_persisted_state_is_discarded() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(3));
        bank.set_dimming(&[0.8, 0.0, 0.45], Duration::ZERO).unwrap();

        // restart with a differently-sized bank over the same file
        let shrunk = bank_in(dir.path(), RecordingDriver::new(2));
        assert!(matches!(
            shrunk.dim_levels(),
            Err(ControlError::ActuatorUnavailable { .. })
        ));
    }

    #[test]
    fn off_threshold_zeroes_low_levels() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(2));

        bank.set_dimming(&[0.03, 0.5], Duration::ZERO).unwrap();
        assert_eq!(bank.dim_levels().unwrap(), vec![0.0, 0.5]);
        assert_eq!(bank.driver.controls.lock().unwrap()[0], None);
    }

    #[test]
    fn change_dim_clamps_and_returns_applied_level() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(2));
        bank.set_dimming(&[0.8, 0.8], Duration::ZERO).unwrap();

        let level = bank.change_dim_on_bulb(0, -0.35, Duration::ZERO).unwrap();
        assert!((level - 0.45).abs() < 1e-6);

        let level = bank.change_dim_on_bulb(1, 0.9, Duration::ZERO).unwrap();
        assert_eq!(level, 1.0);

        let level = bank.change_dim_on_bulb(0, -0.45, Duration::ZERO).unwrap();
        assert_eq!(level, 0.0);
    }

    #[test]
    fn uninitialized_bank_refuses_adjustment_and_query() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(2));

        assert!(matches!(
            bank.dim_levels(),
            Err(ControlError::ActuatorUnavailable { .. })
        ));
        assert!(matches!(
            bank.change_dim_on_bulb(0, 0.1, Duration::ZERO),
            Err(ControlError::ActuatorUnavailable { .. })
        ));
    }

    #[test]
    fn one_failed_bulb_fails_the_whole_set() {
        let dir = tempdir().unwrap();
        let mut driver = RecordingDriver::new(3);
        driver.fail_bulb = Some(1);
        let mut bank = bank_in(dir.path(), driver);

        let err = bank.set_dimming(&[0.5, 0.5, 0.5], Duration::ZERO);
        assert!(matches!(
            err,
            Err(ControlError::ActuatorUnavailable { .. })
        ));
        // failed application leaves no claimed state behind
        assert!(bank.dim_levels().is_err());
    }

    #[test]
    fn rejects_wrong_vector_length_and_nan() {
        let dir = tempdir().unwrap();
        let mut bank = bank_in(dir.path(), RecordingDriver::new(2));

        assert!(matches!(
            bank.set_dimming(&[0.5], Duration::ZERO),
            Err(ControlError::DimensionMismatch { .. })
        ));
        assert_eq!(
            bank.set_dimming(&[f32::NAN, 0.5], Duration::ZERO),
            Err(ControlError::InvalidValue)
        );
    }
}
