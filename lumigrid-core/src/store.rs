//! Gain-Model Persistence
//!
//! Stores the calibrated model as two JSON artifacts: the contribution
//! matrix and the environmental-offset vector. Calibration rewrites both;
//! the optimizer loop rewrites only the offset each iteration, so the two
//! files see very different write rates.
//!
//! Every write goes to a temporary sibling file and is renamed into place,
//! so a concurrent reader sees either the old artifact or the new one,
//! never a torn write. The pair itself is single-writer: a crash between
//! the two renames can leave a fresh matrix next to a stale offset, which
//! the next optimizer iteration repairs.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror_no_std::Error;

use crate::errors::ControlError;
use crate::gain::GainModel;

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Artifact exists but does not decode
    #[error("Artifact format invalid: {0}")]
    Format(#[from] serde_json::Error),

    /// Artifacts decode but describe an unusable model
    #[error("Artifact contents invalid: {0}")]
    Model(#[from] ControlError),
}

impl StoreError {
    /// True when the failure is an absent artifact rather than a broken one
    ///
    /// The optimizer skips its cycle and retries on this; anything else is
    /// worth a louder log line.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Durable home of the gain model
#[derive(Debug, Clone)]
pub struct ModelStore {
    gain_path: PathBuf,
    env_path: PathBuf,
}

impl ModelStore {
    /// Store over the given artifact paths
    pub fn new(gain_path: impl Into<PathBuf>, env_path: impl Into<PathBuf>) -> Self {
        Self {
            gain_path: gain_path.into(),
            env_path: env_path.into(),
        }
    }

    /// Path of the contribution-matrix artifact
    pub fn gain_path(&self) -> &Path {
        &self.gain_path
    }

    /// Path of the environmental-offset artifact
    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    /// True when both artifacts are present
    pub fn exists(&self) -> bool {
        self.gain_path.exists() && self.env_path.exists()
    }

    /// Loads and validates the persisted model
    pub fn load(&self) -> StoreResult<GainModel> {
        let a: Vec<Vec<f32>> = serde_json::from_slice(&fs::read(&self.gain_path)?)?;
        let e: Vec<f32> = serde_json::from_slice(&fs::read(&self.env_path)?)?;
        Ok(GainModel::from_parts(a, e)?)
    }

    /// Persists the whole model, matrix first
    pub fn save(&self, model: &GainModel) -> StoreResult<()> {
        write_atomic(&self.gain_path, &serde_json::to_vec(model.contribution())?)?;
        write_atomic(&self.env_path, &serde_json::to_vec(model.environment())?)?;
        Ok(())
    }

    /// Persists only the environmental offset
    pub fn save_environment(&self, model: &GainModel) -> StoreResult<()> {
        write_atomic(&self.env_path, &serde_json::to_vec(model.environment())?)?;
        Ok(())
    }

    /// Removes both artifacts; absent files are fine
    pub fn clear(&self) -> StoreResult<()> {
        for path in [&self.gain_path, &self.env_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Temp-file-then-rename write; readers never observe a partial artifact
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
