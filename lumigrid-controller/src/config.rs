//! Deployment configuration
//!
//! Every empirical constant the controller runs on lives here, with the
//! deployed values as defaults: a config file only needs to name the nodes
//! and override what differs. Timings are plain millisecond fields so the
//! JSON stays flat; accessors convert to `Duration`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lumigrid_core::calibrate::CalibrationConfig;
use lumigrid_core::optimize::PowerModel;
use lumigrid_core::store::ModelStore;

use crate::supervisor::OptimizerConfig;

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Config I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Config file is not valid JSON for [`ControllerConfig`]
    #[error("Config format invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// How a node's signal field is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Signal is an occupancy bit; occupied maps to the occupied-lux target
    Stationary,
    /// Signal is the user's preference lux, used as the target directly
    Portable,
}

/// One sensing node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// `host:port` the node's responder listens on
    pub addr: String,
    /// Signal interpretation
    pub kind: NodeKind,
    /// Counts-to-lux scale for this node's light sensor (empirical,
    /// per-unit; deployed values sit around 0.45-0.52)
    pub light_calibration: f32,
}

/// Full controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Sensing nodes, in gain-model row order
    pub nodes: Vec<NodeConfig>,
    /// Number of bulbs in the ceiling bank
    pub bulbs: usize,
    /// Target lux at an occupied stationary sensor
    pub occupied_lux: f32,

    /// Sense-loop poll period
    pub sense_period_ms: u64,
    /// Settle wait after the optimizer applies a dimming vector
    pub settle_ms: u64,
    /// Optimizer back-off when a cycle cannot run (model missing etc.)
    pub retry_delay_ms: u64,
    /// Node TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Node TCP read timeout
    pub read_timeout_ms: u64,

    /// Contribution-matrix artifact
    pub gain_path: PathBuf,
    /// Environmental-offset artifact
    pub env_path: PathBuf,
    /// Applied-dimming persistence file
    pub dim_path: PathBuf,

    /// Calibration perturbation step
    pub calibration_step: f32,
    /// Calibration direction pivot
    pub calibration_pivot: f32,
    /// Baseline level for an initial calibration
    pub calibration_baseline: f32,
    /// Settle wait during calibration sweeps
    pub calibration_settle_ms: u64,

    /// Power-vs-dimming fit used for the LP objective and plan estimates
    pub power: PowerModel,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let calibration = CalibrationConfig::default();
        Self {
            nodes: Vec::new(),
            bulbs: 8,
            occupied_lux: 200.0,
            sense_period_ms: 100,
            settle_ms: 1500,
            retry_delay_ms: 1000,
            connect_timeout_ms: 2000,
            read_timeout_ms: 2000,
            gain_path: PathBuf::from("illum_gain.json"),
            env_path: PathBuf::from("env_gain.json"),
            dim_path: PathBuf::from("cur_dim_level.txt"),
            calibration_step: calibration.step,
            calibration_pivot: calibration.pivot,
            calibration_baseline: calibration.baseline,
            calibration_settle_ms: calibration.settle.as_millis() as u64,
            power: PowerModel::default(),
        }
    }
}

impl ControllerConfig {
    /// Loads configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Sense-loop poll period
    pub fn sense_period(&self) -> Duration {
        Duration::from_millis(self.sense_period_ms)
    }

    /// Optimizer settle wait
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Node connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Node read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Gain-model store over the configured artifact paths
    pub fn model_store(&self) -> ModelStore {
        ModelStore::new(&self.gain_path, &self.env_path)
    }

    /// Calibration sweep parameters
    pub fn calibration(&self) -> CalibrationConfig {
        CalibrationConfig {
            step: self.calibration_step,
            pivot: self.calibration_pivot,
            baseline: self.calibration_baseline,
            settle: Duration::from_millis(self.calibration_settle_ms),
            ..CalibrationConfig::default()
        }
    }

    /// Optimizer worker parameters
    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig {
            settle: self.settle(),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            power: self.power,
        }
    }
}
