//! Sense-and-publish loop
//!
//! Polls the sensing net at ~10Hz, publishes the illuminance vector every
//! poll, and publishes the occupancy-derived target vector whenever it
//! changes - sending `Optimize` down the control channel so the
//! supervisor restarts the worker against the new targets. The first
//! successful poll always publishes and kicks the optimizer, so the loop
//! starts as soon as real targets exist.
//!
//! A faulted node is shed, its gain-model row is deleted from the store,
//! and the loop carries on with the remaining nodes; losing the last node
//! sends `Close` and stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lumigrid_core::errors::ControlError;
use lumigrid_core::optimize::targets_from_signals;
use lumigrid_core::store::ModelStore;
use lumigrid_core::traits::SensorArray;

use crate::nodes::SensorNet;
use crate::state::SharedState;
use crate::supervisor::ControlCommand;

/// Sensor arrays that can shed a faulted endpoint and carry on
pub trait Recoverable: SensorArray {
    /// Tears endpoint `index` down; later endpoints shift down one index
    fn drop_faulted(&mut self, index: usize);
}

impl Recoverable for SensorNet {
    fn drop_faulted(&mut self, index: usize) {
        self.drop_node(index);
    }
}

/// Sense-loop timing and target parameters
#[derive(Debug, Clone, Copy)]
pub struct SenseConfig {
    /// Poll period (~100ms deployed)
    pub period: Duration,
    /// Target lux at an occupied stationary sensor
    pub occupied_lux: f32,
}

/// Handle to a spawned sense loop
pub struct SenseHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl SenseHandle {
    /// Signals the loop to stop and waits for it to exit
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.join.join();
    }
}

/// The controller's sense-and-publish loop
pub struct SenseLoop<N: Recoverable> {
    net: N,
    state: Arc<SharedState>,
    commands: mpsc::Sender<ControlCommand>,
    store: ModelStore,
    config: SenseConfig,
}

impl<N: Recoverable> SenseLoop<N> {
    /// Loop over a connected net, publishing into `state`
    pub fn new(
        net: N,
        state: Arc<SharedState>,
        commands: mpsc::Sender<ControlCommand>,
        store: ModelStore,
        config: SenseConfig,
    ) -> Self {
        Self {
            net,
            state,
            commands,
            store,
            config,
        }
    }

    /// Polls until `stop` is set, the supervisor goes away, or the last
    /// node is lost
    pub fn run(mut self, stop: &AtomicBool) {
        let mut last_targets: Option<Vec<f32>> = None;

        while !stop.load(Ordering::Acquire) {
            if self.net.sensor_count() == 0 {
                log::error!("no sensing nodes left; sense loop stopping");
                let _ = self.commands.send(ControlCommand::Close);
                return;
            }

            match self.net.read() {
                Ok(snapshot) => {
                    self.state.illuminance.publish(snapshot.illuminance);

                    let targets =
                        targets_from_signals(&snapshot.signals, self.config.occupied_lux);
                    if last_targets.as_deref() != Some(targets.as_slice()) {
                        log::info!("targets now {targets:?}; restarting optimizer");
                        self.state.targets.publish(targets.clone());
                        if self.commands.send(ControlCommand::Optimize).is_err() {
                            log::warn!("supervisor gone; sense loop stopping");
                            return;
                        }
                        last_targets = Some(targets);
                    }
                }
                Err(ControlError::NodeFault { index }) => {
                    self.net.drop_faulted(index);
                    self.prune_model_row(index);
                    // dimensions changed; force a fresh publish next poll
                    last_targets = None;
                }
                Err(e) => log::warn!("sensor read failed ({e}); retrying"),
            }

            thread::sleep(self.config.period);
        }
    }

    /// Runs the loop on its own thread
    pub fn spawn(self) -> SenseHandle
    where
        N: Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let join = thread::spawn(move || self.run(&flag));
        SenseHandle { stop, join }
    }

    /// Deletes a shed node's row from the stored model
    fn prune_model_row(&self, index: usize) {
        let mut model = match self.store.load() {
            Ok(model) => model,
            Err(e) if e.is_missing() => return, // nothing calibrated yet
            Err(e) => {
                log::error!("cannot prune gain row {index}: {e}");
                return;
            }
        };
        match model.remove_sensor(index) {
            Ok(()) => {
                if let Err(e) = self.store.save(&model) {
                    log::error!("pruned model could not be persisted: {e}");
                } else {
                    log::info!("gain row {index} deleted; {} sensors remain", model.sensor_count());
                }
            }
            Err(e) => log::error!("cannot prune gain row {index}: {e}"),
        }
    }
}
