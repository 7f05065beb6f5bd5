//! Optimizer supervision and the closed-loop worker
//!
//! The supervisor owns the control channel. `Optimize` cancels any running
//! worker and spawns a fresh one (cancel-then-spawn, so two workers never
//! race on the actuator or the gain store), `Pause` cancels without
//! respawning, `Close` shuts the supervisor down.
//!
//! The worker is the closed loop itself: load the calibrated model, read
//! the current targets, solve for minimal-power dimming, apply it, wait
//! the settle time, read what the room actually did, fold the residual
//! into the environmental offset, persist it, repeat. Un-modeled light -
//! daylight, bulb aging - is absorbed by that offset update without
//! re-running calibration.
//!
//! The worker stops on its own when the illuminance publisher goes stale
//! (the sense loop died or was shut down); everything else it recovers
//! from by skipping the cycle and retrying after a delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lumigrid_core::optimize::{plan_dimming, PowerModel};
use lumigrid_core::store::ModelStore;
use lumigrid_core::traits::DimmingActuator;

use crate::state::SharedState;

/// Commands carried by the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Cancel any running worker and start a fresh one
    Optimize,
    /// Cancel the running worker without replacement
    Pause,
    /// Shut the supervisor down
    Close,
}

/// Worker timing and power parameters
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    /// Wait after applying a dimming vector before trusting readings
    pub settle: Duration,
    /// Back-off when a cycle cannot run
    pub retry_delay: Duration,
    /// Power fit for the LP objective and plan estimates
    pub power: PowerModel,
}

/// Everything a worker needs, cheap to clone per spawn
pub struct OptimizerContext<A> {
    /// The bulb bank, shared with calibration
    pub actuator: Arc<Mutex<A>>,
    /// Cells the sense loop publishes into
    pub state: Arc<SharedState>,
    /// Gain-model artifacts
    pub store: ModelStore,
    /// Timing and power parameters
    pub config: OptimizerConfig,
}

impl<A> Clone for OptimizerContext<A> {
    fn clone(&self) -> Self {
        Self {
            actuator: Arc::clone(&self.actuator),
            state: Arc::clone(&self.state),
            store: self.store.clone(),
            config: self.config,
        }
    }
}

/// Cancellable handle to a running worker
struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn cancel(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.join.join();
    }
}

/// Runs the control-command loop
pub struct OptimizerSupervisor<A> {
    ctx: OptimizerContext<A>,
}

impl<A> OptimizerSupervisor<A>
where
    A: DimmingActuator + Send + 'static,
{
    /// Supervisor over the given context
    pub fn new(ctx: OptimizerContext<A>) -> Self {
        Self { ctx }
    }

    /// Serves commands until `Close` or channel disconnect
    pub fn run(self, commands: mpsc::Receiver<ControlCommand>) {
        let mut active: Option<WorkerHandle> = None;

        while let Ok(command) = commands.recv() {
            match command {
                ControlCommand::Optimize => {
                    if let Some(worker) = active.take() {
                        worker.cancel();
                    }
                    log::info!("starting optimizer worker");
                    active = Some(spawn_worker(self.ctx.clone()));
                }
                ControlCommand::Pause => {
                    if let Some(worker) = active.take() {
                        log::info!("optimizer paused");
                        worker.cancel();
                    }
                }
                ControlCommand::Close => break,
            }
        }

        if let Some(worker) = active.take() {
            worker.cancel();
        }
        log::info!("optimizer supervisor stopped");
    }

    /// Runs the supervisor on its own thread
    pub fn spawn(self, commands: mpsc::Receiver<ControlCommand>) -> JoinHandle<()> {
        thread::spawn(move || self.run(commands))
    }
}

fn spawn_worker<A>(ctx: OptimizerContext<A>) -> WorkerHandle
where
    A: DimmingActuator + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let join = thread::spawn(move || optimize_loop(&ctx, &flag));
    WorkerHandle { stop, join }
}

/// One worker's closed loop; see the module docs
fn optimize_loop<A>(ctx: &OptimizerContext<A>, stop: &AtomicBool)
where
    A: DimmingActuator,
{
    let mut last_seen_seq: Option<u64> = None;

    while !stop.load(Ordering::Acquire) {
        let Some((_, targets)) = ctx.state.targets.snapshot() else {
            thread::sleep(ctx.config.retry_delay);
            continue;
        };

        let mut model = match ctx.store.load() {
            Ok(model) => model,
            Err(e) if e.is_missing() => {
                log::warn!("gain model not calibrated yet; skipping cycle");
                thread::sleep(ctx.config.retry_delay);
                continue;
            }
            Err(e) => {
                log::error!("gain model unreadable ({e}); skipping cycle");
                thread::sleep(ctx.config.retry_delay);
                continue;
            }
        };

        if model.sensor_count() != targets.len() {
            log::warn!(
                "model has {} sensors but targets have {}; awaiting recalibration",
                model.sensor_count(),
                targets.len()
            );
            thread::sleep(ctx.config.retry_delay);
            continue;
        }

        let plan = match plan_dimming(&model, &targets, &ctx.config.power) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("dimming solve failed ({e}); skipping cycle");
                thread::sleep(ctx.config.retry_delay);
                continue;
            }
        };
        log::info!(
            "applying plan: estimated draw {:.2} W{}",
            plan.power_estimate,
            if plan.satisfies_targets {
                ""
            } else {
                " (targets unreachable, full brightness)"
            }
        );

        {
            let mut actuator = ctx.actuator.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = actuator.set_dimming(&plan.levels, ctx.config.settle) {
                log::error!("actuation failed ({e}); skipping cycle");
                thread::sleep(ctx.config.retry_delay);
                continue;
            }
        }

        if stop.load(Ordering::Acquire) {
            break;
        }

        // Closed-loop offset correction from the settled readings
        let Some((seq, readings)) = ctx.state.illuminance.snapshot() else {
            thread::sleep(ctx.config.retry_delay);
            continue;
        };
        if last_seen_seq == Some(seq) {
            log::warn!("illuminance publisher went stale; optimizer stopping");
            break;
        }
        last_seen_seq = Some(seq);

        let applied = {
            let actuator = ctx.actuator.lock().unwrap_or_else(PoisonError::into_inner);
            match actuator.dim_levels() {
                Ok(levels) => levels,
                Err(e) => {
                    log::error!("actuator lost its state ({e}); optimizer stopping");
                    break;
                }
            }
        };

        if let Err(e) = model.update_environment(&readings, &applied) {
            log::warn!("offset update rejected ({e}); skipping cycle");
            thread::sleep(ctx.config.retry_delay);
            continue;
        }
        if let Err(e) = ctx.store.save_environment(&model) {
            log::error!("offset persistence failed: {e}");
            thread::sleep(ctx.config.retry_delay);
        }
    }

    log::debug!("optimizer worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{BulbBank, DimStore, DimmingCurve};
    use crate::sim::SimulatedRoom;
    use lumigrid_core::gain::GainModel;
    use lumigrid_core::traits::SensorArray;
    use std::time::Instant;
    use tempfile::tempdir;

    fn context(
        room: &SimulatedRoom,
        dir: &std::path::Path,
    ) -> OptimizerContext<BulbBank<crate::sim::SimBulbs>> {
        let bank = BulbBank::new(
            room.bulbs(),
            DimmingCurve::default(),
            DimStore::new(dir.join("dim.txt")),
        )
        .unwrap();
        OptimizerContext {
            actuator: Arc::new(Mutex::new(bank)),
            state: SharedState::new(),
            store: ModelStore::new(dir.join("a.json"), dir.join("e.json")),
            config: OptimizerConfig {
                // must exceed the 2ms publisher period, or the worker
                // reads an unchanged sequence and stops as stale
                settle: Duration::from_millis(10),
                retry_delay: Duration::from_millis(5),
                power: PowerModel::default(),
            },
        }
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn optimize_applies_levels_and_updates_offset() {
        let dir = tempdir().unwrap();
        let truth =
            GainModel::from_parts(vec![vec![400.0, 0.0], vec![0.0, 400.0]], vec![0.0, 0.0])
                .unwrap();
        let room = SimulatedRoom::new(truth.clone());
        let ctx = context(&room, dir.path());

        // perfectly calibrated model, but with a wrong offset the loop
        // must correct from observations
        let model = GainModel::from_parts(
            truth.contribution().to_vec(),
            vec![50.0, 50.0],
        )
        .unwrap();
        ctx.store.save(&model).unwrap();
        ctx.state.targets.publish(vec![200.0, 0.0]);

        let (tx, rx) = mpsc::channel();
        let supervisor = OptimizerSupervisor::new(ctx.clone()).spawn(rx);
        tx.send(ControlCommand::Optimize).unwrap();

        // keep the illuminance cell fresh, as the sense loop would
        let publisher = {
            let room = room.clone();
            let state = Arc::clone(&ctx.state);
            thread::spawn(move || {
                let mut sensors = room.sensors();
                for _ in 0..400 {
                    if let Ok(snapshot) = sensors.read() {
                        state.illuminance.publish(snapshot.illuminance);
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };

        // the worker should drive bulb 0 up and leave bulb 1 off
        assert!(wait_until(Duration::from_secs(5), || {
            let levels = room.dim_levels();
            levels[0] > 0.3 && levels[1] == 0.0
        }));

        // and the offset estimate should converge toward the true 0
        assert!(wait_until(Duration::from_secs(5), || {
            match ctx.store.load() {
                Ok(model) => model.environment().iter().all(|e| e.abs() < 5.0),
                Err(_) => false,
            }
        }));

        tx.send(ControlCommand::Close).unwrap();
        supervisor.join().unwrap();
        publisher.join().unwrap();
    }

    #[test]
    fn pause_cancels_the_worker() {
        let dir = tempdir().unwrap();
        let room = SimulatedRoom::new(GainModel::from_parts(vec![vec![100.0]], vec![0.0]).unwrap());
        let ctx = context(&room, dir.path());

        let (tx, rx) = mpsc::channel();
        let supervisor = OptimizerSupervisor::new(ctx).spawn(rx);

        tx.send(ControlCommand::Optimize).unwrap();
        tx.send(ControlCommand::Pause).unwrap();
        tx.send(ControlCommand::Close).unwrap();
        supervisor.join().unwrap();
    }

    #[test]
    fn worker_stops_when_publisher_goes_stale() {
        let dir = tempdir().unwrap();
        let truth = GainModel::from_parts(vec![vec![400.0]], vec![0.0]).unwrap();
        let room = SimulatedRoom::new(truth.clone());
        let ctx = context(&room, dir.path());

        ctx.store.save(&truth).unwrap();
        ctx.state.targets.publish(vec![100.0]);
        // one stale illuminance publish, never refreshed
        ctx.state.illuminance.publish(vec![0.0]);

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::spawn(move || optimize_loop(&ctx, &flag));

        // second iteration sees the unchanged sequence number and exits
        let joined = wait_until(Duration::from_secs(5), || worker.is_finished());
        assert!(joined, "worker did not notice the stale publisher");
        worker.join().unwrap();
        drop(stop);
    }
}
