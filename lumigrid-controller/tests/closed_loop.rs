//! Closed-Loop Integration Tests
//!
//! Exercises the whole controller stack against a simulated room:
//! calibration sweeps the true linear model into the store, the sense loop
//! publishes readings and targets, and the supervisor's worker drives the
//! bulb bank until the sensors meet their targets. No hardware, no
//! network - the simulated room is deterministic up to control-value
//! quantization.

use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lumigrid_controller::actuation::{BulbBank, DimStore, DimmingCurve};
use lumigrid_controller::calibration::calibrate_and_store;
use lumigrid_controller::sensing::{Recoverable, SenseConfig, SenseLoop};
use lumigrid_controller::sim::SimulatedRoom;
use lumigrid_controller::state::SharedState;
use lumigrid_controller::supervisor::{
    ControlCommand, OptimizerConfig, OptimizerContext, OptimizerSupervisor,
};
use lumigrid_core::calibrate::{CalibrationConfig, CalibrationKind};
use lumigrid_core::gain::GainModel;
use lumigrid_core::optimize::PowerModel;
use lumigrid_core::store::ModelStore;
use lumigrid_core::traits::{NodeSignal, SensorArray};

/// Two sensors, three bulbs, mild cross-illumination, a little daylight
fn office_truth() -> GainModel {
    GainModel::from_parts(
        vec![vec![320.0, 80.0, 10.0], vec![15.0, 90.0, 280.0]],
        vec![20.0, 8.0],
    )
    .unwrap()
}

fn fast_calibration() -> CalibrationConfig {
    CalibrationConfig {
        settle: Duration::ZERO,
        ..CalibrationConfig::default()
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

/// Simulated sensors never fault, so shedding is a no-op here
struct SimNet(lumigrid_controller::sim::SimSensors);

impl SensorArray for SimNet {
    fn sensor_count(&self) -> usize {
        self.0.sensor_count()
    }

    fn read(&mut self) -> lumigrid_core::errors::ControlResult<lumigrid_core::traits::SensorSnapshot> {
        self.0.read()
    }
}

impl Recoverable for SimNet {
    fn drop_faulted(&mut self, _index: usize) {}
}

#[test]
fn calibrate_then_meet_targets_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let room = SimulatedRoom::new(office_truth());
    let store = ModelStore::new(dir.path().join("a.json"), dir.path().join("e.json"));

    let bank = BulbBank::new(
        room.bulbs(),
        DimmingCurve::default(),
        DimStore::new(dir.path().join("dim.txt")),
    )
    .unwrap();
    let actuator = Arc::new(Mutex::new(bank));

    // 1. Calibration recovers the room's true model
    {
        let mut actuator = actuator.lock().unwrap();
        let mut sensors = room.sensors();
        let model = calibrate_and_store(
            &mut *actuator,
            &mut sensors,
            &store,
            &fast_calibration(),
            CalibrationKind::Initial,
        )
        .unwrap();

        for (row, true_row) in model.contribution().iter().zip(office_truth().contribution()) {
            for (got, want) in row.iter().zip(true_row) {
                assert!(
                    (got - want).abs() <= 0.02 * want.max(1.0),
                    "calibration estimated {got} for true gain {want}"
                );
            }
        }
    }

    // 2. Sense loop + supervisor drive the room toward the targets
    let state = SharedState::new();
    let (commands_tx, commands_rx) = mpsc::channel();

    let supervisor = OptimizerSupervisor::new(OptimizerContext {
        actuator: Arc::clone(&actuator),
        state: Arc::clone(&state),
        store: store.clone(),
        config: OptimizerConfig {
            settle: Duration::from_millis(20),
            retry_delay: Duration::from_millis(5),
            power: PowerModel::default(),
        },
    })
    .spawn(commands_rx);

    let sense = SenseLoop::new(
        SimNet(room.sensors()),
        Arc::clone(&state),
        commands_tx.clone(),
        store.clone(),
        SenseConfig {
            period: Duration::from_millis(2),
            occupied_lux: 200.0,
        },
    )
    .spawn();

    // both desks occupied
    room.set_signal(0, NodeSignal::Occupancy(true));
    room.set_signal(1, NodeSignal::Occupancy(true));

    let truth = office_truth();
    let met = wait_until(Duration::from_secs(10), || {
        let d = room.dim_levels();
        match lumigrid_core::matrix::matvec(truth.contribution(), &d) {
            Ok(delivered) => delivered
                .iter()
                .zip(truth.environment())
                .all(|(bulbs, ambient)| bulbs + ambient >= 200.0 - 1.0),
            Err(_) => false,
        }
    });
    assert!(met, "room never reached 200 lux at both sensors");

    // 3. Vacate: targets drop to zero and the bulbs switch off
    room.set_signal(0, NodeSignal::Occupancy(false));
    room.set_signal(1, NodeSignal::Occupancy(false));

    let dark = wait_until(Duration::from_secs(10), || {
        room.dim_levels().iter().all(|&d| d == 0.0)
    });
    assert!(dark, "bulbs stayed on after the room was vacated");

    commands_tx.send(ControlCommand::Close).unwrap();
    sense.stop();
    supervisor.join().unwrap();
}

#[test]
fn daylight_reduces_bulb_output_without_recalibration() {
    let dir = tempfile::tempdir().unwrap();
    let truth = GainModel::from_parts(vec![vec![400.0]], vec![0.0]).unwrap();
    let room = SimulatedRoom::new(truth);
    let store = ModelStore::new(dir.path().join("a.json"), dir.path().join("e.json"));

    let bank = BulbBank::new(
        room.bulbs(),
        DimmingCurve::default(),
        DimStore::new(dir.path().join("dim.txt")),
    )
    .unwrap();
    let actuator = Arc::new(Mutex::new(bank));

    {
        let mut actuator = actuator.lock().unwrap();
        let mut sensors = room.sensors();
        calibrate_and_store(
            &mut *actuator,
            &mut sensors,
            &store,
            &fast_calibration(),
            CalibrationKind::Initial,
        )
        .unwrap();
    }

    let state = SharedState::new();
    let (commands_tx, commands_rx) = mpsc::channel();

    let supervisor = OptimizerSupervisor::new(OptimizerContext {
        actuator: Arc::clone(&actuator),
        state: Arc::clone(&state),
        store: store.clone(),
        config: OptimizerConfig {
            settle: Duration::from_millis(20),
            retry_delay: Duration::from_millis(5),
            power: PowerModel::default(),
        },
    })
    .spawn(commands_rx);

    let sense = SenseLoop::new(
        SimNet(room.sensors()),
        Arc::clone(&state),
        commands_tx.clone(),
        store.clone(),
        SenseConfig {
            period: Duration::from_millis(2),
            occupied_lux: 200.0,
        },
    )
    .spawn();

    room.set_signal(0, NodeSignal::Occupancy(true));

    // without daylight the bulb must deliver all 200 lux: d = 0.5
    let lit = wait_until(Duration::from_secs(10), || {
        (room.dim_levels()[0] - 0.5).abs() < 0.05
    });
    assert!(lit, "bulb did not settle near d=0.5 in the dark");

    // daylight floods in; the offset feedback should dim the bulb to ~0.25
    room.set_ambient(0, 100.0);
    let dimmed = wait_until(Duration::from_secs(10), || {
        (room.dim_levels()[0] - 0.25).abs() < 0.05
    });
    assert!(dimmed, "bulb did not yield to daylight");

    commands_tx.send(ControlCommand::Close).unwrap();
    sense.stop();
    supervisor.join().unwrap();
}
