//! Background motion-polling loop
//!
//! Samples the PIR driver at a fixed cadence and records each bit into the
//! shared occupancy tracker. The tracker is behind a mutex because the
//! responder reads it concurrently to answer `Read` requests. A failed
//! sample is logged and skipped; the poll cadence is kept either way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lumigrid_core::occupancy::OccupancyTracker;

use crate::drivers::MotionSensor;

/// Handle to the polling thread; dropped without `stop` the thread runs on
pub struct MotionPoller {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MotionPoller {
    /// Poll cadence deployed nodes run at
    pub const DEFAULT_CADENCE: Duration = Duration::from_millis(150);

    /// Starts the polling thread
    pub fn spawn<S, const N: usize>(
        mut sensor: S,
        tracker: Arc<Mutex<OccupancyTracker<N>>>,
        cadence: Duration,
    ) -> Self
    where
        S: MotionSensor + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                match sensor.read_motion() {
                    Ok(motion) => {
                        tracker
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record(motion);
                    }
                    Err(e) => log::warn!("motion read failed, skipping sample: {e}"),
                }
                thread::sleep(cadence);
            }
        });

        Self { stop, handle }
    }

    /// Signals the thread to stop and waits for it to exit
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}
