//! # Auxiliary pollers
//!
//! Each poller runs on its own thread, reading one piece of equipment on its
//! own schedule and publishing the result into the `DataStore`. A failed read
//! keeps the last good value and raises the snapshot's fault count, the
//! control loop decides what a stale value means.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Internal
use crate::{
    data_store::{AxisState, DataStore},
    hw::{FeedbackSource, GpsReceiver, Imu, InputDevice},
    operator::{load_config_event, OperatorEvent},
};
use comms_if::input::{normalise_axis, Button, InputEvent, STEERING_AXIS, THROTTLE_AXIS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// While a fault persists it is only logged every this many reads.
const FAULT_LOG_INTERVAL: u32 = 100;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Owns the poller threads.
pub struct Pollers {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    running: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Could not spawn the {0} poller: {1}")]
    SpawnFailed(&'static str, std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pollers {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Poll the IMU and car feedback every `period`.
    pub fn spawn_sensors(
        &mut self,
        store: Arc<DataStore>,
        mut imu: Box<dyn Imu>,
        mut car: Box<dyn FeedbackSource>,
        period: Duration,
    ) -> Result<(), PollerError> {
        let running = self.running.clone();

        self.spawn("sensor", move || {
            while running.load(Ordering::SeqCst) {
                match imu.read() {
                    Ok(s) => store.imu.publish(s),
                    Err(e) => log_fault("IMU", store.imu.record_fault(), &e),
                }
                match car.read_feedback() {
                    Ok(fb) => store.car.publish(fb),
                    Err(e) => log_fault("car feedback", store.car.record_fault(), &e),
                }
                thread::sleep(period);
            }
        })
    }

    /// Poll the GPS receiver every `period`.
    pub fn spawn_gps(
        &mut self,
        store: Arc<DataStore>,
        mut gps: Box<dyn GpsReceiver>,
        period: Duration,
    ) -> Result<(), PollerError> {
        let running = self.running.clone();

        self.spawn("gps", move || {
            let mut had_fix = false;

            while running.load(Ordering::SeqCst) {
                match gps.read_fix() {
                    Ok(Some(fix)) => {
                        if fix.has_fix() != had_fix {
                            had_fix = fix.has_fix();
                            info!(
                                "GPS {} ({} satellites)",
                                if had_fix { "fix acquired" } else { "fix lost" },
                                fix.num_sv
                            );
                        }
                        store.gps.publish(fix);
                    }
                    Ok(None) => (),
                    Err(e) => log_fault("GPS", store.gps.record_fault(), &e),
                }
                thread::sleep(period);
            }
        })
    }

    /// Poll the input device, publishing the sticks and forwarding everything
    /// else to the control loop as `OperatorEvent`s.
    ///
    /// Pressing B reads `config_path` here, off the frame context.
    pub fn spawn_input(
        &mut self,
        store: Arc<DataStore>,
        mut device: Box<dyn InputDevice>,
        events: Sender<OperatorEvent>,
        config_path: PathBuf,
        timeout: Duration,
    ) -> Result<(), PollerError> {
        let running = self.running.clone();

        self.spawn("input", move || {
            let mut axes = AxisState::default();

            while running.load(Ordering::SeqCst) {
                let input = match device.poll(timeout) {
                    Ok(i) => i,
                    Err(e) => {
                        log_fault("input device", store.axes.record_fault(), &e);
                        thread::sleep(timeout);
                        continue;
                    }
                };

                for event in input {
                    let op_event = match event {
                        InputEvent::Axis { axis, value } => {
                            apply_axis(&mut axes, axis, value);
                            continue;
                        }
                        InputEvent::ButtonPress(Button::B) => load_config_event(&config_path),
                        e => OperatorEvent::Input(e),
                    };

                    if events.send(op_event).is_err() {
                        debug!("Event receiver dropped, stopping input poller");
                        return;
                    }
                }

                // A successful poll, even an empty one, shows the device is
                // alive
                store.axes.publish(axes);
            }
        })
    }

    /// Signal every poller to stop and wait for them to exit.
    pub fn stop_and_join(self) {
        self.running.store(false, Ordering::SeqCst);

        for (name, h) in self.handles {
            match h.join() {
                Ok(()) => debug!("{} poller stopped", name),
                Err(_) => warn!("{} poller panicked", name),
            }
        }
    }

    fn spawn<F>(&mut self, name: &'static str, f: F) -> Result<(), PollerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let h = thread::Builder::new()
            .name(format!("{}_poller", name))
            .spawn(f)
            .map_err(|e| PollerError::SpawnFailed(name, e))?;

        self.handles.push((name, h));
        Ok(())
    }
}

impl Default for Pollers {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Throttle is the left stick's Y axis, which reads negative when pushed
/// forward.
fn apply_axis(axes: &mut AxisState, axis: u8, value: i16) {
    match axis {
        THROTTLE_AXIS => axes.throttle = -normalise_axis(value),
        STEERING_AXIS => axes.steering = normalise_axis(value),
        _ => (),
    }
}

fn log_fault(what: &str, consecutive: u32, e: &dyn std::fmt::Display) {
    if consecutive == 1 || consecutive % FAULT_LOG_INTERVAL == 0 {
        warn!("{} read failure ({} consecutive): {}", what, consecutive, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::HwError;
    use comms_if::eqpt::{car::CarFeedback, gps::GpsFix, imu::ImuSample};
    use std::sync::mpsc::channel;
    use std::time::Instant;

    struct CountingImu(u32);

    impl Imu for CountingImu {
        fn read(&mut self) -> Result<ImuSample, HwError> {
            self.0 += 1;
            // Every third read fails
            if self.0 % 3 == 0 {
                Err(HwError::ReadFailed("imu", "nack".into()))
            } else {
                Ok(ImuSample {
                    temp_c: self.0 as f32,
                    ..Default::default()
                })
            }
        }
    }

    struct FixedCar;

    impl FeedbackSource for FixedCar {
        fn read_feedback(&mut self) -> Result<CarFeedback, HwError> {
            Ok(CarFeedback {
                servo_pos: 127,
                ..Default::default()
            })
        }
    }

    struct DeadGps;

    impl GpsReceiver for DeadGps {
        fn read_fix(&mut self) -> Result<Option<GpsFix>, HwError> {
            Err(HwError::Disconnected("gps"))
        }
    }

    struct ScriptedPad(Vec<InputEvent>);

    impl InputDevice for ScriptedPad {
        fn poll(&mut self, timeout: Duration) -> Result<Vec<InputEvent>, HwError> {
            if self.0.is_empty() {
                thread::sleep(timeout);
            }
            Ok(self.0.drain(..).collect())
        }
    }

    fn wait_for<F: Fn() -> bool>(f: F) {
        let start = Instant::now();
        while !f() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_sensor_poller() {
        let store = Arc::new(DataStore::default());
        let mut pollers = Pollers::new();

        pollers
            .spawn_sensors(
                store.clone(),
                Box::new(CountingImu(0)),
                Box::new(FixedCar),
                Duration::from_millis(1),
            )
            .unwrap();
        pollers
            .spawn_gps(store.clone(), Box::new(DeadGps), Duration::from_millis(1))
            .unwrap();

        wait_for(|| store.imu.read().seq >= 10 && store.gps.read().consecutive_faults >= 3);
        pollers.stop_and_join();

        assert!(store.imu.latest().unwrap().temp_c > 0.0);
        assert_eq!(store.car.latest().unwrap().servo_pos, 127);
        assert!(store.gps.latest().is_none());
    }

    #[test]
    fn test_input_poller() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("driverconf.toml");
        std::fs::write(&config_path, "max_speed = 200\n").unwrap();

        let store = Arc::new(DataStore::default());
        let (tx, rx) = channel();
        let mut pollers = Pollers::new();

        pollers
            .spawn_input(
                store.clone(),
                Box::new(ScriptedPad(vec![
                    InputEvent::Axis { axis: THROTTLE_AXIS, value: -32767 },
                    InputEvent::Axis { axis: STEERING_AXIS, value: 16384 },
                    InputEvent::ButtonPress(Button::L),
                    InputEvent::ButtonPress(Button::B),
                ])),
                tx,
                config_path,
                Duration::from_millis(1),
            )
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            first,
            OperatorEvent::Input(InputEvent::ButtonPress(Button::L))
        ));

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            OperatorEvent::ConfigLoaded(Ok(c)) => assert_eq!(c.max_speed, 200),
            e => panic!("unexpected event {:?}", e),
        }

        wait_for(|| store.axes.read().seq >= 1);
        pollers.stop_and_join();

        let axes = store.axes.latest().unwrap();
        assert_eq!(axes.throttle, 1.0);
        assert!((axes.steering - 0.5).abs() < 1e-4);
    }
}
