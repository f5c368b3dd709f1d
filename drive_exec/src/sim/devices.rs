//! Simulated equipment
//!
//! Every device reads from or writes to the shared `SimWorld`. The camera
//! thread is the only one that advances time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::debug;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use super::{SharedWorld, SimError};
use crate::{
    frame_source::FrameSender,
    gps::LocalFrame,
    hw::{Actuator, ConeDetector, FeedbackSource, GpsReceiver, HwError, Imu, InputDevice},
    loc::Landmark,
};
use comms_if::{
    eqpt::{
        cam::{ConeBearing, Frame},
        car::{ActuatorDems, CarFeedback},
        gps::GpsFix,
        imu::ImuSample,
    },
    input::{Button, InputEvent, AXIS_FULL_SCALE, THROTTLE_AXIS},
};
use util::maths::{clamp, wrap_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Size of the placeholder image carried by each simulated frame.
const FRAME_WIDTH: u32 = 16;
const FRAME_HEIGHT: u32 = 4;

const GRAVITY_MS2: f64 = 9.81;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gaussian noise generator.
struct Noise {
    rng: StdRng,
    dist: Option<Normal<f64>>,
}

pub struct SimImu {
    world: SharedWorld,
    noise: Noise,
}

pub struct SimFeedback {
    world: SharedWorld,
}

pub struct SimActuator {
    world: SharedWorld,
}

/// Detects cones by projecting the landmark map through the true pose.
pub struct SimConeDetector {
    world: SharedWorld,
    landmarks: Vec<Landmark>,
    noise: Noise,
}

pub struct SimGps {
    world: SharedWorld,
    frame: LocalFrame,
}

/// Operator who presses Home, then engages autodrive with a fixed throttle
/// stick.
pub struct ScriptedInput {
    start: Instant,
    home_at: Duration,
    engage_at: Duration,
    throttle_stick: f64,
    home_sent: bool,
    engaged: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Spawn the simulated camera, which steps the world and sends a frame every
/// `period` until the sender's source stops.
pub fn spawn_camera(
    world: SharedWorld,
    sender: FrameSender,
    period: Duration,
) -> Result<JoinHandle<()>, SimError> {
    thread::Builder::new()
        .name("sim_camera".into())
        .spawn(move || {
            let mut last = Instant::now();

            while sender.is_running() {
                thread::sleep(period);

                let now = Instant::now();
                world.lock().step((now - last).as_secs_f64());
                last = now;

                let frame = Frame {
                    timestamp: Utc::now(),
                    width: FRAME_WIDTH,
                    height: FRAME_HEIGHT,
                    data: vec![0; (FRAME_WIDTH * FRAME_HEIGHT) as usize],
                };

                if !sender.send(frame) {
                    break;
                }
            }

            debug!("Simulated camera stopped");
        })
        .map_err(SimError::SpawnFailed)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Noise {
    fn new(std_dev: f64, seed: u64) -> Self {
        let rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };

        Self {
            rng,
            dist: if std_dev > 0.0 {
                Normal::new(0.0, std_dev).ok()
            } else {
                None
            },
        }
    }

    fn sample(&mut self) -> f64 {
        match self.dist {
            Some(ref d) => d.sample(&mut self.rng),
            None => 0.0,
        }
    }
}

impl SimImu {
    pub fn new(world: SharedWorld) -> Self {
        let (sd, seed) = {
            let w = world.lock();
            (w.params().gyro_noise_rads, w.params().seed)
        };
        Self {
            world,
            noise: Noise::new(sd, seed),
        }
    }
}

impl Imu for SimImu {
    fn read(&mut self) -> Result<ImuSample, HwError> {
        let (v, w, bias) = {
            let world = self.world.lock();
            (world.v_ms, world.yaw_rate_rads, world.params().gyro_bias_rads)
        };

        Ok(ImuSample {
            accel_ms2: [0.0, (v * w) as f32, GRAVITY_MS2 as f32],
            gyro_rads: [0.0, 0.0, (w + bias + self.noise.sample()) as f32],
            temp_c: 25.0,
        })
    }
}

impl SimFeedback {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

impl FeedbackSource for SimFeedback {
    fn read_feedback(&mut self) -> Result<CarFeedback, HwError> {
        let w = self.world.lock();

        // Same calibration the estimator inverts
        let servo = 127.0 - 100.0 * w.steering;
        let enc = w.encoder();
        let tick_us = if w.v_ms > 0.0 {
            clamp(&(w.params().meters_per_tick / w.v_ms * 1e6), &0.0, &(u16::MAX as f64)) as u16
        } else {
            u16::MAX
        };

        Ok(CarFeedback {
            servo_pos: clamp(&servo, &0.0, &255.0) as u8,
            wheel_pos: [enc; 4],
            wheel_dt: [tick_us; 4],
        })
    }
}

impl SimActuator {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

impl Actuator for SimActuator {
    fn set_controls(&mut self, dems: &ActuatorDems) -> Result<(), HwError> {
        let mut w = self.world.lock();
        w.throttle = dems.throttle as f64 / 127.0;
        w.steering = dems.steering as f64 / 127.0;
        Ok(())
    }
}

impl SimConeDetector {
    pub fn new(world: SharedWorld, landmarks: Vec<Landmark>) -> Self {
        let (sd, seed) = {
            let w = world.lock();
            (w.params().bearing_noise_rad, w.params().seed)
        };
        Self {
            world,
            landmarks,
            // Separate stream from the IMU
            noise: Noise::new(sd, seed.wrapping_add(1)),
        }
    }
}

impl ConeDetector for SimConeDetector {
    fn find_cones(
        &mut self,
        _frame: &Frame,
        _thresh: f64,
        _gyro_z_rads: f32,
        max_cones: usize,
        out: &mut Vec<ConeBearing>,
    ) -> usize {
        out.clear();

        let (pose, half_fov, range) = {
            let w = self.world.lock();
            (w.pose, w.params().camera_half_fov_rad, w.params().cone_range_m)
        };

        for lm in self.landmarks.iter() {
            if out.len() >= max_cones {
                break;
            }

            let dx = lm.x_m - pose.x_m;
            let dy = lm.y_m - pose.y_m;
            if dx.hypot(dy) > range {
                continue;
            }

            let bearing = wrap_pi(dy.atan2(dx) - pose.heading_rad);
            if bearing.abs() > half_fov {
                continue;
            }

            out.push((bearing + self.noise.sample()) as ConeBearing);
        }

        out.len()
    }
}

impl SimGps {
    /// Map X is east and map Y is north in `frame`.
    pub fn new(world: SharedWorld, frame: LocalFrame) -> Self {
        Self { world, frame }
    }
}

impl GpsReceiver for SimGps {
    fn read_fix(&mut self) -> Result<Option<GpsFix>, HwError> {
        let (pose, v) = {
            let w = self.world.lock();
            (w.pose, w.v_ms)
        };

        let (lat_e7, lon_e7) = self.frame.to_global(pose.x_m, pose.y_m);
        let north = v * pose.heading_rad.sin() * 1e3;
        let east = v * pose.heading_rad.cos() * 1e3;

        Ok(Some(GpsFix {
            lat_e7,
            lon_e7,
            num_sv: 9,
            fix_type: 3,
            vel_ned_mm_s: [north as i32, east as i32, 0],
            h_acc_mm: 1500,
        }))
    }
}

impl ScriptedInput {
    pub fn new(home_at_s: f64, engage_at_s: f64, throttle_stick: f64) -> Self {
        Self {
            start: Instant::now(),
            home_at: Duration::from_secs_f64(home_at_s.max(0.0)),
            engage_at: Duration::from_secs_f64(engage_at_s.max(0.0)),
            throttle_stick: clamp(&throttle_stick, &0.0, &1.0),
            home_sent: false,
            engaged: false,
        }
    }

    fn due(&mut self) -> Vec<InputEvent> {
        let elapsed = self.start.elapsed();
        let mut events = Vec::new();

        if !self.home_sent && elapsed >= self.home_at {
            self.home_sent = true;
            events.push(InputEvent::ButtonPress(Button::Home));
        }

        if self.home_sent && !self.engaged && elapsed >= self.engage_at {
            self.engaged = true;

            // Forward on the throttle stick reads negative
            events.push(InputEvent::Axis {
                axis: THROTTLE_AXIS,
                value: -(self.throttle_stick * AXIS_FULL_SCALE as f64) as i16,
            });
            events.push(InputEvent::ButtonPress(Button::L));
        }

        events
    }
}

impl InputDevice for ScriptedInput {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<InputEvent>, HwError> {
        let events = self.due();
        if events.is_empty() {
            thread::sleep(timeout);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{SimParams, SimWorld};
    use comms_if::input::normalise_axis;

    fn world() -> SharedWorld {
        SharedWorld::new(SimWorld::new(SimParams {
            bearing_noise_rad: 0.0,
            gyro_noise_rads: 0.0,
            seed: 1,
            ..Default::default()
        }))
    }

    fn frame() -> Frame {
        Frame {
            timestamp: Utc::now(),
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_cone_visibility() {
        let w = world();
        let mut det = SimConeDetector::new(
            w.clone(),
            vec![
                // Ahead and left
                Landmark { x_m: 5.0, y_m: 1.0 },
                // Behind
                Landmark { x_m: -5.0, y_m: 0.0 },
                // Out of range
                Landmark { x_m: 50.0, y_m: 0.0 },
                // Outside the field of view
                Landmark { x_m: 1.0, y_m: 3.0 },
            ],
        );

        let mut out = Vec::new();
        assert_eq!(det.find_cones(&frame(), 0.0, 0.0, 8, &mut out), 1);
        assert!((out[0] as f64 - (1.0f64).atan2(5.0)).abs() < 1e-6);

        // Turning to face the cone puts it dead ahead
        w.lock().pose.heading_rad = (1.0f64).atan2(5.0);
        det.find_cones(&frame(), 0.0, 0.0, 8, &mut out);
        assert!(out[0].abs() < 1e-6);

        assert_eq!(det.find_cones(&frame(), 0.0, 0.0, 0, &mut out), 0);
    }

    #[test]
    fn test_car_loop() {
        let w = world();
        let mut act = SimActuator::new(w.clone());
        let mut fb = SimFeedback::new(w.clone());

        act.set_controls(&ActuatorDems::from_normalised(0, 1.0, -0.5)).unwrap();
        assert_eq!(w.lock().throttle, 1.0);

        let before = fb.read_feedback().unwrap();
        for _ in 0..50 {
            w.lock().step(0.01);
        }
        let after = fb.read_feedback().unwrap();

        let ticks = after.ticks_since(&before)[0] as f64;
        let expected = w.lock().odometer_ticks.floor();
        assert_eq!(ticks, expected);
        assert!(after.servo_pos > 127);
        assert!(after.wheel_dt[0] < u16::MAX);
    }

    #[test]
    fn test_imu_reports_bias() {
        let w = world();
        let mut imu = SimImu::new(w);
        let s = imu.read().unwrap();
        assert!((s.yaw_rate_rads() - 0.01).abs() < 1e-6);
        assert!(s.is_valid());
    }

    #[test]
    fn test_gps_tracks_pose() {
        let w = world();
        let frame = LocalFrame::new(515_000_000, -1_000_000).unwrap();
        let mut gps = SimGps::new(w.clone(), frame);

        {
            let mut g = w.lock();
            g.pose.x_m = 30.0;
            g.pose.y_m = -12.0;
            g.v_ms = 2.0;
        }

        let fix = gps.read_fix().unwrap().unwrap();
        assert!(fix.has_fix());
        let local = frame.to_local(&fix);
        assert!((local[0] - 30.0).abs() < 0.05);
        assert!((local[1] + 12.0).abs() < 0.05);
        assert!((fix.ground_speed_ms() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_scripted_operator() {
        let mut input = ScriptedInput::new(0.0, 0.0, 0.5);

        let events = input.poll(Duration::from_millis(1)).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], InputEvent::ButtonPress(Button::Home));
        match events[1] {
            InputEvent::Axis { axis, value } => {
                assert_eq!(axis, THROTTLE_AXIS);
                assert!((-normalise_axis(value) - 0.5).abs() < 1e-3);
            }
            ref e => panic!("unexpected event {:?}", e),
        }
        assert_eq!(events[2], InputEvent::ButtonPress(Button::L));

        assert!(input.poll(Duration::from_millis(1)).unwrap().is_empty());
    }
}
