//! # Control loop
//!
//! The control loop owns the localiser, estimator, tracker and drive control
//! along with the recorder and the writer, and runs one complete cycle for
//! every camera frame:
//!
//! - Operator events and writer faults are handled
//! - Sensor snapshots are read from the `DataStore`
//! - The frame is recorded if a recording is active
//! - Cones are detected and the vehicle state estimated
//! - If the car has moved the localiser predicts and is updated with each
//!   cone bearing
//! - The track is matched at the estimated pose
//! - Drive control computes the commands, which are sent to the actuator
//! - Telemetry is reported and archived
//!
//! Nothing in the cycle touches the disk, recordings, archives and saved
//! configurations are all handed to the `AsyncWriter`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Local, Utc};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;

// Internal
use crate::{
    config::{ConfigMenu, DriverConfig},
    data_store::DataStore,
    drive_ctrl::{self, DriveCtrl, DriveMode},
    frame_source::{FrameSource, FrameSourceError},
    gps::LocalFrame,
    hw::{Actuator, ConeDetector},
    loc::Localizer,
    operator::{map_event, OperatorAction, OperatorEvent},
    params::DriveExecParams,
    recorder::{RecordHeader, Recorder, DEFAULT_NAME_FORMAT},
    status::{StatusSink, Telemetry, STATUS_GREEN, STATUS_RED, STATUS_WHITE, STATUS_YELLOW},
    track::PathTracker,
    veh_est::{self, VehicleEstimator},
};
use comms_if::eqpt::{
    cam::{ConeBearing, Frame},
    car::{ActuatorDems, CarFeedback},
    imu::ImuSample,
};
use util::{
    archive::Archiver,
    flush::{AsyncWriter, FlushError, SinkId, WriterStats},
    session,
    time::{seconds_between, to_sec_usec},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything the control loop needs, assembled by the executable.
pub struct ControlParts {
    pub params: DriveExecParams,
    pub localizer: Localizer,
    pub estimator: VehicleEstimator,
    pub tracker: PathTracker,
    pub drive_ctrl: DriveCtrl,
    pub config: DriverConfig,

    /// Where the configuration is saved to
    pub config_path: PathBuf,

    pub store: Arc<DataStore>,
    pub detector: Box<dyn ConeDetector>,
    pub actuator: Box<dyn Actuator>,
    pub status: Box<dyn StatusSink>,
    pub writer: AsyncWriter,
    pub events: Receiver<OperatorEvent>,

    /// Directory recordings are created in
    pub record_dir: PathBuf,

    /// Telemetry archive, if enabled
    pub archiver: Option<Archiver>,

    /// GPS frame, if a reference was configured
    pub gps_frame: Option<LocalFrame>,
}

/// The per-frame orchestrator.
pub struct ControlLoop {
    params: DriveExecParams,
    localizer: Localizer,
    estimator: VehicleEstimator,
    tracker: PathTracker,
    drive_ctrl: DriveCtrl,
    config: DriverConfig,
    config_path: PathBuf,
    menu: ConfigMenu,

    store: Arc<DataStore>,
    detector: Box<dyn ConeDetector>,
    actuator: Box<dyn Actuator>,
    status: Box<dyn StatusSink>,
    events: Receiver<OperatorEvent>,

    writer: AsyncWriter,
    recorder: Recorder,
    archiver: Option<Archiver>,
    gps_frame: Option<LocalFrame>,

    /// Detected cone bearings, reused between frames
    cones: Vec<ConeBearing>,

    /// Timestamp of the previous frame, `None` before the first
    last_frame_time: Option<DateTime<Utc>>,

    /// Feedback used in the previous frame, for the encoder deltas
    last_feedback: CarFeedback,

    /// Demands sent on the previous frame
    last_dems: ActuatorDems,

    /// Last IMU sample received, recorded when the current read failed
    last_imu: ImuSample,

    /// Configuration save queued on the writer and not yet confirmed
    pending_save: Option<SinkId>,

    frame_count: u64,

    telem: Telemetry,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ControlLoopError {
    #[error("Frame source error: {0}")]
    FrameSourceError(#[from] FrameSourceError),

    #[error("Writer error: {0}")]
    WriterError(#[from] FlushError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlLoop {
    pub fn new(parts: ControlParts) -> Self {
        let recorder = Recorder::new(parts.writer.handle(), parts.record_dir);
        let menu = ConfigMenu::new();

        let mut ctrl = Self {
            cones: Vec::with_capacity(parts.params.max_cones),
            params: parts.params,
            localizer: parts.localizer,
            estimator: parts.estimator,
            tracker: parts.tracker,
            drive_ctrl: parts.drive_ctrl,
            config: parts.config,
            config_path: parts.config_path,
            menu,
            store: parts.store,
            detector: parts.detector,
            actuator: parts.actuator,
            status: parts.status,
            events: parts.events,
            writer: parts.writer,
            recorder,
            archiver: parts.archiver,
            gps_frame: parts.gps_frame,
            last_frame_time: None,
            last_feedback: CarFeedback::default(),
            last_dems: ActuatorDems::default(),
            last_imu: ImuSample::default(),
            pending_save: None,
            frame_count: 0,
            telem: Telemetry::default(),
        };

        let lines = ctrl.menu.lines(&ctrl.config);
        ctrl.status.config(&lines);

        ctrl
    }

    /// Run cycles until the frame source stops, returning the number of
    /// frames processed.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<u64, ControlLoopError> {
        info!("Control loop started");

        while let Some(frame) = source.next_frame()? {
            self.on_frame(&frame);
        }

        info!("Control loop stopped after {} frames", self.frame_count);
        Ok(self.frame_count)
    }

    /// Run one control cycle.
    pub fn on_frame(&mut self, frame: &Frame) {
        let cycle_start = Instant::now();
        let rt_warn_s = self.params.rt_warn_s;

        // ---- TIMING ----

        let nominal_dt = 1.0 / self.params.frame_rate_hz;
        let first_frame = self.last_frame_time.is_none();
        let dt = match self.last_frame_time {
            Some(t) => {
                let dt = seconds_between(&t, &frame.timestamp);
                if dt > rt_warn_s {
                    warn!("{:.3} s since the last frame", dt);
                }
                if dt > 0.0 && dt.is_finite() {
                    dt
                } else {
                    warn!("Invalid frame interval of {} s, using {:.3} s", dt, nominal_dt);
                    nominal_dt
                }
            }
            None => nominal_dt,
        };
        self.last_frame_time = Some(frame.timestamp);

        // ---- EVENTS ----

        while let Ok(event) = self.events.try_recv() {
            self.handle_event(&event);
        }

        self.handle_writer_reports();

        // ---- SENSOR INPUT ----

        let imu_snap = self.store.imu.read();
        let imu = match imu_snap.value {
            Some(s) if imu_snap.consecutive_faults == 0 => {
                self.last_imu = s;
                Some(s)
            }
            _ => None,
        };

        let feedback = self.store.car.latest().unwrap_or(self.last_feedback);
        if first_frame {
            self.last_feedback = feedback;
        }
        let wheel_delta = feedback.ticks_since(&self.last_feedback);
        self.last_feedback = feedback;

        // ---- RECORDING ----

        if self.recorder.is_recording() {
            let (sec, usec) = to_sec_usec(&frame.timestamp);
            let header = RecordHeader {
                sec,
                usec,
                throttle: self.last_dems.throttle,
                steering: self.last_dems.steering,
                accel: self.last_imu.accel_ms2,
                gyro: self.last_imu.gyro_rads,
                servo_pos: feedback.servo_pos,
                wheel_pos: feedback.wheel_pos,
                wheel_dt: feedback.wheel_dt,
            };

            if let Err(e) = self.recorder.on_frame(&header, &frame.data) {
                warn!("Recording failed: {}", e);
                self.recorder.stop().ok();
                self.status.status("recording failed", STATUS_RED);
            }
        }

        // ---- VEHICLE STATE ----

        let veh_input = veh_est::InputData {
            config: self.config,
            throttle: self.last_dems.throttle as f64 / 127.0,
            steering: self.last_dems.steering as f64 / 127.0,
            imu,
            servo_pos: feedback.servo_pos,
            wheel_delta,
            dt_s: dt,
        };
        let (veh_state, veh_rpt) = self.estimator.update(&veh_input);

        // ---- LOCALISATION ----

        let gyro_z = self.last_imu.yaw_rate_rads();
        let num_cones = self.detector.find_cones(
            frame,
            self.config.cone_thresh(),
            gyro_z,
            self.params.max_cones,
            &mut self.cones,
        );

        // Only update while moving, otherwise noise accumulates while parked
        let ds = veh_rpt.ds_m;
        if ds > 0.0 {
            let yaw_rate = match imu {
                Some(s) => s.yaw_rate_rads() as f64 - veh_state.gyro_bias_rads,
                None => veh_state.w_rads,
            };
            self.localizer.predict(ds, yaw_rate, dt);

            let precision = self.config.cone_precision as f64 * self.localizer.params().precision_scale;
            for &bearing in self.cones.iter().take(num_cones) {
                self.localizer.update_lm(bearing as f64, precision);
            }
        }

        let pose = self.localizer.location_estimate();
        let geometry = self.tracker.track(&pose);

        // ---- DRIVE CONTROL ----

        let axes = self.store.axes.read();
        let input_fresh = axes.is_fresh(Instant::now(), self.params.input_timeout());
        let sticks = axes.value.unwrap_or_default();

        let ctrl_input = drive_ctrl::InputData {
            js_throttle: sticks.throttle as f64,
            js_steering: sticks.steering as f64,
            input_fresh,
            geometry,
            dt_s: dt,
        };
        let cmd = self
            .drive_ctrl
            .get_control(&self.config, self.estimator.state_mut(), &ctrl_input);

        // ---- ACTUATION ----

        let led = if self.frame_count & 4 != 0 { 1 } else { 0 };
        let dems = ActuatorDems::from_normalised(led, cmd.throttle as f32, cmd.steering as f32);
        if let Err(e) = self.actuator.set_controls(&dems) {
            warn!("Failed to set the car's controls: {}", e);
        }
        self.last_dems = dems;

        // ---- TELEMETRY ----

        let ctrl_rpt = *self.drive_ctrl.report();
        let veh_state = *self.estimator.state();

        self.telem = Telemetry {
            time_s: session::get_elapsed_seconds(),
            frame: self.frame_count,
            mode: self.drive_ctrl.mode(),
            x_m: pose.x_m,
            y_m: pose.y_m,
            heading_rad: pose.heading_rad,
            neff: self.localizer.neff(),
            num_cones,
            progress_m: geometry.progress_m,
            lat_error_m: geometry.lat_error_m,
            head_error_rad: geometry.head_error_rad,
            curvature_m: geometry.curvature_m,
            v_ms: veh_state.v_ms,
            w_rads: veh_state.w_rads,
            gyro_bias_rads: veh_state.gyro_bias_rads,
            target_v_ms: ctrl_rpt.target_v_ms,
            throttle: dems.throttle as f64 / 127.0,
            steering: dems.steering as f64 / 127.0,
            runaway: ctrl_rpt.runaway,
            recording: self.recorder.is_recording(),
            ..Default::default()
        };

        if let (Some(local), Some(fix)) = (self.gps_frame, self.store.gps.latest()) {
            if fix.has_fix() {
                let p = local.to_local(&fix);
                self.telem.gps_east_m = Some(p[0]);
                self.telem.gps_north_m = Some(p[1]);
                self.telem.gps_speed_ms = Some(fix.ground_speed_ms());
            }
        }

        self.status.telemetry(&self.telem);

        if let Some(arch) = self.archiver.as_mut() {
            if let Err(e) = arch.serialise(&self.telem) {
                warn!("Telemetry archiving disabled: {}", e);
                self.archiver = None;
            }
        }

        self.frame_count += 1;

        let cycle_s = cycle_start.elapsed().as_secs_f64();
        if cycle_s > rt_warn_s {
            warn!("Control cycle took {:.3} s", cycle_s);
        }
    }

    /// Act on an operator event.
    pub fn handle_event(&mut self, event: &OperatorEvent) {
        let action = match map_event(event) {
            Some(a) => a,
            None => return,
        };
        debug!("Operator action {:?}", action);

        match action {
            OperatorAction::StartRecording => {
                if self.recorder.is_recording() {
                    return;
                }
                let name = Local::now().format(DEFAULT_NAME_FORMAT).to_string();
                match self.recorder.start(&name, self.params.record_frameskip) {
                    Ok(()) => self.status.status(&name, STATUS_YELLOW),
                    Err(e) => {
                        warn!("Cannot start recording: {}", e);
                        self.status.status("recording failed", STATUS_RED);
                    }
                }
            }
            OperatorAction::StopRecording => match self.recorder.stop() {
                Ok(true) => self.status.status("recording stopped", STATUS_WHITE),
                Ok(false) => (),
                Err(e) => warn!("Cannot stop recording: {}", e),
            },
            OperatorAction::ResetPose => {
                self.localizer.reset();
                self.tracker.reset();
                self.estimator.capture_gyro_bias();
                info!("Pose reset to the starting line");
                self.status.status("starting line", STATUS_GREEN);
            }
            OperatorAction::Engage => self.drive_ctrl.engage(self.estimator.state_mut()),
            OperatorAction::Disengage => self.drive_ctrl.disengage(self.estimator.state_mut()),
            OperatorAction::ResetAndApplyConfig(config) => {
                self.estimator.reset();
                info!("Vehicle state reset");

                match config {
                    Some(c) => {
                        self.config = c;
                        info!("Driver configuration loaded");
                        self.show_config();
                        self.status.status("config loaded", STATUS_WHITE);
                    }
                    None => {
                        warn!("Driver configuration could not be loaded, keeping the current one");
                        self.status.status("config load failed", STATUS_RED);
                    }
                }
            }
            OperatorAction::SaveConfig => {
                let saved = self
                    .config
                    .to_toml()
                    .map_err(|e| e.to_string())
                    .and_then(|text| {
                        self.writer
                            .handle()
                            .replace_file(&self.config_path, text.into_bytes())
                            .map_err(|e| e.to_string())
                    });

                match saved {
                    Ok(id) => {
                        debug!("Driver configuration queued for {:?}", self.config_path);
                        self.pending_save = Some(id);
                    }
                    Err(e) => {
                        warn!("Cannot save the driver configuration: {}", e);
                        self.status.status("config save failed", STATUS_RED);
                    }
                }
            }
            OperatorAction::Menu(dir) => {
                self.menu.on_dpad(dir, &mut self.config);
                self.show_config();
            }
            OperatorAction::Modifier { button, held } => {
                self.menu.set_modifier(button, held);
            }
            OperatorAction::NextDisplayMode => self.status.next_display_mode(),
        }
    }

    /// Stop recording, drain the writer and park the car.
    pub fn shutdown(self) -> Result<WriterStats, ControlLoopError> {
        let ControlLoop {
            mut recorder,
            archiver,
            writer,
            mut actuator,
            ..
        } = self;

        if let Err(e) = recorder.stop() {
            warn!("Cannot stop recording: {}", e);
        }
        if let Some(a) = archiver {
            if let Err(e) = a.close() {
                warn!("Cannot close the telemetry archive: {}", e);
            }
        }

        let stats = writer.shutdown();

        info!("Parking the car");
        if let Err(e) = actuator.set_controls(&ActuatorDems::park(0)) {
            warn!("Failed to park the car: {}", e);
        }

        Ok(stats?)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn localizer(&self) -> &Localizer {
        &self.localizer
    }

    pub fn estimator(&self) -> &VehicleEstimator {
        &self.estimator
    }

    pub fn drive_mode(&self) -> DriveMode {
        self.drive_ctrl.mode()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn last_dems(&self) -> &ActuatorDems {
        &self.last_dems
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telem
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Act on the faults and completed file replacements reported by the
    /// writer since the last frame.
    fn handle_writer_reports(&mut self) {
        for fault in self.writer.poll_faults() {
            if self.recorder.handle_fault(&fault) {
                self.status.status("recording failed", STATUS_RED);
            } else if self.archiver.as_ref().map(Archiver::sink) == Some(fault.id) {
                warn!("Telemetry archiving disabled: {}", fault.message);
                self.archiver = None;
                self.status.status("telemetry failed", STATUS_RED);
            } else if self.pending_save == Some(fault.id) {
                warn!("Cannot save the driver configuration: {}", fault.message);
                self.pending_save = None;
                self.status.status("config save failed", STATUS_RED);
            }
        }

        for id in self.writer.poll_replaced() {
            if self.pending_save == Some(id) {
                info!("Driver configuration saved to {:?}", self.config_path);
                self.pending_save = None;
                self.status.status("config saved", STATUS_WHITE);
            }
        }
    }

    fn show_config(&mut self) {
        let lines = self.menu.lines(&self.config);
        self.status.config(&lines);
    }
}
