//! Main drive executable entry point.
//!
//! # Architecture
//!
//! The executable is driven by camera frames. Each frame runs one control
//! cycle:
//!
//!     - Operator event handling
//!     - Vehicle state estimation from the IMU and wheel encoders
//!     - Cone detection and particle filter localisation
//!     - Path tracking against the reference track
//!     - Drive control and actuator output
//!     - Recording and telemetry
//!
//! The IMU, car feedback, GPS and gamepad are read by pollers on their own
//! threads, and all file output goes through the `AsyncWriter` so the frame
//! context never blocks on the disk.
//!
//! # Usage
//!
//! `drive_exec --sim` runs against the simulated car. Without `--sim` a
//! hardware backend is required.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use drive_lib::{
    config::DriverConfig,
    control_loop::{ControlLoop, ControlParts},
    data_store::DataStore,
    drive_ctrl::{self, DriveCtrl},
    frame_source::{ChannelFrameSource, FrameSender, FrameSource},
    gps::LocalFrame,
    hw::{Actuator, ConeDetector},
    loc::{Landmark, LocParams, Localizer},
    operator::OperatorEvent,
    params::DriveExecParams,
    pollers::Pollers,
    status::LogStatusSink,
    track::{PathTracker, Track},
    veh_est::{self, VehicleEstimator},
};
#[cfg(feature = "sim")]
use drive_lib::sim::{self, SharedWorld, SimParams, SimWorld};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::time::Duration;

// Internal
use util::{
    archive::Archiver,
    flush::AsyncWriter,
    logger::{logger_init, LevelFilter},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How long the control loop waits on the frame source before rechecking for
/// a stop request.
const FRAME_POLL_PERIOD: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("drive_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Cycloid Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- ARGUMENTS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let use_sim = match args.len() {
        1 => false,
        2 if args[1] == "--sim" => true,
        _ => return Err(eyre!("Usage: {} [--sim]", args[0])),
    };

    // ---- LOAD PARAMETERS ----

    let exec_params: DriveExecParams =
        params::load("drive_exec.toml").wrap_err("Could not load exec params")?;
    exec_params.validate().wrap_err("Invalid exec params")?;
    let loc_params: LocParams = params::load("loc.toml").wrap_err("Could not load loc params")?;
    let ctrl_params: drive_ctrl::Params =
        params::load("drive_ctrl.toml").wrap_err("Could not load drive_ctrl params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut localizer = Localizer::new(loc_params).wrap_err("Failed to initialise Localizer")?;
    let num_lm = localizer
        .load_landmarks(params::param_path(&exec_params.landmarks_file)?)
        .wrap_err("Failed to load the landmark map")?;
    info!("Localizer init complete, {} landmarks", num_lm);

    let mut estimator = VehicleEstimator::with_params(veh_est::Params::default())?;
    estimator
        .init("veh_est.toml", &session)
        .wrap_err("Failed to initialise VehicleEstimator")?;
    info!("VehicleEstimator init complete");

    let track = Track::load(
        params::param_path(&exec_params.track_file)?,
        exec_params.track_closed,
    )
    .wrap_err("Failed to load the track")?;
    info!("Track loaded, {:.1} m", track.length_m());
    let tracker = PathTracker::new(
        track,
        exec_params.track_search_window,
        exec_params.track_reacquire_dist_m,
    );

    let drive_ctrl = DriveCtrl::new(ctrl_params);
    info!("DriveCtrl init complete");

    let config_path = params::param_path(&exec_params.driver_config_file)?;
    let config = match DriverConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("{}, using the default driver configuration", e);
            DriverConfig::default()
        }
    };

    let gps_frame = match LocalFrame::new(exec_params.gps_ref_lat_e7, exec_params.gps_ref_lon_e7) {
        Ok(f) => Some(f),
        Err(e) => {
            info!("GPS disabled: {}", e);
            None
        }
    };

    info!("Module initialisation complete\n");

    // ---- INITIALISE OUTPUT ----

    let writer = AsyncWriter::new().wrap_err("Failed to start the writer")?;

    let archiver = if exec_params.archive_telemetry {
        Some(
            Archiver::from_path(&session, writer.handle(), "telemetry.csv")
                .wrap_err("Failed to open the telemetry archive")?,
        )
    } else {
        None
    };

    // ---- INITIALISE EQUIPMENT ----

    let store = Arc::new(DataStore::default());
    let (event_tx, event_rx) = channel();
    let mut pollers = Pollers::new();
    let (mut source, frame_sender) = ChannelFrameSource::new(FRAME_POLL_PERIOD);

    let (detector, actuator) = if use_sim {
        init_sim(
            &exec_params,
            &store,
            &mut pollers,
            &mut source,
            SimLinks {
                frames: frame_sender,
                events: event_tx,
                config_path: config_path.clone(),
                gps_frame,
                landmarks: localizer.landmarks().to_vec(),
            },
        )?
    } else {
        return Err(eyre!(
            "No hardware equipment backend is available, run with --sim"
        ));
    };

    // ---- SIGNAL HANDLING ----

    let running = source.running_flag();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
        .wrap_err("Failed to set the Ctrl-C handler")?;

    // ---- MAIN LOOP ----

    let mut ctrl = ControlLoop::new(ControlParts {
        params: exec_params.clone(),
        localizer,
        estimator,
        tracker,
        drive_ctrl,
        config,
        config_path,
        store,
        detector,
        actuator,
        status: Box::new(LogStatusSink::new(exec_params.telemetry_log_period_frames)),
        writer,
        events: event_rx,
        record_dir: session.session_root.clone(),
        archiver,
        gps_frame,
    });

    info!("Beginning main loop\n");

    let result = ctrl.run(&mut source);

    // ---- SHUTDOWN ----

    info!("Shutting down");

    source.stop();
    let stats = ctrl.shutdown();
    pollers.stop_and_join();

    let frames = result.wrap_err("Control loop failed")?;
    let stats = stats.wrap_err("Shutdown failed")?;

    info!(
        "{} frames processed, {} buffers ({} bytes) written, {} dropped",
        frames, stats.buffers_written, stats.bytes_written, stats.buffers_dropped
    );
    info!("End of execution");

    Ok(())
}

/// The ends of the channels and files the simulated equipment is given.
struct SimLinks {
    frames: FrameSender,
    events: Sender<OperatorEvent>,
    config_path: PathBuf,
    gps_frame: Option<LocalFrame>,
    landmarks: Vec<Landmark>,
}

/// Start the simulated equipment, returning the cone detector and actuator
/// the control loop uses.
#[cfg(feature = "sim")]
fn init_sim(
    exec_params: &DriveExecParams,
    store: &Arc<DataStore>,
    pollers: &mut Pollers,
    source: &mut ChannelFrameSource,
    links: SimLinks,
) -> Result<(Box<dyn ConeDetector>, Box<dyn Actuator>), Report> {
    let sim_params: SimParams = params::load("sim.toml").wrap_err("Could not load sim params")?;
    let world = SharedWorld::new(SimWorld::new(sim_params.clone()));

    pollers.spawn_sensors(
        store.clone(),
        Box::new(sim::SimImu::new(world.clone())),
        Box::new(sim::SimFeedback::new(world.clone())),
        exec_params.sensor_poll_period(),
    )?;

    if let Some(f) = links.gps_frame {
        pollers.spawn_gps(
            store.clone(),
            Box::new(sim::SimGps::new(world.clone(), f)),
            exec_params.gps_poll_period(),
        )?;
    }

    pollers.spawn_input(
        store.clone(),
        Box::new(sim::ScriptedInput::new(
            sim_params.home_at_s,
            sim_params.engage_at_s,
            sim_params.throttle_stick,
        )),
        links.events,
        links.config_path,
        exec_params.input_poll_timeout(),
    )?;

    let cam = sim::spawn_camera(world.clone(), links.frames, exec_params.frame_period())?;
    source.set_producer(cam);

    info!("Simulated equipment initialised");

    Ok((
        Box::new(sim::SimConeDetector::new(world.clone(), links.landmarks)),
        Box::new(sim::SimActuator::new(world)),
    ))
}

#[cfg(not(feature = "sim"))]
fn init_sim(
    _exec_params: &DriveExecParams,
    _store: &Arc<DataStore>,
    _pollers: &mut Pollers,
    _source: &mut ChannelFrameSource,
    _links: SimLinks,
) -> Result<(Box<dyn ConeDetector>, Box<dyn Actuator>), Report> {
    Err(eyre!("Built without the \"sim\" feature"))
}
