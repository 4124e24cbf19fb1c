//! Laser Arcade - headless pipeline runner
//!
//! Loads settings and calibration, opens a frame source (still images or a
//! webcam), and runs detection, mapping and dwell-click routing, logging
//! the resulting pointer events.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use laser_arcade::app::{LogConsumer, Orchestrator, SurfaceRequest, SurfaceTarget};
use laser_arcade::calibration::CalibrationEngine;
use laser_arcade::camera::{FrameSource, ImageSequenceSource};
use laser_arcade::config::{AppPaths, Settings, SettingsStore};
use laser_arcade::telemetry::{init_logging, LogConfig};
use laser_arcade::PipelineError;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "laser-arcade")]
#[command(version, about = "Laser pointer tracking and dwell-click pointer events", long_about = None)]
struct Args {
    /// Replay still images from this directory instead of a camera
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,

    /// Restart the image sequence when it runs out
    #[arg(long, requires = "frames")]
    loop_frames: bool,

    /// Capture from the configured webcam (needs the `camera` feature)
    #[arg(long, conflicts_with = "frames")]
    camera: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Start in calibration mode
    #[arg(long)]
    calibrate: bool,

    /// Also write rotated log files to the logs directory
    #[arg(long)]
    log_file: bool,

    /// Emit JSON log lines on the console
    #[arg(long)]
    json_logs: bool,

    /// Application directory (settings, calibration, logs)
    #[arg(long, env = "LASER_ARCADE_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let paths = args
        .config_dir
        .clone()
        .map(AppPaths::at)
        .unwrap_or_else(AppPaths::default_location);

    let log_config = LogConfig {
        file_dir: args.log_file.then(|| paths.log_dir()),
        json_format: args.json_logs,
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config).map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::info!("Application directory: {}", paths.root.display());

    let settings = SettingsStore::new(paths.settings_file()).load();
    let engine = CalibrationEngine::new(paths.calibration_file());
    let mut orchestrator = Orchestrator::new(settings.clone(), engine, Box::new(LogConsumer::new()));

    if args.calibrate {
        orchestrator.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));
    }

    let mut source = match open_source(&args, &settings) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("No frame source: {}", e);
            None
        }
    };
    let Some(source) = source.as_mut() else {
        orchestrator.set_camera_available(false);
        tracing::warn!("Nothing to track without a frame source; pass --frames <DIR> or --camera");
        return Ok(());
    };

    run(&mut orchestrator, &mut **source, &settings, args.max_ticks)?;

    let stats = orchestrator.stats();
    tracing::info!(
        frames = stats.frames,
        hits = stats.hits,
        clicks = stats.clicks,
        calibrations = stats.calibrations,
        "Shutting down"
    );
    Ok(())
}

/// Open the frame source selected on the command line.
fn open_source(args: &Args, settings: &Settings) -> Result<Option<Box<dyn FrameSource>>> {
    if let Some(dir) = &args.frames {
        let mut source = ImageSequenceSource::new(dir).looping(args.loop_frames);
        source
            .open()
            .with_context(|| format!("failed to open image sequence {}", dir.display()))?;
        return Ok(Some(Box::new(source)));
    }

    if args.camera {
        return open_camera(settings).map(Some);
    }

    Ok(None)
}

#[cfg(feature = "camera")]
fn open_camera(settings: &Settings) -> Result<Box<dyn FrameSource>> {
    use laser_arcade::camera::{CaptureThread, NokhwaSource};

    let camera = settings.camera.clone();
    let read_timeout = Duration::from_millis(camera.read_timeout_ms);
    let capture = CaptureThread::spawn(
        move || Ok(NokhwaSource::new(camera)),
        read_timeout,
        Duration::from_secs(10),
    )
    .context("failed to start camera capture")?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_settings: &Settings) -> Result<Box<dyn FrameSource>> {
    Err(PipelineError::CameraUnavailable("built without the `camera` feature".to_string()).into())
}

/// Tick at the configured frame rate until the source ends, fails, or the
/// tick limit is reached.
fn run(
    orchestrator: &mut Orchestrator,
    source: &mut dyn FrameSource,
    settings: &Settings,
    max_ticks: Option<u64>,
) -> Result<()> {
    let frame_interval = Duration::from_secs_f64(1.0 / settings.camera.fps.max(1) as f64);
    tracing::info!("Running on {}", source.describe());

    let mut ticks = 0u64;
    loop {
        if max_ticks.is_some_and(|max| ticks >= max) {
            tracing::info!("Reached tick limit ({})", ticks);
            break;
        }
        let started = Instant::now();

        match orchestrator.tick(source) {
            Ok(_) => {}
            Err(PipelineError::EndOfStream) => {
                tracing::info!("Frame source exhausted after {} ticks", ticks);
                break;
            }
            Err(e) if e.is_capture_error() => {
                tracing::error!("Camera feed lost, stopping: {}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
        ticks += 1;

        if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    source.close();
    Ok(())
}
