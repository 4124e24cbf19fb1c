//! Configuration and persistence module.
//!
//! Settings live in a JSON file inside the application directory next to the
//! calibration file and the log directory.

pub mod persist;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// HSV triple in 8-bit convention: H in `[0, 180]`, S and V in `[0, 255]`.
pub type Hsv = [u8; 3];

/// Camera capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture device index.
    pub device_index: u32,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate.
    pub fps: u32,
    /// Upper bound for waiting on a single frame, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            read_timeout_ms: 1000,
        }
    }
}

/// Color profile for segmenting the laser dot.
///
/// Two HSV ranges are needed because red hue wraps around 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserProfile {
    pub lower1: Hsv,
    pub upper1: Hsv,
    pub lower2: Hsv,
    pub upper2: Hsv,
    /// Smallest accepted blob area (px²).
    pub min_area: u32,
    /// Largest accepted blob area (px²).
    pub max_area: u32,
    /// Elliptical structuring element size for open/close.
    pub morph_kernel: u32,
    /// EMA smoothing factor in (0, 1]. 1.0 disables smoothing.
    pub ema_alpha: f64,
}

impl Default for LaserProfile {
    fn default() -> Self {
        Self {
            lower1: [0, 120, 120],
            upper1: [8, 255, 255],
            lower2: [170, 120, 120],
            upper2: [180, 255, 255],
            min_area: 12,
            max_area: 4000,
            morph_kernel: 3,
            ema_alpha: 0.35,
        }
    }
}

impl LaserProfile {
    /// Clamp values into their valid ranges.
    pub fn sanitize(&mut self) {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            log::warn!("ema_alpha {} out of range (0, 1], using default", self.ema_alpha);
            self.ema_alpha = LaserProfile::default().ema_alpha;
        }
        if self.max_area < self.min_area {
            log::warn!(
                "max_area {} below min_area {}, swapping",
                self.max_area,
                self.min_area
            );
            std::mem::swap(&mut self.min_area, &mut self.max_area);
        }
        self.morph_kernel = self.morph_kernel.clamp(1, 31);
    }
}

/// Dwell-click tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellConfig {
    /// How long the pointer must stay put before a click.
    pub dwell_ms: u64,
    /// Radius (px) within which the pointer counts as stationary.
    pub radius_px: u32,
    /// Minimum gap between two clicks.
    pub debounce_ms: u64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 300,
            radius_px: 10,
            debounce_ms: 350,
        }
    }
}

/// Settings snapshot read by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output screen width.
    pub screen_width: u32,
    /// Output screen height.
    pub screen_height: u32,
    /// Camera capture settings.
    pub camera: CameraConfig,
    /// Laser color profile.
    pub laser: LaserProfile,
    /// Dwell time before a click (ms).
    pub dwell_ms: u64,
    /// Dwell radius (px).
    pub dwell_radius: u32,
    /// Minimum gap between dwell clicks (ms).
    pub debounce_ms: u64,
    /// Keep a downscaled mask preview for diagnostics.
    pub debug_overlay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let dwell = DwellConfig::default();
        Self {
            screen_width: 1024,
            screen_height: 768,
            camera: CameraConfig::default(),
            laser: LaserProfile::default(),
            dwell_ms: dwell.dwell_ms,
            dwell_radius: dwell.radius_px,
            debounce_ms: dwell.debounce_ms,
            debug_overlay: false,
        }
    }
}

impl Settings {
    pub fn dwell(&self) -> DwellConfig {
        DwellConfig {
            dwell_ms: self.dwell_ms,
            radius_px: self.dwell_radius,
            debounce_ms: self.debounce_ms,
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Ensure sane minimums after loading.
    pub fn sanitize(&mut self) {
        self.screen_width = self.screen_width.max(1);
        self.screen_height = self.screen_height.max(1);
        self.camera.width = self.camera.width.max(1);
        self.camera.height = self.camera.height.max(1);
        self.camera.fps = self.camera.fps.max(1);
        self.laser.sanitize();
    }
}

/// Locations of the files the pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
}

impl AppPaths {
    /// Platform config directory, or `./.laser-arcade` when there is none.
    pub fn default_location() -> Self {
        let root = dirs::config_dir()
            .map(|p| p.join("laser-arcade"))
            .unwrap_or_else(|| PathBuf::from(".laser-arcade"));
        Self { root }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn calibration_file(&self) -> PathBuf {
        self.root.join("calibration.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Reads and writes [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults.
    ///
    /// A missing or corrupt file is replaced with the defaults; a corrupt one
    /// is backed up first.
    pub fn load(&self) -> Settings {
        match persist::load_json_or_backup::<Settings>(&self.path) {
            Ok(Some(mut settings)) => {
                settings.sanitize();
                return settings;
            }
            Ok(None) => log::info!("No settings at {}, writing defaults", self.path.display()),
            Err(e) => log::warn!("Settings unreadable, using defaults: {}", e),
        }
        self.defaults()
    }

    /// Defaults, written to disk only if nothing is left at the path. A
    /// corrupt file that could not be backed up stays in place.
    fn defaults(&self) -> Settings {
        let settings = Settings::default();
        if self.path.exists() {
            log::warn!(
                "Not overwriting {}, it could not be moved aside",
                self.path.display()
            );
            return settings;
        }
        if let Err(e) = self.save(&settings) {
            log::warn!("Failed to write default settings: {}", e);
        }
        settings
    }

    pub fn save(&self, settings: &Settings) -> Result<(), PipelineError> {
        persist::save_json_atomic(&self.path, settings)
    }
}
