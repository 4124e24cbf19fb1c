//! Logging configuration and initialization
//!
//! Console output plus an optional daily-rotated log file, with JSON output
//! available for log aggregation.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Prefix of rotated log file names.
pub const LOG_FILE_PREFIX: &str = "laser_arcade";
/// Number of rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 3;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Directory for rotated log files; `None` disables file logging
    pub file_dir: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_dir: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Resolve the filter directive: `LASER_ARCADE_LOG`, then `RUST_LOG`,
    /// then the configured default.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env("LASER_ARCADE_LOG")
            .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
            .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }

    fn use_json(&self) -> bool {
        std::env::var("LASER_ARCADE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(self.json_format)
    }
}

/// Build the rotating file appender for `dir`.
fn file_appender(dir: &std::path::Path) -> Result<RollingFileAppender, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(appender)
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// to ensure file logging is properly flushed.
///
/// # Environment Variables
///
/// - `LASER_ARCADE_LOG`: log level filter (e.g. "debug", "info,laser_arcade::pointer=debug")
/// - `LASER_ARCADE_LOG_FORMAT`: set to "json" for JSON console output
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter();
    let use_json = config.use_json();

    let mut file_guard: Option<WorkerGuard> = None;

    let file_layer = match &config.file_dir {
        Some(dir) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(dir)?);
            file_guard = Some(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let (console_layer, json_layer) = match (config.console_enabled, use_json) {
        (false, _) => (None, None),
        (true, false) => (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            ),
            None,
        ),
        (true, true) => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .with(json_layer)
        .try_init()?;

    if let Some(dir) = &config.file_dir {
        tracing::info!(target: "laser_arcade", dir = %dir.display(), "Logging to rotating files");
    }
    tracing::info!(
        target: "laser_arcade",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        "Logging initialized"
    );

    Ok(file_guard)
}

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
