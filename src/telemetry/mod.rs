//! Logging infrastructure.
//!
//! Library code logs through the `log` facade; the binary installs a
//! `tracing` subscriber that also receives `log` records.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
