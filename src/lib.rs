//! Laser Arcade pointer pipeline
//!
//! Turns a camera-observed laser dot (with mouse input as a fallback) into
//! pointer events for whatever surface is currently active:
//! - HSV color segmentation and blob tracking with EMA smoothing
//! - Camera-to-screen homography calibration (RANSAC + DLT)
//! - Dwell-click synthesis for a pointer without buttons

pub mod app;
pub mod calibration;
pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod mapping;
pub mod point;
pub mod pointer;
pub mod telemetry;

pub use error::PipelineError;
pub use point::PixelPoint;
