//! Pointer event stream.
//!
//! [`PointerRouter`] merges laser positions and mouse input into one ordered
//! stream of [`PointerEvent`]s, synthesizing clicks from dwell.

mod dwell;

use std::time::Instant;

use crate::config::DwellConfig;
use crate::point::PixelPoint;

pub use dwell::DwellClickDetector;

/// Kind of pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Move,
    Down,
    Click,
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerSource {
    Laser,
    Mouse,
}

impl std::fmt::Display for PointerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointerSource::Laser => write!(f, "laser"),
            PointerSource::Mouse => write!(f, "mouse"),
        }
    }
}

/// A pointer event in screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub position: PixelPoint,
    pub source: PointerSource,
    pub timestamp: Instant,
}

impl PointerEvent {
    pub fn is_click(&self) -> bool {
        self.kind == PointerEventKind::Click
    }
}

/// Callback receiving routed events.
pub type EventCallback = Box<dyn FnMut(&PointerEvent) + Send>;

/// Synchronous event router. Events are delivered in feed order, one
/// callback call per event.
pub struct PointerRouter {
    on_event: EventCallback,
    dwell: DwellClickDetector,
    last_position: Option<PixelPoint>,
}

impl PointerRouter {
    pub fn new(config: DwellConfig, on_event: impl FnMut(&PointerEvent) + Send + 'static) -> Self {
        Self {
            on_event: Box::new(on_event),
            dwell: DwellClickDetector::new(config),
            last_position: None,
        }
    }

    /// Replace dwell tuning after a settings change.
    pub fn set_dwell_config(&mut self, config: DwellConfig) {
        self.dwell.set_config(config);
    }

    pub fn dwell_config(&self) -> &DwellConfig {
        self.dwell.config()
    }

    /// Last position seen from any source.
    pub fn last_position(&self) -> Option<PixelPoint> {
        self.last_position
    }

    /// Feed the current laser (or other tracked) position.
    ///
    /// Emits `Move`, followed by `Click` when the dwell completes. An absent
    /// point resets the dwell anchor and emits nothing.
    pub fn feed_point(&mut self, point: Option<PixelPoint>, source: PointerSource) {
        self.feed_point_at(point, source, Instant::now());
    }

    pub fn feed_point_at(&mut self, point: Option<PixelPoint>, source: PointerSource, now: Instant) {
        let Some(position) = point else {
            self.dwell.update(None, now);
            return;
        };

        self.last_position = Some(position);
        self.emit(PointerEventKind::Move, position, source, now);
        if self.dwell.update(Some(position), now) {
            self.emit(PointerEventKind::Click, position, source, now);
        }
    }

    /// Pass a mouse event straight through.
    pub fn feed_mouse_event(&mut self, kind: PointerEventKind, position: PixelPoint) {
        self.feed_mouse_event_at(kind, position, Instant::now());
    }

    pub fn feed_mouse_event_at(&mut self, kind: PointerEventKind, position: PixelPoint, now: Instant) {
        self.last_position = Some(position);
        self.emit(kind, position, PointerSource::Mouse, now);
    }

    fn emit(&mut self, kind: PointerEventKind, position: PixelPoint, source: PointerSource, timestamp: Instant) {
        (self.on_event)(&PointerEvent {
            kind,
            position,
            source,
            timestamp,
        });
    }
}
