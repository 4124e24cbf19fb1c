//! Dwell-to-click detection for a pointer without a button.

use std::time::{Duration, Instant};

use crate::config::DwellConfig;
use crate::point::PixelPoint;

/// Emits a click once the pointer has stayed within `radius_px` of its
/// anchor for `dwell_ms`, at most once per `debounce_ms`.
#[derive(Debug, Clone)]
pub struct DwellClickDetector {
    config: DwellConfig,
    anchor: Option<(PixelPoint, Instant)>,
    last_click: Option<Instant>,
}

impl DwellClickDetector {
    pub fn new(config: DwellConfig) -> Self {
        Self {
            config,
            anchor: None,
            last_click: None,
        }
    }

    pub fn config(&self) -> &DwellConfig {
        &self.config
    }

    /// Replace the tuning. The current anchor is kept.
    pub fn set_config(&mut self, config: DwellConfig) {
        self.config = config;
    }

    pub fn anchor(&self) -> Option<PixelPoint> {
        self.anchor.map(|(p, _)| p)
    }

    /// Advance with the latest sample. Returns `true` when a click fires.
    pub fn update(&mut self, point: Option<PixelPoint>, now: Instant) -> bool {
        let Some(point) = point else {
            self.anchor = None;
            return false;
        };

        let Some((anchor, anchor_ts)) = self.anchor else {
            self.anchor = Some((point, now));
            return false;
        };

        if point.distance(&anchor) > self.config.radius_px as f64 {
            self.anchor = Some((point, now));
            return false;
        }

        let dwell = Duration::from_millis(self.config.dwell_ms);
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let dwelled = now.saturating_duration_since(anchor_ts) >= dwell;
        let debounced = self
            .last_click
            .map_or(true, |last| now.saturating_duration_since(last) >= debounce);

        if dwelled && debounced {
            log::debug!("Dwell click at {}", point);
            self.last_click = Some(now);
            self.anchor = Some((anchor, now));
            return true;
        }
        false
    }
}
