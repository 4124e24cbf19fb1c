//! Pipeline orchestration.
//!
//! One [`Orchestrator`] owns the detector, the mapper, the pointer router,
//! the calibration session and the active [`Surface`]. Each tick acquires a
//! frame, detects, maps and routes; routed events are then dispatched to
//! the calibration session or the [`PointerConsumer`].

mod surface;

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};

use crate::calibration::{calibration_targets, CalibrationEngine, CalibrationSession, CalibrationState, RecordOutcome};
use crate::camera::{Frame, FrameSource};
use crate::config::Settings;
use crate::detection::{Detection, LaserDetector};
use crate::error::PipelineError;
use crate::mapping::CoordinateMapper;
use crate::point::PixelPoint;
use crate::pointer::{PointerEvent, PointerEventKind, PointerRouter, PointerSource};

pub use surface::{AppId, LogConsumer, PointerConsumer, Surface, SurfaceRequest, SurfaceTarget};

/// Running counters, logged on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub hits: u64,
    pub clicks: u64,
    pub calibrations: u64,
}

/// Drives the detection → mapping → routing pipeline.
pub struct Orchestrator {
    settings: Settings,
    detector: LaserDetector,
    mapper: CoordinateMapper,
    engine: CalibrationEngine,
    session: CalibrationSession,
    router: PointerRouter,
    events: Receiver<PointerEvent>,
    consumer: Box<dyn PointerConsumer>,
    surface: Surface,
    camera_available: bool,
    last_detection: Option<Detection>,
    last_mapped: Option<PixelPoint>,
    stats: PipelineStats,
}

impl Orchestrator {
    /// Build the pipeline from a settings snapshot. Loads the persisted
    /// calibration through `engine`.
    pub fn new(settings: Settings, engine: CalibrationEngine, consumer: Box<dyn PointerConsumer>) -> Self {
        let calibration = engine.load();
        let mapper = CoordinateMapper::from_calibration(&calibration);
        let session = CalibrationSession::for_screen(
            settings.screen_width,
            settings.screen_height,
            calibration.is_calibrated(),
        );

        let (tx, events) = unbounded();
        let router = PointerRouter::new(settings.dwell(), move |event: &PointerEvent| {
            let _ = tx.send(*event);
        });

        let detector = LaserDetector::new(settings.laser.clone()).with_mask_preview(settings.debug_overlay);

        Self {
            settings,
            detector,
            mapper,
            engine,
            session,
            router,
            events,
            consumer,
            surface: Surface::Launcher,
            camera_available: true,
            last_detection: None,
            last_mapped: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.session.state()
    }

    pub fn calibration_session(&self) -> &CalibrationSession {
        &self.session
    }

    /// Handle to the mapper; clones share the serving matrix.
    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn detector(&self) -> &LaserDetector {
        &self.detector
    }

    /// Whether frames are currently arriving. `false` means mouse-only.
    pub fn camera_available(&self) -> bool {
        self.camera_available
    }

    pub fn set_camera_available(&mut self, available: bool) {
        if self.camera_available && !available {
            log::warn!("Camera unavailable, continuing with mouse input only");
        }
        self.camera_available = available;
    }

    /// Latest detection, camera space.
    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }

    /// Latest routed laser position (screen space outside calibration).
    pub fn last_mapped(&self) -> Option<PixelPoint> {
        self.last_mapped
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Acquire one frame from `source` and run it through the pipeline.
    ///
    /// Capture errors are returned unchanged after marking the camera as
    /// unavailable; the caller decides whether to retry, switch sources or
    /// stop.
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<Detection, PipelineError> {
        let timeout = Duration::from_millis(self.settings.camera.read_timeout_ms);
        match source.read(timeout) {
            Ok(frame) => {
                self.camera_available = true;
                Ok(self.process_frame(&frame))
            }
            Err(e) => {
                if !matches!(e, PipelineError::EndOfStream) {
                    log::error!("Camera feed error from {}: {}", source.describe(), e);
                }
                self.set_camera_available(false);
                Err(e)
            }
        }
    }

    /// Detect, map and route one frame. Routing uses the frame timestamp.
    pub fn process_frame(&mut self, frame: &Frame) -> Detection {
        let detection = self.detector.process(frame);
        self.stats.frames += 1;
        if detection.is_hit() {
            self.stats.hits += 1;
        }

        // Calibration needs raw camera coordinates
        let routed = if self.surface == Surface::Calibrating {
            detection.point
        } else {
            self.mapper
                .map(detection.point)
                .filter(|p| within_reach(*p, self.settings.screen_size()))
        };

        self.last_mapped = routed;
        self.last_detection = Some(detection.clone());
        self.router.feed_point_at(routed, PointerSource::Laser, frame.timestamp);
        self.dispatch();
        detection
    }

    /// Forward a mouse event.
    pub fn feed_mouse(&mut self, kind: PointerEventKind, position: PixelPoint) {
        self.feed_mouse_at(kind, position, Instant::now());
    }

    pub fn feed_mouse_at(&mut self, kind: PointerEventKind, position: PixelPoint, now: Instant) {
        self.router.feed_mouse_event_at(kind, position, now);
        self.dispatch();
    }

    fn dispatch(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if event.is_click() {
                self.stats.clicks += 1;
            }

            // The surface that was active when the event arrived receives it,
            // even if calibration finishes on this click
            let surface = self.surface.clone();
            if surface == Surface::Calibrating {
                self.calibration_event(&event);
            }

            let request = self
                .consumer
                .handle_pointer(&surface, &event, self.last_detection.as_ref());
            if let Some(request) = request {
                self.request(request);
            }
        }
    }

    fn calibration_event(&mut self, event: &PointerEvent) {
        // Mouse positions are screen space and useless as correspondences
        if !event.is_click() || event.source != PointerSource::Laser {
            return;
        }

        match self.session.record(event.position, &self.engine, &self.mapper) {
            Ok(RecordOutcome::Completed(data)) => {
                self.stats.calibrations += 1;
                log::info!("Calibration complete with {} points", data.camera_points.len());
                self.transition(Surface::Launcher);
            }
            Ok(RecordOutcome::Collected { collected, total }) => {
                log::debug!("Collected {}/{}", collected, total);
            }
            Ok(RecordOutcome::Ignored) => {}
            Err(e) => {
                log::warn!("Keeping previous calibration: {}", e);
                self.transition(Surface::Launcher);
            }
        }
    }

    /// Apply a surface change.
    pub fn request(&mut self, request: SurfaceRequest) -> &Surface {
        let next = match request {
            SurfaceRequest::Start(SurfaceTarget::Calibrate) => {
                self.session.start();
                Surface::Calibrating
            }
            SurfaceRequest::Start(SurfaceTarget::Test) => Surface::Testing,
            SurfaceRequest::Start(SurfaceTarget::App(id)) => Surface::Playing(id),
            SurfaceRequest::Escape => Surface::Launcher,
        };
        if next != Surface::Calibrating {
            self.session.abort();
        }
        self.transition(next);
        &self.surface
    }

    fn transition(&mut self, next: Surface) {
        if self.surface != next {
            let previous = std::mem::replace(&mut self.surface, next);
            self.consumer.surface_changed(&previous, &self.surface);
        }
    }

    /// Adopt a new settings snapshot after an explicit change.
    pub fn apply_settings(&mut self, settings: Settings) {
        if settings.laser != self.settings.laser {
            self.detector.set_profile(settings.laser.clone());
        }
        self.detector.set_keep_mask(settings.debug_overlay);
        self.router.set_dwell_config(settings.dwell());

        if settings.screen_size() != self.settings.screen_size() {
            self.session
                .set_targets(calibration_targets(settings.screen_width, settings.screen_height));
            if self.surface == Surface::Calibrating {
                self.transition(Surface::Launcher);
            }
        }

        log::info!("Settings applied");
        self.settings = settings;
    }
}

/// Mapped points more than one screen size beyond the edges are dropped.
fn within_reach(point: PixelPoint, (width, height): (u32, u32)) -> bool {
    let (w, h) = (width as i64, height as i64);
    let (x, y) = (point.x as i64, point.y as i64);
    (-w..=2 * w).contains(&x) && (-h..=2 * h).contains(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::{Rgb, RgbImage};
    use nalgebra::Matrix3;
    use parking_lot::Mutex;

    use crate::calibration::Homography;
    use crate::camera::ImageSequenceSource;
    use crate::config::LaserProfile;

    #[derive(Default)]
    struct Recorded {
        events: Vec<(Surface, PointerEvent)>,
        transitions: Vec<(Surface, Surface)>,
    }

    /// Records everything; answers mouse clicks on the launcher with a
    /// request to start "snake".
    struct RecordingConsumer(Arc<Mutex<Recorded>>);

    impl PointerConsumer for RecordingConsumer {
        fn handle_pointer(
            &mut self,
            surface: &Surface,
            event: &PointerEvent,
            _detection: Option<&Detection>,
        ) -> Option<SurfaceRequest> {
            self.0.lock().events.push((surface.clone(), *event));
            if *surface == Surface::Launcher && event.is_click() && event.source == PointerSource::Mouse {
                return Some(SurfaceRequest::Start(SurfaceTarget::App(AppId::new("snake"))));
            }
            None
        }

        fn surface_changed(&mut self, from: &Surface, to: &Surface) {
            self.0.lock().transitions.push((from.clone(), to.clone()));
        }
    }

    fn test_settings() -> Settings {
        Settings {
            screen_width: 640,
            screen_height: 480,
            laser: LaserProfile {
                ema_alpha: 1.0,
                ..LaserProfile::default()
            },
            ..Settings::default()
        }
    }

    fn orchestrator(dir: &tempfile::TempDir) -> (Orchestrator, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let engine = CalibrationEngine::new(dir.path().join("calibration.json"));
        let orch = Orchestrator::new(test_settings(), engine, Box::new(RecordingConsumer(recorded.clone())));
        (orch, recorded)
    }

    fn dot_image(center: PixelPoint) -> RgbImage {
        let mut image = RgbImage::from_pixel(400, 300, Rgb([15, 15, 25]));
        for y in (center.y - 4)..=(center.y + 4) {
            for x in (center.x - 4)..=(center.x + 4) {
                let (dx, dy) = (x - center.x, y - center.y);
                if dx * dx + dy * dy <= 16 {
                    image.put_pixel(x as u32, y as u32, Rgb([255, 40, 30]));
                }
            }
        }
        image
    }

    fn frame_at(center: PixelPoint, n: u64, timestamp: Instant) -> Frame {
        let mut frame = Frame::new(dot_image(center), n);
        frame.timestamp = timestamp;
        frame
    }

    #[test]
    fn test_surface_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, recorded) = orchestrator(&dir);
        assert_eq!(orch.surface(), &Surface::Launcher);

        orch.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));
        assert_eq!(orch.surface(), &Surface::Calibrating);
        assert!(orch.calibration_state().is_collecting());

        orch.request(SurfaceRequest::Escape);
        assert_eq!(orch.surface(), &Surface::Launcher);
        assert_eq!(orch.calibration_state(), CalibrationState::Uncalibrated);

        orch.request(SurfaceRequest::Start(SurfaceTarget::Test));
        assert_eq!(orch.surface(), &Surface::Testing);

        let transitions = recorded.lock().transitions.clone();
        assert_eq!(
            transitions,
            vec![
                (Surface::Launcher, Surface::Calibrating),
                (Surface::Calibrating, Surface::Launcher),
                (Surface::Launcher, Surface::Testing),
            ]
        );
    }

    #[test]
    fn test_consumer_request_starts_app() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, recorded) = orchestrator(&dir);

        orch.feed_mouse(PointerEventKind::Move, PixelPoint::new(10, 10));
        orch.feed_mouse(PointerEventKind::Click, PixelPoint::new(10, 10));
        assert_eq!(orch.surface(), &Surface::Playing(AppId::new("snake")));
        assert_eq!(orch.stats().clicks, 1);

        orch.feed_mouse(PointerEventKind::Move, PixelPoint::new(12, 10));
        let events = recorded.lock().events.clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].0, Surface::Playing(AppId::new("snake")));
    }

    #[test]
    fn test_uncalibrated_points_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, recorded) = orchestrator(&dir);

        let detection = orch.process_frame(&frame_at(PixelPoint::new(120, 80), 1, Instant::now()));
        assert_eq!(detection.point, Some(PixelPoint::new(120, 80)));
        assert_eq!(orch.last_mapped(), Some(PixelPoint::new(120, 80)));

        let events = recorded.lock().events.clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.kind, PointerEventKind::Move);
        assert_eq!(events[0].1.source, PointerSource::Laser);
    }

    #[test]
    fn test_laser_calibration_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, _recorded) = orchestrator(&dir);
        assert!(!orch.mapper().is_calibrated());

        orch.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));
        let t0 = Instant::now();
        let mut n = 0;
        for (i, target) in orch.calibration_session().targets().to_vec().iter().enumerate() {
            // Camera sees the screen at half scale, offset by (40, 30)
            let camera = PixelPoint::new(target.x / 2 + 40, target.y / 2 + 30);
            let start = t0 + Duration::from_millis(i as u64 * 1000);
            for offset in [0, 200, 400] {
                n += 1;
                orch.process_frame(&frame_at(camera, n, start + Duration::from_millis(offset)));
            }
        }

        assert_eq!(orch.surface(), &Surface::Launcher);
        assert_eq!(orch.calibration_state(), CalibrationState::Calibrated);
        assert_eq!(orch.stats().calibrations, 1);
        assert!(orch.mapper().is_calibrated());
        assert!(dir.path().join("calibration.json").exists());

        // Laser points are now mapped into screen space
        orch.process_frame(&frame_at(PixelPoint::new(200, 150), n + 1, t0 + Duration::from_secs(10)));
        let mapped = orch.last_mapped().unwrap();
        assert!((mapped.x - 320).abs() <= 2);
        assert!((mapped.y - 240).abs() <= 2);
    }

    #[test]
    fn test_final_calibration_click_stays_on_calibrating_surface() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, recorded) = orchestrator(&dir);

        orch.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));
        let t0 = Instant::now();
        let mut n = 0;
        for (i, target) in orch.calibration_session().targets().to_vec().iter().enumerate() {
            let camera = PixelPoint::new(target.x / 2 + 40, target.y / 2 + 30);
            let start = t0 + Duration::from_millis(i as u64 * 1000);
            for offset in [0, 200, 400] {
                n += 1;
                orch.process_frame(&frame_at(camera, n, start + Duration::from_millis(offset)));
            }
        }
        assert_eq!(orch.surface(), &Surface::Launcher);

        let events = recorded.lock().events.clone();
        let calibrating_clicks = events
            .iter()
            .filter(|(surface, e)| *surface == Surface::Calibrating && e.is_click())
            .count();
        assert_eq!(calibrating_clicks, 5);
        assert!(!events.iter().any(|(surface, _)| *surface == Surface::Launcher));
    }

    #[test]
    fn test_far_offscreen_points_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, recorded) = orchestrator(&dir);

        // Steep enough that neighbouring camera pixels map billions apart
        let steep = Matrix3::new(1e8, 0.0, -3e9, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        orch.mapper().set_homography(Homography::from_matrix(steep));

        let t0 = Instant::now();
        orch.process_frame(&frame_at(PixelPoint::new(10, 50), 1, t0));
        orch.process_frame(&frame_at(PixelPoint::new(50, 50), 2, t0 + Duration::from_millis(50)));

        assert_eq!(orch.stats().hits, 2);
        assert_eq!(orch.last_mapped(), None);
        assert!(recorded.lock().events.is_empty());
    }

    #[test]
    fn test_within_reach_bounds() {
        assert!(within_reach(PixelPoint::new(-640, 959), (640, 480)));
        assert!(within_reach(PixelPoint::new(1280, -480), (640, 480)));
        assert!(!within_reach(PixelPoint::new(-641, 0), (640, 480)));
        assert!(!within_reach(PixelPoint::new(0, i32::MAX), (640, 480)));
    }

    #[test]
    fn test_mouse_clicks_do_not_calibrate() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, _recorded) = orchestrator(&dir);
        orch.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));
        orch.feed_mouse(PointerEventKind::Click, PixelPoint::new(0, 0));
        assert_eq!(orch.calibration_session().progress(), Some((0, 5)));
    }

    #[test]
    fn test_tick_reports_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let frames = tempfile::tempdir().unwrap();
        dot_image(PixelPoint::new(50, 50)).save(frames.path().join("0001.png")).unwrap();

        let (mut orch, _recorded) = orchestrator(&dir);
        let mut source = ImageSequenceSource::new(frames.path());
        source.open().unwrap();

        let detection = orch.tick(&mut source).unwrap();
        assert_eq!(detection.point, Some(PixelPoint::new(50, 50)));
        assert!(orch.camera_available());

        assert!(matches!(orch.tick(&mut source), Err(PipelineError::EndOfStream)));
        assert!(!orch.camera_available());
    }

    #[test]
    fn test_apply_settings_updates_dwell_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, _recorded) = orchestrator(&dir);
        orch.request(SurfaceRequest::Start(SurfaceTarget::Calibrate));

        let mut settings = test_settings();
        settings.dwell_ms = 800;
        settings.screen_width = 1280;
        settings.screen_height = 720;
        orch.apply_settings(settings);

        assert_eq!(orch.surface(), &Surface::Launcher);
        assert_eq!(orch.calibration_session().targets()[2], PixelPoint::new(1279, 719));
        assert_eq!(orch.settings().dwell().dwell_ms, 800);
    }
}
