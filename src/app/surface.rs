//! Active surface state and the consumer seam.

use crate::detection::Detection;
use crate::pointer::{PointerEvent, PointerEventKind};

/// Identifier of a mini-game or other pluggable app.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The surface currently receiving pointer events. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    Launcher,
    Calibrating,
    Testing,
    Playing(AppId),
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Surface::Launcher => write!(f, "Launcher"),
            Surface::Calibrating => write!(f, "Calibrating"),
            Surface::Testing => write!(f, "Testing"),
            Surface::Playing(id) => write!(f, "Playing({})", id),
        }
    }
}

/// Surface that can be started from the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceTarget {
    Calibrate,
    Test,
    App(AppId),
}

/// The only way to change the active surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceRequest {
    Start(SurfaceTarget),
    /// Leave the current surface and return to the launcher.
    Escape,
}

/// Receiver of the routed pointer stream (launcher menu, test view,
/// mini-games).
///
/// A consumer may answer an event with a [`SurfaceRequest`], e.g. the
/// launcher starting an app on click.
pub trait PointerConsumer {
    fn handle_pointer(
        &mut self,
        surface: &Surface,
        event: &PointerEvent,
        detection: Option<&Detection>,
    ) -> Option<SurfaceRequest>;

    /// Called after every surface transition.
    fn surface_changed(&mut self, _from: &Surface, _to: &Surface) {}
}

/// Consumer that only logs what it receives. Used by the headless runner.
#[derive(Debug, Default)]
pub struct LogConsumer {
    clicks: u64,
}

impl LogConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self) -> u64 {
        self.clicks
    }
}

impl PointerConsumer for LogConsumer {
    fn handle_pointer(
        &mut self,
        surface: &Surface,
        event: &PointerEvent,
        _detection: Option<&Detection>,
    ) -> Option<SurfaceRequest> {
        match event.kind {
            PointerEventKind::Move => log::trace!("[{}] move {} ({})", surface, event.position, event.source),
            PointerEventKind::Down => log::debug!("[{}] down {} ({})", surface, event.position, event.source),
            PointerEventKind::Click => {
                self.clicks += 1;
                log::info!("[{}] click {} ({})", surface, event.position, event.source);
            }
        }
        None
    }

    fn surface_changed(&mut self, from: &Surface, to: &Surface) {
        log::info!("Surface {} -> {}", from, to);
    }
}
