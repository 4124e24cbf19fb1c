//! Background capture thread.
//!
//! Runs a [`FrameSource`] on its own thread and publishes every frame into a
//! [`LatestFrameSlot`]. The source is constructed and opened on the capture
//! thread itself, since native camera handles are usually not `Send`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::{Frame, FrameSource, LatestFrameSlot};
use crate::error::PipelineError;

/// How long `stop` waits for the thread before detaching it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running capture thread.
pub struct CaptureThread {
    slot: Arc<LatestFrameSlot>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    /// Disconnects when the thread exits.
    exited: Receiver<()>,
    stop_timeout: Duration,
    description: String,
}

impl CaptureThread {
    /// Spawn the capture thread.
    ///
    /// `make_source` runs on the new thread; the source is opened there and
    /// the open result is reported back before this returns. Waiting for the
    /// open is bounded by `open_timeout`.
    pub fn spawn<S, F>(make_source: F, read_timeout: Duration, open_timeout: Duration) -> Result<Self, PipelineError>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S, PipelineError> + Send + 'static,
    {
        let slot = Arc::new(LatestFrameSlot::new());
        let running = Arc::new(AtomicBool::new(true));
        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<String, PipelineError>>(1);
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(1);

        let slot_clone = slot.clone();
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || {
                let _exit_tx = exit_tx;
                let mut source = match make_source().and_then(|mut s| s.open().map(|_| s)) {
                    Ok(source) => source,
                    Err(e) => {
                        slot_clone.close(e.to_string());
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let _ = open_tx.send(Ok(source.describe()));

                Self::capture_loop(&mut source, &slot_clone, &running_clone, read_timeout);
                source.close();
            })
            .map_err(|e| PipelineError::CameraUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        let mut capture = Self {
            slot,
            running,
            thread_handle: Some(thread_handle),
            exited,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            description: String::new(),
        };

        match open_rx.recv_timeout(open_timeout) {
            Ok(Ok(description)) => {
                log::info!("Capture started: {}", description);
                capture.description = description;
                Ok(capture)
            }
            Ok(Err(e)) => {
                capture.stop();
                Err(e)
            }
            Err(_) => {
                // Leave the thread detached; it exits on its own once the
                // open call returns and sees `running == false`.
                capture.running.store(false, Ordering::Release);
                capture.thread_handle.take();
                Err(PipelineError::CameraUnavailable(format!(
                    "camera did not open within {} ms",
                    open_timeout.as_millis()
                )))
            }
        }
    }

    fn capture_loop<S: FrameSource>(
        source: &mut S,
        slot: &LatestFrameSlot,
        running: &AtomicBool,
        read_timeout: Duration,
    ) {
        while running.load(Ordering::Acquire) {
            match source.read(read_timeout) {
                Ok(frame) => slot.publish(frame),
                Err(PipelineError::EndOfStream) => {
                    log::info!("Frame source exhausted");
                    slot.finish();
                    return;
                }
                Err(e) => {
                    log::error!("Frame capture failed: {}", e);
                    slot.close(e.to_string());
                    return;
                }
            }
        }
        slot.close("capture stopped");
        log::info!("Capture thread stopped");
    }

    /// The slot frames are published into.
    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }

    /// Newest frame, waiting up to `timeout`.
    pub fn latest(&self, timeout: Duration) -> Result<Frame, PipelineError> {
        self.slot.take(timeout)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.slot.is_closed()
    }

    /// Bound on how long `stop` waits for a blocked read to return.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Stop capturing and join the thread.
    ///
    /// If the source is stuck in a read for longer than the stop timeout the
    /// thread is detached instead; it exits after that read returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        match self.exited.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Capture thread did not stop within {} ms, detaching",
                    self.stop_timeout.as_millis()
                );
            }
            _ => {
                let _ = handle.join();
            }
        }
    }
}

impl FrameSource for CaptureThread {
    fn open(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Frame, PipelineError> {
        self.latest(timeout)
    }

    fn close(&mut self) {
        self.stop();
    }

    fn describe(&self) -> String {
        format!("capture thread ({})", self.description)
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}
