//! Single-slot latest-frame exchange between the capture thread and the
//! detection loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::Frame;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
enum Closed {
    Finished,
    Failed(String),
}

impl Closed {
    fn to_error(&self) -> PipelineError {
        match self {
            Closed::Finished => PipelineError::EndOfStream,
            Closed::Failed(reason) => PipelineError::FrameReadError(reason.clone()),
        }
    }
}

struct SlotState {
    frame: Option<Frame>,
    /// Set once the producer has stopped.
    closed: Option<Closed>,
}

/// Last-write-wins frame slot.
///
/// Publishing replaces any unread frame. Readers always receive a complete
/// frame since the whole value is swapped under the lock.
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: None,
                closed: None,
            }),
            ready: Condvar::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Store a frame, discarding an unread stale one.
    pub fn publish(&self, frame: Frame) {
        let mut state = self.state.lock();
        if state.frame.replace(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        drop(state);
        self.ready.notify_one();
    }

    /// Mark the producer as failed. Once the slot is empty, reads fail with
    /// a frame read error carrying `reason`.
    pub fn close(&self, reason: impl Into<String>) {
        self.mark_closed(Closed::Failed(reason.into()));
    }

    /// Mark a finite producer as exhausted.
    pub fn finish(&self) {
        self.mark_closed(Closed::Finished);
    }

    fn mark_closed(&self, closed: Closed) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(closed);
        }
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Take the newest unread frame, waiting up to `timeout` for one.
    pub fn take(&self, timeout: Duration) -> Result<Frame, PipelineError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Ok(frame);
            }
            if let Some(closed) = &state.closed {
                return Err(closed.to_error());
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() && state.frame.is_none() {
                if let Some(closed) = &state.closed {
                    return Err(closed.to_error());
                }
                return Err(PipelineError::FrameReadError(format!(
                    "no frame within {} ms",
                    timeout.as_millis()
                )));
            }
        }
    }

    /// Total frames published.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before anyone read them.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(n: u64) -> Frame {
        Frame::new(RgbImage::new(2, 2), n)
    }

    #[test]
    fn test_last_write_wins() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        slot.publish(frame(3));

        let got = slot.take(Duration::from_millis(10)).unwrap();
        assert_eq!(got.frame_number, 3);
        assert_eq!(slot.dropped_count(), 2);
        assert_eq!(slot.published_count(), 3);
    }

    #[test]
    fn test_take_times_out_when_empty() {
        let slot = LatestFrameSlot::new();
        let started = Instant::now();
        let err = slot.take(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, PipelineError::FrameReadError(_)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_frame_is_consumed() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1));
        assert!(slot.take(Duration::from_millis(5)).is_ok());
        assert!(slot.take(Duration::from_millis(5)).is_err());
    }

    #[test]
    fn test_waiting_reader_wakes_on_publish() {
        let slot = Arc::new(LatestFrameSlot::new());
        let producer = {
            let slot = slot.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                slot.publish(frame(7));
            })
        };

        let got = slot.take(Duration::from_secs(2)).unwrap();
        assert_eq!(got.frame_number, 7);
        producer.join().unwrap();
    }

    #[test]
    fn test_closed_slot_reports_reason() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1));
        slot.close("camera unplugged");

        // The last published frame is still delivered
        assert!(slot.take(Duration::from_millis(5)).is_ok());
        match slot.take(Duration::from_millis(5)) {
            Err(PipelineError::FrameReadError(msg)) => assert_eq!(msg, "camera unplugged"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_finished_slot_reports_end_of_stream() {
        let slot = LatestFrameSlot::new();
        slot.finish();
        assert!(matches!(
            slot.take(Duration::from_millis(5)),
            Err(PipelineError::EndOfStream)
        ));
    }
}
