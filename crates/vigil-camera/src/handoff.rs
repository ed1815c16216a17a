use crate::CameraError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Single-slot latest-frame mailbox between the camera producer and the
/// inference consumer.
///
/// `publish` replaces any unread frame (the replaced frame's buffer is
/// dropped and counted), `take` consumes and clears the slot. Neither
/// side ever waits on the other beyond the slot swap itself.
#[derive(Clone)]
pub struct FrameHandoff {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Mutex<Option<vigil_image::Image>>,
    available: Notify,
    dropped: AtomicU64,
}

impl Default for FrameHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                available: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Put a frame into the slot, replacing any unread one.
    pub fn publish(&self, frame: vigil_image::Image) {
        let replaced = {
            let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(frame)
        };
        if replaced.is_some() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        // notify_one stores a permit, so a publish racing the consumer's
        // empty-slot check still wakes it.
        self.inner.available.notify_one();
    }

    /// Take the current frame, leaving the slot empty.
    pub fn take(&self) -> Option<vigil_image::Image> {
        self.inner.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Take the current frame, waiting up to `timeout` for a publish
    /// when the slot is empty.
    pub async fn take_timeout(&self, timeout: Duration) -> Result<vigil_image::Image, CameraError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frame) = self.take() {
                return Ok(frame);
            }
            let notified = self.inner.available.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(CameraError::FrameTimeout { waited_ms: timeout.as_millis() as u64 });
            }
        }
    }

    /// Frames that were overwritten before being consumed.
    pub fn dropped_frames(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
