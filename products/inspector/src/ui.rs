use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use vigil_image::Image;
use vigil_infer::StageMetrics;

/// Push-only events for the operator UI collaborator.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Stats { total: u64, ok: u64, ng: u64 },
    Result { passed: bool },
    Image(Arc<Image>),
    Metrics(StageMetrics),
    Log { level: log::Level, message: String },
}

/// Bounded push channel to the UI.
///
/// Sending never blocks the pipeline: when the UI cannot keep up the
/// event is dropped and counted.
#[derive(Clone)]
pub struct UiSink {
    tx: mpsc::Sender<UiEvent>,
    dropped: Arc<AtomicU64>,
}

impl UiSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
    }

    fn push(&self, event: UiEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn update_stats(&self, total: u64, ok: u64, ng: u64) {
        self.push(UiEvent::Stats { total, ok, ng });
    }

    pub fn update_result(&self, passed: bool) {
        self.push(UiEvent::Result { passed });
    }

    pub fn update_image(&self, image: Arc<Image>) {
        self.push(UiEvent::Image(image));
    }

    pub fn update_metrics(&self, metrics: StageMetrics) {
        self.push(UiEvent::Metrics(metrics));
    }

    pub fn log(&self, level: log::Level, message: impl Into<String>) {
        self.push(UiEvent::Log { level, message: message.into() });
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
