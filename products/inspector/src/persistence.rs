use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use vigil_base::Timestamp;
use vigil_base::wallclock::{days_from_civil, parse_date};
use vigil_image::Image;

/// One frame waiting to be archived.
pub struct SaveRequest {
    pub image: Arc<Image>,
    pub passed: bool,
    pub timestamp: Timestamp,
}

/// Bounded multi-producer single-consumer queue of save requests.
///
/// `enqueue` is O(1) and never blocks: when the queue is full the
/// oldest pending request is discarded and counted — the newest failure
/// image is worth more than a stale one.
#[derive(Clone)]
pub struct PersistenceQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    queue: Mutex<VecDeque<SaveRequest>>,
    capacity: usize,
    available: Notify,
    dropped: AtomicU64,
}

impl PersistenceQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
                available: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn enqueue(&self, request: SaveRequest) {
        {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(request);
            if queue.len() > self.inner.capacity {
                queue.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        // notify_one stores a permit, so an enqueue racing the worker's
        // empty check still wakes it.
        self.inner.available.notify_one();
    }

    pub fn dequeue(&self) -> Option<SaveRequest> {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests discarded because the queue was full.
    pub fn dropped_saves(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    async fn wait_available(&self) {
        self.inner.available.notified().await;
    }
}

/// Archive destination:
/// `<root>/Images/{Qualified|Unqualified}/YYYY-MM-DD/HH/{PASS|FAIL}_HHmmssfff.jpg`.
pub fn image_path(root: &Path, timestamp: &Timestamp, passed: bool) -> PathBuf {
    let bucket = if passed { "Qualified" } else { "Unqualified" };
    let stem = if passed { "PASS" } else { "FAIL" };
    root.join("Images")
        .join(bucket)
        .join(timestamp.date())
        .join(format!("{:02}", timestamp.hour))
        .join(format!("{stem}_{}.jpg", timestamp.time_compact_millis()))
}

/// Single consumer draining the save queue to disk as JPEG.
pub struct PersistenceWorker {
    queue: PersistenceQueue,
    root: PathBuf,
    jpeg_quality: u8,
    shutdown: watch::Receiver<bool>,
}

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

impl PersistenceWorker {
    pub fn new(
        queue: PersistenceQueue,
        root: PathBuf,
        jpeg_quality: u8,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { queue, root, jpeg_quality, shutdown }
    }

    /// Drain until shutdown, then flush what is left within a bounded
    /// timeout. I/O failures are logged, never propagated to producers.
    pub async fn run(mut self) {
        loop {
            while let Some(request) = self.queue.dequeue() {
                self.write_one(request).await;
            }
            tokio::select! {
                _ = self.queue.wait_available() => {}
                _ = self.shutdown.wait_for(|&stop| stop) => break,
            }
        }

        let deadline = tokio::time::Instant::now() + FLUSH_TIMEOUT;
        while let Some(request) = self.queue.dequeue() {
            if tokio::time::Instant::now() >= deadline {
                log::warn!("persistence flush timed out with {} frames pending", self.queue.len() + 1);
                break;
            }
            self.write_one(request).await;
        }
        log::info!("persistence worker stopped");
    }

    async fn write_one(&self, request: SaveRequest) {
        let path = image_path(&self.root, &request.timestamp, request.passed);
        let quality = self.jpeg_quality;
        let image = request.image;

        let written = tokio::task::spawn_blocking(move || -> Result<(), String> {
            let bytes = vigil_image::encode_jpeg(&image, quality).map_err(|e| e.to_string())?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
            Ok(())
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("failed to persist image: {e}"),
            Err(e) => log::error!("persistence task failed: {e}"),
        }
    }
}

/// Delete image date folders older than `retain_days`, both verdict
/// buckets. Returns the number of folders removed.
pub fn sweep_expired(root: &Path, retain_days: u32, today_epoch_days: i64) -> usize {
    let mut removed = 0;
    for bucket in ["Qualified", "Unqualified"] {
        let dir = root.join("Images").join(bucket);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some((year, month, day)) = name.to_str().and_then(parse_date) else {
                continue;
            };
            let age = today_epoch_days - days_from_civil(year, month, day);
            if age > retain_days as i64 {
                match std::fs::remove_dir_all(entry.path()) {
                    Ok(()) => {
                        removed += 1;
                        log::info!("retention removed {}", entry.path().display());
                    }
                    Err(e) => log::warn!("retention failed for {}: {e}", entry.path().display()),
                }
            }
        }
    }
    removed
}

/// Run the retention sweep once per 24 hours until shutdown.
pub async fn run_retention(root: PathBuf, retain_days: u32, mut shutdown: watch::Receiver<bool>) {
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    loop {
        let sweep_root = root.clone();
        let today = Timestamp::now().epoch_days();
        let result =
            tokio::task::spawn_blocking(move || sweep_expired(&sweep_root, retain_days, today))
                .await;
        if let Ok(removed) = result
            && removed > 0
        {
            log::info!("retention sweep removed {removed} date folders");
        }

        tokio::select! {
            _ = tokio::time::sleep(DAY) => {}
            _ = shutdown.wait_for(|&stop| stop) => break,
        }
    }
}
