use std::sync::atomic::{AtomicU64, Ordering};

/// Running pass/fail counters over completed trigger cycles.
#[derive(Debug, Default)]
pub struct InspectionStats {
    total: AtomicU64,
    ok: AtomicU64,
    ng: AtomicU64,
}

impl InspectionStats {
    /// Record one final verdict and return the updated snapshot.
    pub fn record(&self, passed: bool) -> (u64, u64, u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if passed {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ng.fetch_add(1, Ordering::Relaxed);
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.ok.load(Ordering::Relaxed),
            self.ng.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.ok.store(0, Ordering::Relaxed);
        self.ng.store(0, Ordering::Relaxed);
    }
}
