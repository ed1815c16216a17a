/// Per-cycle stage timings, captured with a monotonic clock around
/// preprocess, inference and postprocess.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageMetrics {
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
    pub detection_count: usize,
}

impl StageMetrics {
    pub fn total_ms(&self) -> f64 {
        self.preprocess_ms + self.inference_ms + self.postprocess_ms
    }

    pub fn fps(&self) -> f64 {
        let total = self.total_ms();
        if total > 0.0 { 1000.0 / total } else { 0.0 }
    }

    /// Fold another model attempt's timings into this cycle's totals.
    pub fn accumulate(&mut self, other: &StageMetrics) {
        self.preprocess_ms += other.preprocess_ms;
        self.inference_ms += other.inference_ms;
        self.postprocess_ms += other.postprocess_ms;
        self.detection_count = other.detection_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_is_zero_for_zero_total() {
        assert_eq!(StageMetrics::default().fps(), 0.0);
    }

    #[test]
    fn fps_derives_from_total() {
        let m = StageMetrics { preprocess_ms: 2.0, inference_ms: 6.0, postprocess_ms: 2.0, detection_count: 1 };
        assert_eq!(m.total_ms(), 10.0);
        assert_eq!(m.fps(), 100.0);
    }

    #[test]
    fn accumulate_sums_timings_and_keeps_last_count() {
        let mut m = StageMetrics { preprocess_ms: 1.0, inference_ms: 2.0, postprocess_ms: 1.0, detection_count: 0 };
        m.accumulate(&StageMetrics { preprocess_ms: 1.0, inference_ms: 3.0, postprocess_ms: 1.0, detection_count: 4 });
        assert_eq!(m.total_ms(), 9.0);
        assert_eq!(m.detection_count, 4);
    }
}
