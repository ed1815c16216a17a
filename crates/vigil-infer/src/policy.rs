use crate::Detection;

/// Outcome of the target-label/count policy for one inference attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionVerdict {
    pub passed: bool,
    pub target_count_seen: usize,
    pub total_detections: usize,
    pub reason: String,
}

/// Decide pass/fail from the detections of one attempt.
///
/// A detection counts when its class label matches `target_label`
/// case-insensitively; an empty target label counts every detection.
/// The attempt passes when exactly `target_count` matches were seen.
pub fn evaluate(
    detections: &[Detection],
    labels: &[String],
    target_label: &str,
    target_count: usize,
) -> DetectionVerdict {
    let target_count_seen = if target_label.is_empty() {
        detections.len()
    } else {
        detections
            .iter()
            .filter(|d| {
                labels.get(d.class_id).is_some_and(|l| l.eq_ignore_ascii_case(target_label))
            })
            .count()
    };

    let shown_label = if target_label.is_empty() { "any" } else { target_label };
    DetectionVerdict {
        passed: target_count_seen == target_count,
        target_count_seen,
        total_detections: detections.len(),
        reason: format!("expected {target_count} of {shown_label}, saw {target_count_seen}"),
    }
}
