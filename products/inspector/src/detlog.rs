use std::io::Write;
use std::path::{Path, PathBuf};
use vigil_base::Timestamp;
use vigil_infer::{Detection, DetectionVerdict};

/// Plain-text per-trigger detection log under
/// `<root>/Logs/DetectionLogs/YYYY-MM-DD/YYYYMMDDHH.txt`.
///
/// One entry per final verdict: a timestamp/verdict line followed by a
/// label+confidence line per detection, entries separated by a blank
/// line.
pub struct DetectionLog {
    dir: PathBuf,
}

impl DetectionLog {
    pub fn new(storage_root: &Path) -> Self {
        Self { dir: storage_root.join("Logs").join("DetectionLogs") }
    }

    pub fn append(
        &self,
        timestamp: &Timestamp,
        verdict: &DetectionVerdict,
        detections: &[Detection],
        labels: &[String],
    ) -> std::io::Result<PathBuf> {
        let dir = self.dir.join(timestamp.date());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.txt", timestamp.date_hour_compact()));

        let mut entry = format!(
            "[{}] {} {}\n",
            timestamp.datetime(),
            if verdict.passed { "PASS" } else { "FAIL" },
            verdict.reason
        );
        for detection in detections {
            let label = labels
                .get(detection.class_id)
                .map(String::as_str)
                .unwrap_or("unknown");
            entry.push_str(&format!("  {label} {:.3}\n", detection.confidence));
        }
        entry.push('\n');

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(entry.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_infer::evaluate;

    #[test]
    fn entries_are_blank_line_separated() {
        let dir = std::env::temp_dir().join(format!("vigil-detlog-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let log = DetectionLog::new(&dir);
        let ts = Timestamp::from_unix_millis(1_756_000_000_000);
        let labels = vec!["screw".to_string()];
        let detections = vec![Detection::new(10.0, 10.0, 5.0, 5.0, 0.91, 0)];
        let verdict = evaluate(&detections, &labels, "screw", 1);

        let path = log.append(&ts, &verdict, &detections, &labels).unwrap();
        log.append(&ts, &verdict, &detections, &labels).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PASS"));
        assert!(contents.contains("screw 0.910"));
        assert_eq!(contents.matches("\n\n").count(), 2);
        assert!(path.to_string_lossy().contains("DetectionLogs"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
