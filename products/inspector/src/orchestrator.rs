use crate::detlog::DetectionLog;
use crate::persistence::{PersistenceQueue, SaveRequest};
use crate::stats::InspectionStats;
use crate::ui::UiSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use vigil_base::Timestamp;
use vigil_camera::{CameraError, FrameHandoff};
use vigil_image::Image;
use vigil_infer::{
    CascadeOutcome, CascadeRequest, DetectionVerdict, ModelManager, StageMetrics, evaluate,
};
use vigil_plc::{InspectionRequest, TriggerState};

/// How long the orchestrator waits for a camera frame per attempt.
const FRAME_TIMEOUT: Duration = Duration::from_millis(3000);

/// Retry and policy parameters for the trigger cycle.
#[derive(Debug, Clone)]
pub struct CyclePolicy {
    pub cascade: CascadeRequest,
    pub target_label: String,
    pub target_count: usize,
    pub max_retry_count: u32,
    pub retry_interval: Duration,
}

/// Wires the pipeline together: one inspection request in, one final
/// verdict out, with the retry loop in between.
///
/// The orchestrator is the serialization point of the system — at most
/// one trigger cycle is ever in flight, and a request arriving while
/// busy is dropped (and counted), never queued.
pub struct Orchestrator {
    manager: Arc<ModelManager>,
    handoff: FrameHandoff,
    queue: PersistenceQueue,
    ui: UiSink,
    stats: Arc<InspectionStats>,
    detlog: DetectionLog,
    policy: CyclePolicy,
    busy: Arc<AtomicBool>,
    dropped_triggers: Arc<AtomicU64>,
}

struct Attempt {
    verdict: DetectionVerdict,
    image: Option<Arc<Image>>,
    outcome: Option<CascadeOutcome>,
    metrics: StageMetrics,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<ModelManager>,
        handoff: FrameHandoff,
        queue: PersistenceQueue,
        ui: UiSink,
        stats: Arc<InspectionStats>,
        detlog: DetectionLog,
        policy: CyclePolicy,
    ) -> Self {
        Self {
            manager,
            handoff,
            queue,
            ui,
            stats,
            detlog,
            policy,
            busy: Arc::new(AtomicBool::new(false)),
            dropped_triggers: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Triggers that arrived while a cycle was in flight.
    pub fn dropped_triggers(&self) -> u64 {
        self.dropped_triggers.load(Ordering::Relaxed)
    }

    /// Build the operator's manual trigger for this orchestrator; it
    /// shares the busy flag so a manual trigger during a running cycle
    /// is dropped, exactly like a PLC trigger.
    pub fn manual_trigger(&self, tx: mpsc::Sender<InspectionRequest>) -> ManualTrigger {
        ManualTrigger::new(tx, Arc::clone(&self.busy), Arc::clone(&self.dropped_triggers))
    }

    /// Serve inspection requests until the channel closes or shutdown
    /// fires.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<InspectionRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let request = tokio::select! {
                _ = shutdown.wait_for(|&stop| stop) => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request).await;
        }
        log::info!("orchestrator stopped");
    }

    async fn handle(&self, request: InspectionRequest) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.dropped_triggers.fetch_add(1, Ordering::Relaxed);
            log::warn!("trigger dropped: a cycle is already in flight");
            // Dropping the request resolves its reply channel with an
            // error, which the submitter reads as "not run".
            return;
        }
        let passed = self.run_cycle(&request.state).await;
        let _ = request.reply.send(passed);
        self.busy.store(false, Ordering::SeqCst);
    }

    /// One trigger cycle: attempt, retry on NG, commit the final verdict.
    async fn run_cycle(&self, state: &watch::Sender<TriggerState>) -> bool {
        let attempts = self.policy.max_retry_count + 1;
        for attempt_index in 0..attempts {
            if attempt_index > 0 {
                state.send_replace(TriggerState::Retrying);
                tokio::time::sleep(self.policy.retry_interval).await;
                state.send_replace(TriggerState::Detecting);
            }

            let attempt = self.run_attempt().await;
            let is_last = attempt_index + 1 == attempts;
            if attempt.verdict.passed || is_last {
                return self.commit(attempt);
            }

            // Intermediate NG: show the operator what failed, but do not
            // touch statistics, persistence or the PLC.
            log::info!(
                "attempt {} of {} NG ({}), retrying",
                attempt_index + 1,
                attempts,
                attempt.verdict.reason
            );
            self.ui.update_result(false);
            if let Some(image) = attempt.image {
                self.ui.update_image(image);
            }
        }
        false
    }

    async fn run_attempt(&self) -> Attempt {
        let frame = match self.handoff.take_timeout(FRAME_TIMEOUT).await {
            Ok(frame) => frame,
            Err(CameraError::FrameTimeout { waited_ms }) => {
                log::error!("frame acquisition timed out after {waited_ms} ms, skipping attempt");
                return Attempt {
                    verdict: DetectionVerdict {
                        passed: false,
                        target_count_seen: 0,
                        total_detections: 0,
                        reason: "frame acquisition timed out".to_string(),
                    },
                    image: None,
                    outcome: None,
                    metrics: StageMetrics::default(),
                };
            }
            Err(e) => {
                log::error!("frame acquisition failed: {e}");
                return Attempt {
                    verdict: DetectionVerdict {
                        passed: false,
                        target_count_seen: 0,
                        total_detections: 0,
                        reason: format!("frame acquisition failed: {e}"),
                    },
                    image: None,
                    outcome: None,
                    metrics: StageMetrics::default(),
                };
            }
        };

        let image = Arc::new(frame);
        let (outcome, metrics) =
            self.manager.infer_with_fallback(Arc::clone(&image), &self.policy.cascade).await;
        if outcome.was_fallback && !outcome.detections.is_empty() {
            log::info!(
                "fallback model '{}' ({}) produced {} detections",
                outcome.used_model_name,
                outcome.used_role,
                outcome.detections.len()
            );
        }

        let verdict = evaluate(
            &outcome.detections,
            &outcome.used_labels,
            &self.policy.target_label,
            self.policy.target_count,
        );
        Attempt { verdict, image: Some(image), outcome: Some(outcome), metrics }
    }

    /// Commit the final verdict of a cycle: statistics, UI, detection
    /// log and image archive. Returns the verdict for the PLC write.
    fn commit(&self, attempt: Attempt) -> bool {
        let passed = attempt.verdict.passed;
        let timestamp = Timestamp::now();

        let (total, ok, ng) = self.stats.record(passed);
        self.ui.update_stats(total, ok, ng);
        self.ui.update_result(passed);
        self.ui.update_metrics(attempt.metrics);

        if let Some(outcome) = &attempt.outcome {
            if let Err(e) = self.detlog.append(
                &timestamp,
                &attempt.verdict,
                &outcome.detections,
                &outcome.used_labels,
            ) {
                log::error!("failed to write detection log: {e}");
            }
        }

        if let Some(image) = attempt.image {
            self.ui.update_image(Arc::clone(&image));
            self.queue.enqueue(SaveRequest { image, passed, timestamp });
        }

        log::info!(
            "cycle complete: {} ({}), {:.1} ms total",
            if passed { "PASS" } else { "FAIL" },
            attempt.verdict.reason,
            attempt.metrics.total_ms()
        );
        passed
    }
}

/// Handle for the operator's manual trigger; it flows through the same
/// request channel as PLC triggers and obeys the same busy rule.
#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::Sender<InspectionRequest>,
    state: Arc<watch::Sender<TriggerState>>,
    busy: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl ManualTrigger {
    fn new(
        tx: mpsc::Sender<InspectionRequest>,
        busy: Arc<AtomicBool>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        let (state, _) = watch::channel(TriggerState::Idle);
        Self { tx, state: Arc::new(state), busy, dropped }
    }

    /// Fire one inspection; `None` when a cycle was already in flight
    /// and the trigger was dropped (not queued).
    pub async fn fire(&self) -> Option<bool> {
        if self.busy.load(Ordering::SeqCst) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InspectionRequest { state: Arc::clone(&self.state), reply: reply_tx };
        if self.tx.try_send(request).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        reply_rx.await.ok()
    }
}
