use crate::postprocess::{PostprocessConfig, Roi, infer_label_count, postprocess};
use crate::preprocess::preprocess;
use crate::session::{InferenceSession, SessionSettings};
use crate::{Detection, InferError, StageMetrics, TaskType};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use vigil_image::Image;

/// Which model slot produced a cascade outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Primary,
    Auxiliary1,
    Auxiliary2,
    None,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelRole::Primary => "primary",
            ModelRole::Auxiliary1 => "auxiliary1",
            ModelRole::Auxiliary2 => "auxiliary2",
            ModelRole::None => "none",
        };
        write!(f, "{name}")
    }
}

/// Result of one cascaded inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    pub detections: Vec<Detection>,
    pub used_role: ModelRole,
    pub used_model_name: String,
    pub used_labels: Vec<String>,
    pub was_fallback: bool,
}

impl CascadeOutcome {
    fn empty(used_role: ModelRole) -> Self {
        Self {
            detections: Vec::new(),
            used_role,
            used_model_name: String::new(),
            used_labels: Vec::new(),
            was_fallback: used_role != ModelRole::Primary,
        }
    }
}

/// Hit counters for the cascade; `total` counts cascade invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeStatistics {
    pub primary_hits: u64,
    pub aux1_hits: u64,
    pub aux2_hits: u64,
    pub total: u64,
}

/// Per-call thresholds and filters for the cascade.
///
/// `target_label` is carried for call-site symmetry with the policy
/// layer but does not influence which model's detections are returned;
/// label matching is the policy engine's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeRequest {
    pub confidence: f32,
    pub iou: f32,
    pub class_agnostic_nms: bool,
    pub roi: Option<Roi>,
    pub target_label: Option<String>,
}

type SharedSession = Arc<Mutex<InferenceSession>>;

#[derive(Default)]
struct Slots {
    primary: Option<SharedSession>,
    aux1: Option<SharedSession>,
    aux2: Option<SharedSession>,
    enable_fallback: bool,
    stats: CascadeStatistics,
    last_used: Option<ModelRole>,
}

/// Owns the primary and auxiliary sessions and runs the fallback
/// cascade.
///
/// The internal lock covers slot replacement, counters and the fallback
/// flag only; inference itself runs on a blocking worker outside the
/// lock with a snapshot of the session handles.
pub struct ModelManager {
    slots: Mutex<Slots>,
    settings: Mutex<SessionSettings>,
}

impl ModelManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self { slots: Mutex::new(Slots::default()), settings: Mutex::new(settings) }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, SessionSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_slot(
        &self,
        path: &str,
        assign: impl FnOnce(&mut Slots, SharedSession),
    ) -> Result<(), InferError> {
        if path.trim().is_empty() {
            return Ok(());
        }
        let settings = *self.lock_settings();
        // Loading happens outside the slot lock; on failure the previous
        // session stays in place.
        let session = InferenceSession::load(Path::new(path), &settings)?;
        log::info!("loaded model '{}' ({}, v{})", session.name(), settings.task, settings.model_version);
        let mut slots = self.lock_slots();
        assign(&mut slots, Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Load or replace the primary model; a blank path is a no-op.
    pub fn load_primary(&self, path: &str) -> Result<(), InferError> {
        self.load_slot(path, |slots, session| slots.primary = Some(session))
    }

    /// Load or replace the first auxiliary model; a blank path is a no-op.
    pub fn load_auxiliary1(&self, path: &str) -> Result<(), InferError> {
        self.load_slot(path, |slots, session| slots.aux1 = Some(session))
    }

    /// Load or replace the second auxiliary model; a blank path is a no-op.
    pub fn load_auxiliary2(&self, path: &str) -> Result<(), InferError> {
        self.load_slot(path, |slots, session| slots.aux2 = Some(session))
    }

    pub fn unload_auxiliary1(&self) {
        self.lock_slots().aux1 = None;
    }

    pub fn unload_auxiliary2(&self) {
        self.lock_slots().aux2 = None;
    }

    /// Install a pre-built session into a slot; used by tests and
    /// non-ONNX backends.
    pub fn install(&self, role: ModelRole, session: InferenceSession) {
        let shared = Arc::new(Mutex::new(session));
        let mut slots = self.lock_slots();
        match role {
            ModelRole::Primary => slots.primary = Some(shared),
            ModelRole::Auxiliary1 => slots.aux1 = Some(shared),
            ModelRole::Auxiliary2 => slots.aux2 = Some(shared),
            ModelRole::None => {}
        }
    }

    pub fn set_fallback_enabled(&self, enabled: bool) {
        self.lock_slots().enable_fallback = enabled;
    }

    /// Switch the task interpretation on the manager and all loaded
    /// sessions.
    pub fn set_task_mode(&self, task: TaskType) {
        self.lock_settings().task = task;
        let (primary, aux1, aux2) = {
            let slots = self.lock_slots();
            (slots.primary.clone(), slots.aux1.clone(), slots.aux2.clone())
        };
        for session in [primary, aux1, aux2].into_iter().flatten() {
            session.lock().unwrap_or_else(|e| e.into_inner()).set_task_type(task);
        }
    }

    pub fn statistics(&self) -> CascadeStatistics {
        self.lock_slots().stats
    }

    pub fn reset_statistics(&self) {
        self.lock_slots().stats = CascadeStatistics::default();
    }

    /// Role of the model that served the most recent cascade, if any.
    pub fn last_used(&self) -> Option<ModelRole> {
        self.lock_slots().last_used
    }

    /// Run the cascade: primary first, auxiliaries only when the prior
    /// step produced nothing. Backend and decode failures count as empty
    /// results so a broken auxiliary cannot take the line down.
    pub async fn infer_with_fallback(
        &self,
        image: Arc<Image>,
        request: &CascadeRequest,
    ) -> (CascadeOutcome, StageMetrics) {
        let (primary, aux1, aux2, enable_fallback) = {
            let slots = self.lock_slots();
            (slots.primary.clone(), slots.aux1.clone(), slots.aux2.clone(), slots.enable_fallback)
        };

        let mut metrics = StageMetrics::default();

        if let Some(primary) = primary {
            let mut outcome = self.run_model(&primary, &image, request, &mut metrics).await;
            if !outcome.detections.is_empty() {
                outcome.used_role = ModelRole::Primary;
                outcome.was_fallback = false;
                return self.finish(outcome, ModelRole::Primary, &mut metrics);
            }
            log::debug!("primary model found nothing, cascading");
        }

        if !enable_fallback {
            return self.finish(CascadeOutcome::empty(ModelRole::Primary), ModelRole::None, &mut metrics);
        }

        if let Some(aux1) = aux1 {
            let outcome = self.run_model(&aux1, &image, request, &mut metrics).await;
            if !outcome.detections.is_empty() {
                let mut outcome = outcome;
                outcome.used_role = ModelRole::Auxiliary1;
                outcome.was_fallback = true;
                return self.finish(outcome, ModelRole::Auxiliary1, &mut metrics);
            }
        }

        if let Some(aux2) = aux2 {
            // Terminal fallback: aux2 owns the outcome whether or not it
            // detected anything, and its hit counter reflects that.
            let mut outcome = self.run_model(&aux2, &image, request, &mut metrics).await;
            outcome.used_role = ModelRole::Auxiliary2;
            outcome.was_fallback = true;
            return self.finish(outcome, ModelRole::Auxiliary2, &mut metrics);
        }

        self.finish(CascadeOutcome::empty(ModelRole::None), ModelRole::None, &mut metrics)
    }

    fn finish(
        &self,
        outcome: CascadeOutcome,
        hit: ModelRole,
        metrics: &mut StageMetrics,
    ) -> (CascadeOutcome, StageMetrics) {
        metrics.detection_count = outcome.detections.len();
        let mut slots = self.lock_slots();
        slots.stats.total += 1;
        match hit {
            ModelRole::Primary => slots.stats.primary_hits += 1,
            ModelRole::Auxiliary1 => slots.stats.aux1_hits += 1,
            ModelRole::Auxiliary2 => slots.stats.aux2_hits += 1,
            ModelRole::None => {}
        }
        if hit != ModelRole::None {
            slots.last_used = Some(hit);
        }
        (outcome, *metrics)
    }

    /// One full preprocess / infer / postprocess pass on a blocking
    /// worker. Failures are logged and mapped to an empty outcome.
    async fn run_model(
        &self,
        session: &SharedSession,
        image: &Arc<Image>,
        request: &CascadeRequest,
        metrics: &mut StageMetrics,
    ) -> CascadeOutcome {
        let session = Arc::clone(session);
        let image = Arc::clone(image);
        let (confidence, iou, class_agnostic_nms, roi) =
            (request.confidence, request.iou, request.class_agnostic_nms, request.roi);

        let joined = tokio::task::spawn_blocking(move || {
            let mut session = session.lock().unwrap_or_else(|e| e.into_inner());
            let (input_w, input_h) = session.input_extent();
            let cfg = PostprocessConfig {
                task: session.task_type(),
                confidence,
                iou,
                class_agnostic_nms,
                model_version: session.model_version(),
                roi,
            };

            let started = Instant::now();
            let (tensor, transform) = preprocess(&image, input_w, input_h)?;
            let preprocess_ms = started.elapsed().as_secs_f64() * 1000.0;

            let started = Instant::now();
            let outputs = session.infer(tensor)?;
            let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

            let started = Instant::now();
            if session.labels().is_empty() {
                if let Some(count) = infer_label_count(&outputs, cfg.task, cfg.model_version) {
                    session.ensure_labels(count);
                }
            }
            let detections = postprocess(
                &outputs,
                &transform,
                (input_w, input_h),
                session.labels().len(),
                &cfg,
            )?;
            let postprocess_ms = started.elapsed().as_secs_f64() * 1000.0;

            let stage = StageMetrics {
                preprocess_ms,
                inference_ms,
                postprocess_ms,
                detection_count: detections.len(),
            };
            Ok::<_, InferError>((
                detections,
                stage,
                session.name().to_string(),
                session.labels().to_vec(),
            ))
        })
        .await;

        match joined {
            Ok(Ok((detections, stage, name, labels))) => {
                metrics.accumulate(&stage);
                CascadeOutcome {
                    detections,
                    used_role: ModelRole::None,
                    used_model_name: name,
                    used_labels: labels,
                    was_fallback: true,
                }
            }
            Ok(Err(e)) => {
                log::warn!("model attempt failed, treating as empty: {e}");
                CascadeOutcome::empty(ModelRole::None)
            }
            Err(e) => {
                log::warn!("inference worker panicked: {e}");
                CascadeOutcome::empty(ModelRole::None)
            }
        }
    }
}
