//! Detection pipeline for the inspection controller: letterbox
//! preprocessing, ONNX inference sessions, per-task postprocessing,
//! the multi-model fallback cascade and the pass/fail policy.

pub mod device;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod policy;
pub mod postprocess;
pub mod preprocess;
pub mod session;
pub mod types;

pub use device::Device;
pub use error::InferError;
pub use manager::{CascadeOutcome, CascadeRequest, CascadeStatistics, ModelManager, ModelRole};
pub use metrics::StageMetrics;
pub use policy::{DetectionVerdict, evaluate};
pub use postprocess::{PostprocessConfig, Roi, iou, nms_indices, postprocess};
pub use preprocess::{LetterboxTransform, preprocess};
pub use session::{InferenceSession, OnnxSession, Session, SessionSettings};
pub use types::{Detection, Keypoint, TaskType};
