use std::fmt;

#[derive(Debug)]
pub enum InferError {
    /// Source image has zero width or height.
    InvalidImage(String),
    /// Channel count other than 1 or 3.
    UnsupportedChannels(usize),
    /// Session construction failed; any previously loaded session stays in place.
    ModelLoad(String),
    /// The inference backend failed at run time.
    Backend(String),
    /// Raw model output does not match what the configured task type expects.
    InvalidOutput { expected: String, got: String },
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferError::InvalidImage(msg) => write!(f, "invalid image: {msg}"),
            InferError::UnsupportedChannels(c) => {
                write!(f, "unsupported channel count {c}, expected 1 or 3")
            }
            InferError::ModelLoad(msg) => write!(f, "model load error: {msg}"),
            InferError::Backend(msg) => write!(f, "backend error: {msg}"),
            InferError::InvalidOutput { expected, got } => {
                write!(f, "invalid model output: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for InferError {}

impl From<vigil_base::TensorError> for InferError {
    fn from(err: vigil_base::TensorError) -> Self {
        InferError::Backend(err.to_string())
    }
}
