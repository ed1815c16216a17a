use std::fmt;

#[derive(Debug)]
pub enum CameraError {
    /// The device could not be opened or configured.
    Device(String),
    /// The capture stream broke mid-run.
    Stream(String),
    /// No frame arrived within the acquisition timeout.
    FrameTimeout { waited_ms: u64 },
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Device(msg) => write!(f, "camera device error: {msg}"),
            CameraError::Stream(msg) => write!(f, "camera stream error: {msg}"),
            CameraError::FrameTimeout { waited_ms } => {
                write!(f, "no frame within {waited_ms} ms")
            }
        }
    }
}

impl std::error::Error for CameraError {}
