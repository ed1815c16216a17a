//! Camera collaborator interface and the latest-frame handoff between
//! the capture producer and the inference consumer.

pub mod config;
pub mod error;
pub mod handoff;
pub mod traits;

pub use config::CameraConfig;
pub use error::CameraError;
pub use handoff::FrameHandoff;
pub use traits::Camera;
