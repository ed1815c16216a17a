use crate::CameraError;
use vigil_image::Image;

/// Camera collaborator interface.
///
/// Implementations wrap a vendor SDK; while started they push frames
/// into a [`crate::FrameHandoff`] from their own producer thread, and
/// `capture_once` grabs a single frame on demand for the manual path.
#[allow(async_fn_in_trait)]
pub trait Camera {
    async fn start(&mut self) -> Result<(), CameraError>;

    async fn stop(&mut self);

    /// Grab one frame directly, bypassing the handoff slot.
    async fn capture_once(&mut self) -> Result<Image, CameraError>;
}
