use foundation::{LayerId, Time};
use gpu::RenderBackend;
use scene::CameraUniforms;

/// A data layer drawn on top of the globe.
pub trait Layer: Send + Sync {
    fn id(&self) -> LayerId;

    /// Called once per frame with the camera's current zoom level.
    fn update(&self, level: u8, now: Time);

    /// Draws whatever is ready. Returns the number of draw calls issued.
    fn render(&self, backend: &mut dyn RenderBackend, camera: &CameraUniforms) -> usize;
}
