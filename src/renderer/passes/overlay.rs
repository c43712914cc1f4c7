//! Overlay Hook
//!
//! Last stage before present: an externally-supplied UI layer draws straight
//! onto the surface texture after the blit. The renderer knows nothing about
//! the overlay's content; it only guarantees the call happens once per frame,
//! after every scene pass, inside the same submission.

/// External overlay (UI, HUD, debug text) drawn over the finished frame.
pub trait OverlayRenderer {
    /// Records the overlay into `encoder` targeting `surface_view`.
    ///
    /// The surface already holds the final frame; implementations should
    /// load, not clear. `width`/`height` are the surface dimensions.
    fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    );
}

/// No-op overlay for headless or bare configurations.
pub struct NullOverlay;

impl OverlayRenderer for NullOverlay {
    fn record(
        &mut self,
        _device: &wgpu::Device,
        _queue: &wgpu::Queue,
        _encoder: &mut wgpu::CommandEncoder,
        _surface_view: &wgpu::TextureView,
        _width: u32,
        _height: u32,
    ) {
    }
}
