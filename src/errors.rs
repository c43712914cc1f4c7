//! Error Types
//!
//! The main error type [`KilnError`] covers the failure modes the renderer can
//! surface to its caller:
//! - GPU device / surface acquisition failures (fatal — not retried)
//! - Scene source validation failures (caller-visible, prior scene untouched)
//!
//! Lifecycle-ordering violations (recreating window-sized resources without
//! destroying them first, rendering without a surface) are programming-contract
//! errors and are asserted, not returned.

use thiserror::Error;

/// The main error type for the kiln renderer.
#[derive(Error, Debug)]
pub enum KilnError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create the window surface.
    #[error("Surface creation failed: {0}")]
    SurfaceCreateFailed(#[from] wgpu::CreateSurfaceError),

    /// Failed to acquire the next presentation target.
    #[error("Surface acquire failed: {0:?}")]
    SurfaceAcquireFailed(wgpu::CurrentSurfaceTexture),

    /// Window system error.
    #[error("Window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    // ========================================================================
    // Scene Loading Errors
    // ========================================================================
    /// The scene source failed validation and was not loaded.
    #[error("Invalid scene source: {0}")]
    SceneInvalid(String),
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
