//! wgpu Context
//!
//! [`GpuContext`] holds the core GPU handles: device, queue, surface and
//! surface configuration. Optional device features (timestamp queries, f16
//! shader math) are requested when the adapter offers them and their
//! availability is recorded for the stages that depend on them.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::errors::{KilnError, Result};

/// Optional capabilities granted by the adapter.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpuCaps {
    /// Timestamp queries inside command encoders are available.
    pub timestamps: bool,
    /// 16-bit float shader math is available (packed sharpening kernel).
    pub shader_f16: bool,
}

/// Core wgpu context holding GPU handles.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub caps: GpuCaps,
}

impl GpuContext {
    /// Creates the device-tier GPU context over a window surface.
    ///
    /// Fatal on any failure: there is no fallback path for a missing adapter
    /// or an unsupported surface.
    pub async fn new<W>(window: W, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| KilnError::AdapterRequestFailed(e.to_string()))?;

        let timestamp_features = wgpu::Features::TIMESTAMP_QUERY
            | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS;
        let adapter_features = adapter.features();

        let mut required_features = wgpu::Features::empty();
        let caps = GpuCaps {
            timestamps: adapter_features.contains(timestamp_features),
            shader_f16: adapter_features.contains(wgpu::Features::SHADER_F16),
        };
        if caps.timestamps {
            required_features |= timestamp_features;
        }
        if caps.shader_f16 {
            required_features |= wgpu::Features::SHADER_F16;
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Kiln Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let config = surface.get_default_config(&adapter, width, height).ok_or_else(|| {
            KilnError::AdapterRequestFailed("Surface not supported by adapter".to_string())
        })?;
        surface.configure(&device, &config);

        log::debug!(
            "GPU context created: format {:?}, timestamps {}, f16 {}",
            config.format,
            caps.timestamps,
            caps.shader_f16
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            caps,
        })
    }

    /// Reconfigures the surface for a new display size.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Blocks until every piece of submitted GPU work has completed.
    ///
    /// Used before releasing resources a frame in flight might still
    /// reference (scene unload, window-sized destroy, shutdown).
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
    }
}
