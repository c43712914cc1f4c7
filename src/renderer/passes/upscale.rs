//! Sharpen / Upscale Pass
//!
//! Contrast-adaptive sharpening as a compute pass, with an optional
//! integrated spatial upscale from render to display resolution. Two kernel
//! variants exist: the scalar path runs everywhere, the packed path does the
//! arithmetic in 16-bit pairs and is selected at window-resource creation
//! when the device offers shader f16.

use bytemuck::{Pod, Zeroable};

use crate::frame::UpscaleMode;
use crate::renderer::targets::{HDR_FORMAT, WindowTargets};

/// Kernel constants, derived on the CPU whenever sharpness or the
/// resolution pair changes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CasConstants {
    /// x,y = input/output scale, z,w = half-texel recentering offset.
    pub const0: [f32; 4],
    /// x = negative kernel peak, y = input width, z = input height, w unused.
    pub const1: [f32; 4],
}

impl CasConstants {
    /// Derives the constants.
    ///
    /// The kernel peak interpolates between -1/8 (sharpness 0) and -1/5
    /// (sharpness 1); `sharpness` outside `[0, 1]` is clamped. While
    /// upsampling, the control is attenuated by the input/output area ratio
    /// so interpolated taps do not over-ring; at equal resolutions the
    /// attenuation is the identity.
    #[must_use]
    pub fn new(sharpness: f32, mode: UpscaleMode, input: (u32, u32), output: (u32, u32)) -> Self {
        let sharpness = sharpness.clamp(0.0, 1.0);
        let scale_x = input.0 as f32 / output.0 as f32;
        let scale_y = input.1 as f32 / output.1 as f32;
        let sharpness = match mode {
            UpscaleMode::UpsampleAndSharpen => sharpness * scale_x * scale_y,
            UpscaleMode::SharpenOnly | UpscaleMode::Disabled => sharpness,
        };
        let peak = -1.0 / (8.0 + (5.0 - 8.0) * sharpness);
        Self {
            const0: [
                scale_x,
                scale_y,
                0.5 * scale_x - 0.5,
                0.5 * scale_y - 0.5,
            ],
            const1: [peak, input.0 as f32, input.1 as f32, 0.0],
        }
    }
}

pub struct SharpenPass {
    scalar_pipeline: wgpu::ComputePipeline,
    packed_pipeline: Option<wgpu::ComputePipeline>,
    pub layout: wgpu::BindGroupLayout,
    constants: wgpu::Buffer,
}

impl SharpenPass {
    /// Workgroup side length of the sharpen kernel.
    const TILE: u32 = 8;

    pub fn new(device: &wgpu::Device, packed_available: bool) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sharpen Bindings"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            size_of::<CasConstants>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: HDR_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sharpen Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let make = |label: &str, source: &str| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("cs_main"),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let scalar_pipeline = make("Sharpen Pipeline", include_str!("../shaders/cas.wgsl"));
        // The packed module enables f16; only create it on devices that
        // granted the feature.
        let packed_pipeline = packed_available
            .then(|| make("Sharpen Packed Pipeline", include_str!("../shaders/cas_packed.wgsl")));

        let constants = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sharpen Constants"),
            size: size_of::<CasConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            scalar_pipeline,
            packed_pipeline,
            layout,
            constants,
        }
    }

    /// True when the packed kernel was built.
    #[must_use]
    pub fn packed_available(&self) -> bool {
        self.packed_pipeline.is_some()
    }

    /// Rewrites the kernel constants. Called on sharpness changes and on
    /// every window-resource recreation.
    pub fn update_constants(&self, queue: &wgpu::Queue, constants: CasConstants) {
        queue.write_buffer(&self.constants, 0, bytemuck::bytes_of(&constants));
    }

    /// Builds the bind group for the current window targets: tonemapped in,
    /// sharpened out.
    #[must_use]
    pub fn make_bind_group(
        &self,
        device: &wgpu::Device,
        targets: &WindowTargets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sharpen"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.constants.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.tonemapped.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.sharpened.view),
                },
            ],
        })
    }

    /// Dispatches the kernel over the sharpen target.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        bind_group: &wgpu::BindGroup,
        packed: bool,
    ) {
        let pipeline = if packed {
            self.packed_pipeline
                .as_ref()
                .unwrap_or(&self.scalar_pipeline)
        } else {
            &self.scalar_pipeline
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Sharpen Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(
            targets.plan.sharpen_width.div_ceil(Self::TILE),
            targets.plan.sharpen_height.div_ceil(Self::TILE),
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_interpolates_between_eighth_and_fifth() {
        let dims = (1920, 1080);
        let zero = CasConstants::new(0.0, UpscaleMode::SharpenOnly, dims, dims);
        let one = CasConstants::new(1.0, UpscaleMode::SharpenOnly, dims, dims);
        assert!((zero.const1[0] - (-1.0 / 8.0)).abs() < 1e-6);
        assert!((one.const1[0] - (-1.0 / 5.0)).abs() < 1e-6);
    }

    #[test]
    fn sharpness_is_clamped() {
        let dims = (100, 100);
        assert_eq!(
            CasConstants::new(7.0, UpscaleMode::SharpenOnly, dims, dims),
            CasConstants::new(1.0, UpscaleMode::SharpenOnly, dims, dims),
        );
        assert_eq!(
            CasConstants::new(-2.0, UpscaleMode::SharpenOnly, dims, dims),
            CasConstants::new(0.0, UpscaleMode::SharpenOnly, dims, dims),
        );
    }

    #[test]
    fn upscale_ratio_lands_in_const0() {
        let c = CasConstants::new(0.5, UpscaleMode::UpsampleAndSharpen, (1280, 720), (1920, 1080));
        assert!((c.const0[0] - 1280.0 / 1920.0).abs() < 1e-6);
        assert!((c.const0[1] - 720.0 / 1080.0).abs() < 1e-6);
    }

    #[test]
    fn upsampling_attenuates_the_control() {
        let upsampled =
            CasConstants::new(1.0, UpscaleMode::UpsampleAndSharpen, (1280, 720), (1920, 1080));
        let native = CasConstants::new(1.0, UpscaleMode::SharpenOnly, (1280, 720), (1280, 720));
        // A gentler peak is a smaller magnitude (the peak is negative).
        assert!(upsampled.const1[0] > native.const1[0]);
    }

    #[test]
    fn attenuation_is_identity_at_equal_resolutions() {
        let dims = (1920, 1080);
        assert_eq!(
            CasConstants::new(0.7, UpscaleMode::UpsampleAndSharpen, dims, dims).const1[0],
            CasConstants::new(0.7, UpscaleMode::SharpenOnly, dims, dims).const1[0],
        );
    }
}
