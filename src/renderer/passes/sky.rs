//! Sky Pass
//!
//! Fills the far plane left by the opaque pass with either the analytic
//! atmosphere model or an environment cube map. Exactly one of the two
//! pipelines runs per frame; both draw a fullscreen triangle at maximum
//! depth with the depth test keeping geometry in front.

use bytemuck::{Pod, Zeroable};

use crate::frame::{ProceduralSky, SkyMode};
use crate::renderer::targets::{DEPTH_FORMAT, HDR_FORMAT, WindowTargets};

/// Constants of the analytic sky, pushed through the ring each frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SkyUniforms {
    /// xyz = sun direction, w = turbidity.
    pub sun_turbidity: [f32; 4],
    /// x = rayleigh, y = mie coefficient, z = mie directional g,
    /// w = luminance.
    pub scattering: [f32; 4],
}

impl SkyUniforms {
    #[must_use]
    pub fn new(sky: &ProceduralSky) -> Self {
        let dir = sky.sun_direction.normalize_or_zero();
        Self {
            sun_turbidity: [dir.x, dir.y, dir.z, sky.turbidity],
            scattering: [
                sky.rayleigh,
                sky.mie_coefficient,
                sky.mie_directional_g,
                sky.luminance,
            ],
        }
    }
}

pub struct SkyPass {
    procedural_pipeline: wgpu::RenderPipeline,
    cubemap_pipeline: wgpu::RenderPipeline,
    pub params_layout: wgpu::BindGroupLayout,
    pub cubemap_layout: wgpu::BindGroupLayout,
    /// 1x1 fallback environment used until the app supplies one.
    cubemap_bind_group: wgpu::BindGroup,
    _fallback_cubemap: wgpu::Texture,
}

impl SkyPass {
    pub fn new(device: &wgpu::Device, frame_layout: &wgpu::BindGroupLayout) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sky Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sky.wgsl").into()),
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sky Params"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: std::num::NonZeroU64::new(
                        size_of::<SkyUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });
        let cubemap_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sky Cubemap"),
            // Bindings 1 and 2; slot 0 belongs to the procedural params in
            // the shared shader module.
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let make = |label: &str, layout: &wgpu::BindGroupLayout, fs: &str| {
            let pipeline_layout =
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(label),
                    bind_group_layouts: &[Some(frame_layout), Some(layout)],
                    immediate_size: 0,
                });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(fs),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: Some(false),
                    depth_compare: Some(wgpu::CompareFunction::LessEqual),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        let procedural_pipeline = make("Procedural Sky Pipeline", &params_layout, "fs_procedural");
        let cubemap_pipeline = make("Cubemap Sky Pipeline", &cubemap_layout, "fs_cubemap");

        let fallback_cubemap = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Fallback Environment"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let cube_view = fallback_cubemap.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Fallback Environment View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sky Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let cubemap_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sky Cubemap"),
            layout: &cubemap_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            procedural_pipeline,
            cubemap_pipeline,
            params_layout,
            cubemap_layout,
            cubemap_bind_group,
            _fallback_cubemap: fallback_cubemap,
        }
    }

    /// Records the sky over the opaque result, before transparents.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        mode: &SkyMode,
        frame_bind_group: &wgpu::BindGroup,
        frame_offset: u32,
        params_bind_group: &wgpu::BindGroup,
        params_offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Sky Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.hdr.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_bind_group(0, frame_bind_group, &[frame_offset]);
        match mode {
            SkyMode::Procedural(_) => {
                pass.set_pipeline(&self.procedural_pipeline);
                pass.set_bind_group(1, params_bind_group, &[params_offset]);
            }
            SkyMode::Cubemap => {
                pass.set_pipeline(&self.cubemap_pipeline);
                pass.set_bind_group(1, &self.cubemap_bind_group, &[]);
            }
        }
        pass.draw(0..3, 0..1);
    }
}
