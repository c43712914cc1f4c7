//! Bloom Pass
//!
//! Classic threshold-then-blur bloom at half render resolution. The bright
//! pass reads mip 0 of the downsample chain into the first ping-pong target;
//! a separable Gaussian then ping-pongs horizontally and vertically, and a
//! final additive pass composites the result back into the HDR scene target
//! so the temporal resolve sees the bloomed image.

use bytemuck::{Pod, Zeroable};

use crate::renderer::targets::{HDR_FORMAT, WindowTargets};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BloomUniforms {
    /// x = luminance threshold, y = intensity, z,w = blur direction.
    pub params: [f32; 4],
}

impl BloomUniforms {
    #[must_use]
    pub fn threshold() -> Self {
        Self {
            params: [1.0, 1.0, 0.0, 0.0],
        }
    }

    #[must_use]
    pub fn blur(horizontal: bool) -> Self {
        let (dx, dy) = if horizontal { (1.0, 0.0) } else { (0.0, 1.0) };
        Self {
            params: [0.0, 0.0, dx, dy],
        }
    }

    /// x = composite strength applied when adding bloom back into the scene.
    #[must_use]
    pub fn composite() -> Self {
        Self {
            params: [0.04, 0.0, 0.0, 0.0],
        }
    }
}

pub struct BloomPass {
    bright_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl BloomPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = super::post_bind_layout(
            device,
            "Bloom Bindings",
            size_of::<BloomUniforms>() as u64,
            1,
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/bloom.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let make = |label: &str, entry: &str, blend: Option<wgpu::BlendState>| {
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
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };
        Self {
            bright_pipeline: make("Bloom Bright Pipeline", "fs_bright", None),
            blur_pipeline: make("Bloom Blur Pipeline", "fs_blur", None),
            composite_pipeline: make("Bloom Composite Pipeline", "fs_composite", Some(additive)),
            layout,
        }
    }

    /// Records threshold into bloom A, horizontal blur into B, vertical blur
    /// back into A, and the additive composite of A into the HDR scene
    /// target.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        bright_bind_group: &wgpu::BindGroup,
        bright_offset: u32,
        blur_bind_groups: &[wgpu::BindGroup; 2],
        blur_offsets: [u32; 2],
        composite_bind_group: &wgpu::BindGroup,
        composite_offset: u32,
    ) {
        let steps = [
            (
                &targets.bloom[0].view,
                bright_bind_group,
                bright_offset,
                &self.bright_pipeline,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            ),
            (
                &targets.bloom[1].view,
                &blur_bind_groups[0],
                blur_offsets[0],
                &self.blur_pipeline,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            ),
            (
                &targets.bloom[0].view,
                &blur_bind_groups[1],
                blur_offsets[1],
                &self.blur_pipeline,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            ),
            (
                &targets.hdr.view,
                composite_bind_group,
                composite_offset,
                &self.composite_pipeline,
                wgpu::LoadOp::Load,
            ),
        ];
        for (view, bind_group, offset, pipeline, load) in steps {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Bloom Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[offset]);
            pass.draw(0..3, 0..1);
        }
    }
}
