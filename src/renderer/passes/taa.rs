//! Temporal Resolve Pass
//!
//! Blends the jittered, bloomed scene color against the accumulated history
//! using the motion-vector target, then copies the result back into the
//! history texture for the next frame. History is neighborhood-clamped in
//! the shader to limit ghosting.

use bytemuck::{Pod, Zeroable};

use crate::renderer::targets::{HDR_FORMAT, WindowTargets};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TaaUniforms {
    /// x = history blend weight, y = 1 on the first frame after a reset
    /// (history invalid), z,w unused.
    pub params: [f32; 4],
}

impl TaaUniforms {
    #[must_use]
    pub fn new(history_valid: bool) -> Self {
        Self {
            params: [0.9, if history_valid { 0.0 } else { 1.0 }, 0.0, 0.0],
        }
    }
}

pub struct TemporalResolvePass {
    pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl TemporalResolvePass {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = super::post_bind_layout(
            device,
            "Temporal Resolve Bindings",
            size_of::<TaaUniforms>() as u64,
            3,
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Temporal Resolve Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/taa.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Temporal Resolve Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let pipeline = super::fullscreen_pipeline(
            device,
            "Temporal Resolve Pipeline",
            &shader,
            &pipeline_layout,
            HDR_FORMAT,
            None,
        );
        Self { pipeline, layout }
    }

    /// Resolves into `targets.resolved` and refreshes the history copy.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        bind_group: &wgpu::BindGroup,
        uniform_offset: u32,
    ) {
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Temporal Resolve Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.resolved.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[uniform_offset]);
            pass.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_texture(
            targets.resolved.texture.as_image_copy(),
            targets.history.texture.as_image_copy(),
            wgpu::Extent3d {
                width: targets.plan.render_width,
                height: targets.plan.render_height,
                depth_or_array_layers: 1,
            },
        );
    }
}
