//! Shadow Atlas Pass
//!
//! Depth-only rendering of every shadow-casting light into one square atlas.
//! The atlas is split into four fixed quadrants; each shadowed light renders
//! into its quadrant at half the atlas side length. The pass clears the whole
//! atlas once and runs even when some quadrants stay unused that frame.

use crate::renderer::frame_context::{FrameContext, MAX_SHADOW_VIEWS};
use crate::renderer::targets::{DEPTH_FORMAT, SHADOW_ATLAS_SIZE};
use crate::renderer::loader::GpuScene;

/// Quadrant origins in half-atlas units, indexed by shadow view.
const QUADRANTS: [(u32, u32); MAX_SHADOW_VIEWS] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Pixel viewport of a shadow view's atlas quadrant.
#[must_use]
pub fn atlas_viewport(shadow_index: u8) -> (u32, u32, u32, u32) {
    let half = SHADOW_ATLAS_SIZE / 2;
    let (qx, qy) = QUADRANTS[shadow_index as usize];
    (qx * half, qy * half, half, half)
}

pub struct ShadowAtlasPass {
    pub atlas: wgpu::Texture,
    pub atlas_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
}

impl ShadowAtlasPass {
    pub fn new(
        device: &wgpu::Device,
        view_layout: &wgpu::BindGroupLayout,
        object_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let atlas = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Atlas"),
            size: wgpu::Extent3d {
                width: SHADOW_ATLAS_SIZE,
                height: SHADOW_ATLAS_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let atlas_view = atlas.create_view(&wgpu::TextureViewDescriptor::default());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/shadow.wgsl").into(),
            ),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[Some(view_layout), Some(object_layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[super::scene_vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: Some(true),
                depth_compare: Some(wgpu::CompareFunction::Less),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Self {
            atlas,
            atlas_view,
            pipeline,
        }
    }

    /// Records the atlas render pass: one viewport per shadowed light, every
    /// scene draw re-issued into each.
    ///
    /// `view_offsets[i]` is the ring offset of shadow view `i`'s
    /// view-projection matrix; `object_offsets[d]` that of draw `d`'s model
    /// matrix.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &FrameContext,
        scene: &GpuScene,
        view_bind_group: &wgpu::BindGroup,
        view_offsets: &[u32],
        object_bind_group: &wgpu::BindGroup,
        object_offsets: &[u32],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Atlas Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.atlas_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
        pass.set_index_buffer(scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for light in &ctx.lights {
            let Some(shadow_index) = light.shadow_index else {
                continue;
            };
            let (x, y, w, h) = atlas_viewport(shadow_index);
            pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
            pass.set_bind_group(0, view_bind_group, &[view_offsets[shadow_index as usize]]);

            for (draw, &object_offset) in scene.draws.iter().zip(object_offsets) {
                if draw.transparent {
                    continue;
                }
                pass.set_bind_group(1, object_bind_group, &[object_offset]);
                pass.draw_indexed(
                    draw.first_index..draw.first_index + draw.index_count,
                    (draw.vertex_offset / size_of::<crate::scene::Vertex>() as u64) as i32,
                    0..1,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_tile_the_atlas_without_overlap() {
        let half = SHADOW_ATLAS_SIZE / 2;
        let views: Vec<_> = (0..MAX_SHADOW_VIEWS as u8).map(atlas_viewport).collect();
        assert_eq!(
            views,
            vec![
                (0, 0, half, half),
                (half, 0, half, half),
                (0, half, half, half),
                (half, half, half, half),
            ]
        );
    }
}
