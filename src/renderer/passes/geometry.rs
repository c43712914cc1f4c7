//! Geometry Passes
//!
//! Forward-lit scene rendering into the G-buffer trio (depth, HDR color,
//! motion vectors). Opaque draws run first in submission order; transparent
//! draws run in a second pass, blended, depth-tested but not depth-written,
//! ordered back to front by view-space depth.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::renderer::loader::GpuScene;
use crate::renderer::targets::{
    DEPTH_FORMAT, HDR_FORMAT, MOTION_FORMAT, WindowTargets,
};

/// Per-draw constants, one ring allocation per draw per frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
}

/// Draw order for one frame: indices into the scene's draw list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batches {
    /// Opaque draws, original submission order.
    pub opaque: Vec<usize>,
    /// Transparent draws, farthest first.
    pub transparent: Vec<usize>,
}

/// Splits draws into opaque and transparent batches and sorts the
/// transparent batch back to front.
///
/// Depth is the view-space distance of each draw's world-space AABB center.
/// Ties keep an unspecified relative order (`sort_unstable_by`).
#[must_use]
pub fn order_draws(draws: &[(Vec3, bool)], view: &Mat4) -> Batches {
    let mut batches = Batches::default();
    let mut depths: Vec<(usize, f32)> = Vec::new();
    for (i, &(center, transparent)) in draws.iter().enumerate() {
        if transparent {
            // Right-handed view space looks down -Z; more negative is
            // farther away.
            let depth = view.transform_point3(center).z;
            depths.push((i, depth));
        } else {
            batches.opaque.push(i);
        }
    }
    depths.sort_unstable_by(|a, b| a.1.total_cmp(&b.1));
    batches.transparent = depths.into_iter().map(|(i, _)| i).collect();
    batches
}

pub struct GeometryPasses {
    opaque_pipeline: wgpu::RenderPipeline,
    transparent_pipeline: wgpu::RenderPipeline,
}

impl GeometryPasses {
    pub fn new(
        device: &wgpu::Device,
        frame_layout: &wgpu::BindGroupLayout,
        object_layout: &wgpu::BindGroupLayout,
        material_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Geometry Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/geometry.wgsl").into(),
            ),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Geometry Pipeline Layout"),
            bind_group_layouts: &[Some(frame_layout), Some(object_layout), Some(material_layout)],
            immediate_size: 0,
        });

        let make = |label: &str, blend: Option<wgpu::BlendState>, depth_write: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[super::scene_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[
                        Some(wgpu::ColorTargetState {
                            format: HDR_FORMAT,
                            blend,
                            write_mask: wgpu::ColorWrites::ALL,
                        }),
                        Some(wgpu::ColorTargetState {
                            format: MOTION_FORMAT,
                            blend: None,
                            // Blended draws must not overwrite opaque motion.
                            write_mask: if depth_write {
                                wgpu::ColorWrites::ALL
                            } else {
                                wgpu::ColorWrites::empty()
                            },
                        }),
                    ],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: Some(depth_write),
                    depth_compare: Some(wgpu::CompareFunction::Less),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        Self {
            opaque_pipeline: make("Opaque Geometry Pipeline", None, true),
            transparent_pipeline: make(
                "Transparent Geometry Pipeline",
                Some(wgpu::BlendState::ALPHA_BLENDING),
                false,
            ),
        }
    }

    /// Records the opaque pass, clearing depth, color and motion.
    #[allow(clippy::too_many_arguments)]
    pub fn record_opaque(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        scene: &GpuScene,
        batches: &Batches,
        frame_bind_group: &wgpu::BindGroup,
        frame_offset: u32,
        object_bind_group: &wgpu::BindGroup,
        object_offsets: &[u32],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Opaque Geometry Pass"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &targets.hdr.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &targets.motion.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&self.opaque_pipeline);
        Self::draw_batch(
            &mut pass,
            scene,
            &batches.opaque,
            frame_bind_group,
            frame_offset,
            object_bind_group,
            object_offsets,
        );
    }

    /// Records the transparent pass over the existing depth and color.
    #[allow(clippy::too_many_arguments)]
    pub fn record_transparent(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        scene: &GpuScene,
        batches: &Batches,
        frame_bind_group: &wgpu::BindGroup,
        frame_offset: u32,
        object_bind_group: &wgpu::BindGroup,
        object_offsets: &[u32],
    ) {
        if batches.transparent.is_empty() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Transparent Geometry Pass"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &targets.hdr.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &targets.motion.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                }),
            ],
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
        pass.set_pipeline(&self.transparent_pipeline);
        Self::draw_batch(
            &mut pass,
            scene,
            &batches.transparent,
            frame_bind_group,
            frame_offset,
            object_bind_group,
            object_offsets,
        );
    }

    fn draw_batch(
        pass: &mut wgpu::RenderPass<'_>,
        scene: &GpuScene,
        order: &[usize],
        frame_bind_group: &wgpu::BindGroup,
        frame_offset: u32,
        object_bind_group: &wgpu::BindGroup,
        object_offsets: &[u32],
    ) {
        pass.set_bind_group(0, frame_bind_group, &[frame_offset]);
        pass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
        pass.set_index_buffer(scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        for &i in order {
            let draw = &scene.draws[i];
            pass.set_bind_group(1, object_bind_group, &[object_offsets[i]]);
            pass.set_bind_group(2, &draw.material_bind_group, &[]);
            pass.draw_indexed(
                draw.first_index..draw.first_index + draw.index_count,
                (draw.vertex_offset / size_of::<crate::scene::Vertex>() as u64) as i32,
                0..1,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_draws_sort_back_to_front() {
        // Camera at origin looking down -Z; larger -z is farther.
        let view = Mat4::IDENTITY;
        let draws = vec![
            (Vec3::new(0.0, 0.0, -1.0), true),
            (Vec3::new(0.0, 0.0, -10.0), true),
            (Vec3::new(0.0, 0.0, -5.0), true),
        ];
        let batches = order_draws(&draws, &view);
        assert_eq!(batches.transparent, vec![1, 2, 0]);
        assert!(batches.opaque.is_empty());
    }

    #[test]
    fn opaque_draws_keep_submission_order() {
        let draws = vec![
            (Vec3::new(0.0, 0.0, -9.0), false),
            (Vec3::new(0.0, 0.0, -1.0), true),
            (Vec3::new(0.0, 0.0, -2.0), false),
        ];
        let batches = order_draws(&draws, &Mat4::IDENTITY);
        assert_eq!(batches.opaque, vec![0, 2]);
        assert_eq!(batches.transparent, vec![1]);
    }

    #[test]
    fn sorting_respects_the_view_matrix() {
        // Camera displaced along +Z; the draw nearest the origin is now the
        // farthest from the camera.
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let draws = vec![
            (Vec3::new(0.0, 0.0, 8.0), true),
            (Vec3::new(0.0, 0.0, 0.0), true),
        ];
        let batches = order_draws(&draws, &view);
        assert_eq!(batches.transparent, vec![1, 0]);
    }
}
