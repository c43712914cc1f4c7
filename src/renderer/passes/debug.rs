//! Debug Wireframes
//!
//! Line-list rendering of object bounding boxes and light frustums over the
//! lit scene. The shader holds the unit-cube edge list; each box is one draw
//! whose transform arrives through the shared dynamically-offset `mat4`
//! binding, so no vertex buffer is needed. Bounding boxes transform the unit
//! cube by the box frame; light frustums transform NDC space by the inverse
//! of the light's view-projection.

use glam::Mat4;

use crate::renderer::targets::{DEPTH_FORMAT, HDR_FORMAT, WindowTargets};
use crate::scene::Aabb;

/// Vertices in the unit-cube edge list (12 edges, line list).
pub const BOX_EDGE_VERTICES: u32 = 24;

/// Transform placing the `[-1, 1]` unit cube onto a world-space AABB.
#[must_use]
pub fn aabb_transform(aabb: &Aabb, model: &Mat4) -> Mat4 {
    *model
        * Mat4::from_translation(aabb.center())
        * Mat4::from_scale(aabb.half_extents().max(glam::Vec3::splat(1e-4)))
}

/// Transform placing the unit cube onto a light's frustum volume.
#[must_use]
pub fn frustum_transform(light_view_projection: &Mat4) -> Mat4 {
    light_view_projection.inverse()
}

pub struct DebugWireframePass {
    pipeline: wgpu::RenderPipeline,
}

impl DebugWireframePass {
    pub fn new(
        device: &wgpu::Device,
        frame_layout: &wgpu::BindGroupLayout,
        object_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Wireframe Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/wireframe.wgsl").into(),
            ),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Wireframe Layout"),
            bind_group_layouts: &[Some(frame_layout), Some(object_layout)],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Wireframe Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: HDR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
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
        });
        Self { pipeline }
    }

    /// Records one line-list draw per transform offset.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        frame_bind_group: &wgpu::BindGroup,
        frame_offset: u32,
        object_bind_group: &wgpu::BindGroup,
        transform_offsets: &[u32],
    ) {
        if transform_offsets.is_empty() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Wireframe Pass"),
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
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, frame_bind_group, &[frame_offset]);
        for &offset in transform_offsets {
            pass.set_bind_group(1, object_bind_group, &[offset]);
            pass.draw(0..BOX_EDGE_VERTICES, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn aabb_transform_maps_unit_cube_corners_onto_the_box() {
        let aabb = Aabb {
            min: Vec3::new(1.0, 2.0, 3.0),
            max: Vec3::new(3.0, 6.0, 5.0),
        };
        let m = aabb_transform(&aabb, &Mat4::IDENTITY);
        let lo = m * Vec4::new(-1.0, -1.0, -1.0, 1.0);
        let hi = m * Vec4::new(1.0, 1.0, 1.0, 1.0);
        assert!((lo.truncate() - aabb.min).length() < 1e-5);
        assert!((hi.truncate() - aabb.max).length() < 1e-5);
    }

    #[test]
    fn frustum_transform_inverts_the_light_matrix() {
        let vp = Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Z);
        let m = frustum_transform(&vp);
        // A frustum-corner point in clip space maps back near the light volume.
        let p = vp * m * Vec4::new(1.0, 1.0, 0.5, 1.0);
        assert!((p - Vec4::new(1.0, 1.0, 0.5, 1.0)).length() < 1e-4);
    }
}
