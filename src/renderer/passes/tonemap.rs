//! Tone Mapping Pass
//!
//! Exposure-scaled tone mapping of the temporally resolved scene color
//! (bloom is already composited into it upstream). The output stays in a
//! float target at render resolution so the sharpen stage can consume it
//! without banding; the final transfer to the surface format happens in the
//! blit pass.

use bytemuck::{Pod, Zeroable};

use crate::frame::ToneOperator;
use crate::renderer::targets::{HDR_FORMAT, WindowTargets};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TonemapUniforms {
    pub exposure: f32,
    pub operator: u32,
    pub _pad: [f32; 2],
}

impl TonemapUniforms {
    #[must_use]
    pub fn new(exposure: f32, operator: ToneOperator) -> Self {
        Self {
            exposure,
            operator: operator as u32,
            _pad: [0.0; 2],
        }
    }
}

pub struct TonemapPass {
    pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl TonemapPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = super::post_bind_layout(
            device,
            "Tone Map Bindings",
            size_of::<TonemapUniforms>() as u64,
            1,
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tone Map Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/tonemap.wgsl").into(),
            ),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tone Map Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let pipeline = super::fullscreen_pipeline(
            device,
            "Tone Map Pipeline",
            &shader,
            &pipeline_layout,
            HDR_FORMAT,
            None,
        );
        Self { pipeline, layout }
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        bind_group: &wgpu::BindGroup,
        uniform_offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Tone Map Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.tonemapped.view,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_encodes_its_discriminant() {
        assert_eq!(TonemapUniforms::new(1.0, ToneOperator::Linear).operator, 0);
        assert_eq!(TonemapUniforms::new(1.0, ToneOperator::AcesFilm).operator, 3);
    }
}
