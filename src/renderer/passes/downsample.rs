//! Downsample Pass
//!
//! Builds the mip chain of the HDR scene color. Mip 0 is a half-resolution
//! reduction of the scene target; each further mip halves the previous one.
//! The chain feeds the bloom threshold.

use bytemuck::{Pod, Zeroable};

use crate::renderer::targets::{DOWNSAMPLE_MIPS, HDR_FORMAT, WindowTargets};

/// Texel size of the source level, consumed by the reduction kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DownsampleUniforms {
    /// x,y = 1/source width, 1/source height; z,w unused.
    pub inv_source_size: [f32; 4],
}

pub struct DownsamplePass {
    pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl DownsamplePass {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = super::post_bind_layout(
            device,
            "Downsample Bindings",
            size_of::<DownsampleUniforms>() as u64,
            1,
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Downsample Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/downsample.wgsl").into(),
            ),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Downsample Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        let pipeline = super::fullscreen_pipeline(
            device,
            "Downsample Pipeline",
            &shader,
            &pipeline_layout,
            HDR_FORMAT,
            None,
        );
        Self { pipeline, layout }
    }

    /// Records one reduction per mip level.
    ///
    /// `bind_groups[0]` samples the HDR scene target; `bind_groups[m]` for
    /// `m > 0` samples mip `m - 1` of the chain. `uniform_offsets` follow the
    /// same indexing.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &WindowTargets,
        bind_groups: &[wgpu::BindGroup],
        uniform_offsets: &[u32],
    ) {
        debug_assert_eq!(bind_groups.len(), DOWNSAMPLE_MIPS as usize);
        for mip in 0..DOWNSAMPLE_MIPS as usize {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Downsample Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.downsample_mips[mip],
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
            pass.set_bind_group(0, &bind_groups[mip], &[uniform_offsets[mip]]);
            pass.draw(0..3, 0..1);
        }
    }
}
