//! Renderer
//!
//! The orchestrator that owns the GPU context, the frame ring, the pass
//! objects and the resource tiers, and records one full frame per
//! [`Renderer::render`] call in a fixed order: shadow atlas, opaque
//! geometry, sky, transparents, debug wireframes, downsample, bloom,
//! temporal resolve, tone mapping, sharpen and the present blit with the
//! optional overlay on top.
//!
//! # Resource tiers
//!
//! | Tier         | Created by                        | Destroyed by        |
//! |--------------|-----------------------------------|---------------------|
//! | Device       | [`Renderer::new`]                 | drop                |
//! | Window-sized | [`Renderer::create_window_sized_resources`] | [`Renderer::destroy_window_sized_resources`] |
//! | Scene        | staged [`Renderer::load_scene`]   | [`Renderer::unload_scene`] |
//!
//! Create/destroy of the inner tiers must nest strictly; violations are
//! programming errors and assert.

pub mod context;
pub mod frame_context;
pub mod loader;
pub mod passes;
pub mod ring;
pub mod targets;
pub mod timing;

use std::num::NonZeroU64;

use glam::Mat4;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::errors::{KilnError, Result};
use crate::frame::{FrameState, SkyMode, UpscaleMode, ViewportState};
use crate::scene::SceneSource;

use context::GpuContext;
use frame_context::FrameContext;
use loader::{GpuScene, PendingLoad};
use passes::blit::BlitPass;
use passes::bloom::{BloomPass, BloomUniforms};
use passes::debug::{DebugWireframePass, aabb_transform, frustum_transform};
use passes::downsample::{DownsamplePass, DownsampleUniforms};
use passes::geometry::{GeometryPasses, ObjectUniforms, order_draws};
use passes::overlay::OverlayRenderer;
use passes::shadow::ShadowAtlasPass;
use passes::sky::{SkyPass, SkyUniforms};
use passes::taa::{TaaUniforms, TemporalResolvePass};
use passes::tonemap::{TonemapPass, TonemapUniforms};
use passes::upscale::{CasConstants, SharpenPass};
use ring::FrameRing;
use targets::{DOWNSAMPLE_MIPS, TargetPlan, TrackedState, WindowTargets};
use timing::{FramePlan, GpuTimer, TimingValue};

pub use frame_context::{MAX_LIGHTS, MAX_SHADOW_VIEWS, SHADOW_DEPTH_BIAS};

/// Frames allowed in flight; also the ring and timer depth.
const FRAMES_IN_FLIGHT: usize = 2;

/// Everything tied to the current render/display resolution pair.
struct WindowResources {
    targets: WindowTargets,
    taa_bind_group: wgpu::BindGroup,
    downsample_bind_groups: Vec<wgpu::BindGroup>,
    bloom_bright_bind_group: wgpu::BindGroup,
    bloom_blur_bind_groups: [wgpu::BindGroup; 2],
    bloom_composite_bind_group: wgpu::BindGroup,
    tonemap_bind_group: wgpu::BindGroup,
    sharpen_bind_group: wgpu::BindGroup,
    blit_sharpened: wgpu::BindGroup,
    blit_tonemapped: wgpu::BindGroup,
    /// Packed sharpening kernel selected for this resource generation.
    packed: bool,
    history_valid: bool,
    last_sharpness: f32,
}

/// Per-frame render orchestrator. See the module docs for the frame order
/// and resource tiers.
pub struct Renderer {
    ctx: GpuContext,
    ring: FrameRing,
    timer: GpuTimer,

    frame_bind_group: wgpu::BindGroup,
    mat4_layout: wgpu::BindGroupLayout,
    mat4_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    material_sampler: wgpu::Sampler,
    fallback_view: wgpu::TextureView,
    _fallback_texture: wgpu::Texture,
    post_sampler: wgpu::Sampler,
    sky_params_bind_group: wgpu::BindGroup,

    shadow: ShadowAtlasPass,
    geometry: GeometryPasses,
    sky: SkyPass,
    taa: TemporalResolvePass,
    downsample: DownsamplePass,
    bloom: BloomPass,
    tonemap: TonemapPass,
    sharpen: SharpenPass,
    blit: BlitPass,
    debug: DebugWireframePass,

    window: Option<WindowResources>,
    scene: Option<GpuScene>,
    pending_load: Option<PendingLoad>,

    prev_view_projection: Mat4,
    frame_index: u64,
}

impl Renderer {
    /// Creates the device-tier renderer over a window surface.
    pub async fn new<W>(window: W, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let ctx = GpuContext::new(window, width, height).await?;
        let device = &ctx.device;

        let ring = FrameRing::new(device, FRAMES_IN_FLIGHT, FrameRing::SLOT_CAPACITY);
        let timer = GpuTimer::new(device, &ctx.queue, FRAMES_IN_FLIGHT, ctx.caps.timestamps);

        let frame_layout = passes::frame_bind_layout(device);
        let mat4_layout = passes::mat4_bind_layout(device);
        let material_layout = Self::make_material_layout(device);

        let mat4_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Transform"),
            layout: &mat4_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: ring.buffer(),
                    offset: 0,
                    size: NonZeroU64::new(64),
                }),
            }],
        });

        let shadow = ShadowAtlasPass::new(device, &mat4_layout, &mat4_layout);
        let geometry = GeometryPasses::new(device, &frame_layout, &mat4_layout, &material_layout);
        let sky = SkyPass::new(device, &frame_layout);
        let taa = TemporalResolvePass::new(device);
        let downsample = DownsamplePass::new(device);
        let bloom = BloomPass::new(device);
        let tonemap = TonemapPass::new(device);
        let sharpen = SharpenPass::new(device, ctx.caps.shader_f16);
        let blit = BlitPass::new(device, ctx.config.format);
        let debug = DebugWireframePass::new(device, &frame_layout, &mat4_layout);

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame"),
            layout: &frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: ring.buffer(),
                        offset: 0,
                        size: NonZeroU64::new(
                            size_of::<frame_context::FrameUniforms>() as u64,
                        ),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow.atlas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                },
            ],
        });

        let sky_params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sky Params"),
            layout: &sky.params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: ring.buffer(),
                    offset: 0,
                    size: NonZeroU64::new(size_of::<SkyUniforms>() as u64),
                }),
            }],
        });

        let fallback_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Fallback Base Color"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            fallback_texture.as_image_copy(),
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let fallback_view = fallback_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let post_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            ctx,
            ring,
            timer,
            frame_bind_group,
            mat4_layout,
            mat4_bind_group,
            material_layout,
            material_sampler,
            fallback_view,
            _fallback_texture: fallback_texture,
            post_sampler,
            sky_params_bind_group,
            shadow,
            geometry,
            sky,
            taa,
            downsample,
            bloom,
            tonemap,
            sharpen,
            blit,
            debug,
            window: None,
            scene: None,
            pending_load: None,
            prev_view_projection: Mat4::IDENTITY,
            frame_index: 0,
        })
    }

    fn make_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bindings"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            size_of::<loader::MaterialUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
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
        })
    }

    // ── Window-sized tier ────────────────────────────────────────────────────

    /// Reconfigures the surface for a new display size. Window-sized
    /// resources must be destroyed first and recreated after.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        assert!(
            self.window.is_none(),
            "destroy window-sized resources before resizing the surface"
        );
        self.ctx.resize_surface(width, height);
    }

    /// Creates the window-sized resource tier for the given frame
    /// configuration.
    ///
    /// # Panics
    ///
    /// Panics when the tier already exists; create/destroy must nest.
    pub fn create_window_sized_resources(&mut self, state: &FrameState) -> Result<()> {
        assert!(
            self.window.is_none(),
            "window-sized resources already created"
        );
        let viewport = ViewportState::new(
            state.render_width,
            state.render_height,
            self.ctx.config.width,
            self.ctx.config.height,
            state.upscale_mode,
        );
        let plan = TargetPlan::new(viewport, state.upscale_mode);
        let targets = WindowTargets::new(&self.ctx.device, plan)?;

        let device = &self.ctx.device;
        let taa_bind_group = self.make_post_bind_group(
            "Temporal Resolve",
            &self.taa.layout,
            size_of::<TaaUniforms>() as u64,
            &[
                &targets.hdr.view,
                &targets.history.view,
                &targets.motion.view,
            ],
        );

        let mut downsample_bind_groups = Vec::with_capacity(DOWNSAMPLE_MIPS as usize);
        for mip in 0..DOWNSAMPLE_MIPS as usize {
            let source = if mip == 0 {
                &targets.hdr.view
            } else {
                &targets.downsample_mips[mip - 1]
            };
            downsample_bind_groups.push(self.make_post_bind_group(
                "Downsample",
                &self.downsample.layout,
                size_of::<DownsampleUniforms>() as u64,
                &[source],
            ));
        }

        let bloom_bright_bind_group = self.make_post_bind_group(
            "Bloom Bright",
            &self.bloom.layout,
            size_of::<BloomUniforms>() as u64,
            &[&targets.downsample_mips[0]],
        );
        let bloom_blur_bind_groups = [
            self.make_post_bind_group(
                "Bloom Blur H",
                &self.bloom.layout,
                size_of::<BloomUniforms>() as u64,
                &[&targets.bloom[0].view],
            ),
            self.make_post_bind_group(
                "Bloom Blur V",
                &self.bloom.layout,
                size_of::<BloomUniforms>() as u64,
                &[&targets.bloom[1].view],
            ),
        ];
        let bloom_composite_bind_group = self.make_post_bind_group(
            "Bloom Composite",
            &self.bloom.layout,
            size_of::<BloomUniforms>() as u64,
            &[&targets.bloom[0].view],
        );

        let tonemap_bind_group = self.make_post_bind_group(
            "Tone Map",
            &self.tonemap.layout,
            size_of::<TonemapUniforms>() as u64,
            &[&targets.resolved.view],
        );

        let sharpen_bind_group = self.sharpen.make_bind_group(device, &targets);
        self.sharpen.update_constants(
            &self.ctx.queue,
            CasConstants::new(
                state.sharpness,
                state.upscale_mode,
                (plan.render_width, plan.render_height),
                (plan.sharpen_width, plan.sharpen_height),
            ),
        );

        let blit_sharpened = self.blit.make_bind_group(device, &targets, true);
        let blit_tonemapped = self.blit.make_bind_group(device, &targets, false);

        // The packed kernel choice is locked in until the next recreate.
        let packed = state.packed_math && self.sharpen.packed_available();
        if state.packed_math && !packed {
            log::warn!("packed sharpening requested but shader f16 is unavailable");
        }

        self.window = Some(WindowResources {
            targets,
            taa_bind_group,
            downsample_bind_groups,
            bloom_bright_bind_group,
            bloom_blur_bind_groups,
            bloom_composite_bind_group,
            tonemap_bind_group,
            sharpen_bind_group,
            blit_sharpened,
            blit_tonemapped,
            packed,
            history_valid: false,
            last_sharpness: state.sharpness,
        });
        Ok(())
    }

    /// Destroys the window-sized tier after draining in-flight GPU work.
    ///
    /// # Panics
    ///
    /// Panics when the tier does not exist.
    pub fn destroy_window_sized_resources(&mut self) {
        assert!(
            self.window.is_some(),
            "window-sized resources already destroyed"
        );
        self.ctx.wait_idle();
        self.window = None;
    }

    /// Rewrites the sharpen kernel constants for a new control value.
    ///
    /// Touches a single uniform buffer; never allocates or recreates
    /// resources. Mode changes that alter target dimensions still require a
    /// destroy/recreate cycle of the window-sized tier.
    ///
    /// # Panics
    ///
    /// Panics when the window-sized tier does not exist.
    pub fn update_sharpness(&mut self, sharpness: f32, mode: UpscaleMode) {
        assert!(
            self.window.is_some(),
            "update_sharpness requires window-sized resources"
        );
        let window = self.window.as_mut().expect("checked above");
        let plan = &window.targets.plan;
        self.sharpen.update_constants(
            &self.ctx.queue,
            CasConstants::new(
                sharpness,
                mode,
                (plan.render_width, plan.render_height),
                (plan.sharpen_width, plan.sharpen_height),
            ),
        );
        window.last_sharpness = sharpness;
    }

    fn make_post_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        uniform_size: u64,
        textures: &[&wgpu::TextureView],
    ) -> wgpu::BindGroup {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: self.ring.buffer(),
                offset: 0,
                size: NonZeroU64::new(uniform_size),
            }),
        }];
        for (i, view) in textures.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: 1 + textures.len() as u32,
            resource: wgpu::BindingResource::Sampler(&self.post_sampler),
        });
        self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    // ── Scene tier ───────────────────────────────────────────────────────────

    /// Begins a staged scene load, replacing any load in progress.
    pub fn load_scene(&mut self, source: SceneSource) -> Result<()> {
        self.pending_load = Some(PendingLoad::new(source)?);
        Ok(())
    }

    /// Runs one load phase. Returns the completed fraction, reaching `1.0`
    /// when the scene is renderable; `None` when no load is in progress.
    pub fn step_load(&mut self) -> Result<Option<f32>> {
        let Some(pending) = self.pending_load.as_mut() else {
            return Ok(None);
        };
        if let Some(scene) = pending.step(
            &self.ctx.device,
            &self.ctx.queue,
            &self.material_layout,
            &self.fallback_view,
            &self.material_sampler,
        )? {
            self.scene = Some(scene);
            self.pending_load = None;
            return Ok(Some(1.0));
        }
        let progress = pending.progress();
        if pending.phase.is_done() {
            self.pending_load = None;
        }
        Ok(Some(progress))
    }

    /// Releases the scene tier after draining in-flight GPU work.
    pub fn unload_scene(&mut self) {
        self.pending_load = None;
        if self.scene.take().is_some() {
            self.ctx.wait_idle();
        }
    }

    #[must_use]
    pub fn scene_loaded(&self) -> bool {
        self.scene.is_some()
    }

    // ── Frame ────────────────────────────────────────────────────────────────

    /// Records and submits one frame.
    ///
    /// # Panics
    ///
    /// Panics when the window-sized tier does not exist.
    pub fn render(
        &mut self,
        state: &FrameState,
        mut overlay: Option<&mut dyn OverlayRenderer>,
    ) -> Result<()> {
        assert!(
            self.window.is_some(),
            "render called without window-sized resources"
        );

        let slot = self.ring.begin_frame(&self.ctx.device)?;
        self.timer.begin_frame(slot);

        let ctx = FrameContext::build_with_display(
            state,
            self.prev_view_projection,
            self.frame_index,
            self.ctx.config.width,
            self.ctx.config.height,
        );
        let window = self.window.as_mut().expect("checked above");
        assert_eq!(
            (ctx.viewport.render_width, ctx.viewport.render_height),
            (window.targets.plan.render_width, window.targets.plan.render_height),
            "render resolution changed without recreating window-sized resources"
        );

        let queue = &self.ctx.queue;
        let plan = FramePlan::new(&ctx, state.debug, window.targets.plan.sharpen_enabled);

        // Per-frame constants into the ring.
        let frame_offset = self
            .ring
            .push(queue, bytemuck::bytes_of(&ctx.to_uniforms(state))) as u32;

        // Per-draw transforms, shadow views and debug boxes.
        let mut object_offsets = Vec::new();
        let mut shadow_view_offsets = vec![0u32; MAX_SHADOW_VIEWS];
        let mut batches = Default::default();
        let mut debug_box_offsets = Vec::new();
        let mut debug_frustum_offsets = Vec::new();
        if let Some(scene) = &self.scene {
            for draw in &scene.draws {
                let u = ObjectUniforms {
                    model: draw.transform.to_cols_array_2d(),
                };
                object_offsets.push(self.ring.push(queue, bytemuck::bytes_of(&u)) as u32);
                if plan.bounding_boxes {
                    let m = ObjectUniforms {
                        model: aabb_transform(&draw.aabb, &draw.transform).to_cols_array_2d(),
                    };
                    debug_box_offsets.push(self.ring.push(queue, bytemuck::bytes_of(&m)) as u32);
                }
            }
            let centers: Vec<_> = scene
                .draws
                .iter()
                .map(|d| (d.transform.transform_point3(d.aabb.center()), d.transparent))
                .collect();
            let view = state.camera.view();
            batches = order_draws(&centers, &view);
        }
        for light in &ctx.lights {
            if let Some(index) = light.shadow_index {
                let m = light.view_projection.to_cols_array_2d();
                shadow_view_offsets[index as usize] =
                    self.ring.push(queue, bytemuck::bytes_of(&m)) as u32;
            }
            if plan.light_frustums {
                let m = ObjectUniforms {
                    model: frustum_transform(&light.view_projection).to_cols_array_2d(),
                };
                debug_frustum_offsets.push(self.ring.push(queue, bytemuck::bytes_of(&m)) as u32);
            }
        }

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.timer.checkpoint(&mut encoder, "frame begin");

        // Logical target states; wgpu inserts the actual barriers, these
        // assert the pass order never samples an unwritten target.
        let mut hdr_state = TrackedState::new("scene hdr");
        let mut resolved_state = TrackedState::new("temporal resolve");
        let mut tonemapped_state = TrackedState::new("tonemapped");

        if plan.shadows {
            if let Some(scene) = &self.scene {
                self.shadow.record(
                    &mut encoder,
                    &ctx,
                    scene,
                    &self.mat4_bind_group,
                    &shadow_view_offsets,
                    &self.mat4_bind_group,
                    &object_offsets,
                );
            }
            self.timer.checkpoint(&mut encoder, "shadow atlas");
        }

        hdr_state.to_render_target();
        if let Some(scene) = &self.scene {
            self.geometry.record_opaque(
                &mut encoder,
                &window.targets,
                scene,
                &batches,
                &self.frame_bind_group,
                frame_offset,
                &self.mat4_bind_group,
                &object_offsets,
            );
        } else {
            Self::record_clear(&mut encoder, &window.targets);
        }
        self.timer.checkpoint(&mut encoder, "opaque geometry");

        let sky_offset = match &state.sky {
            SkyMode::Procedural(sky) => self
                .ring
                .push(queue, bytemuck::bytes_of(&SkyUniforms::new(sky)))
                as u32,
            SkyMode::Cubemap => 0,
        };
        self.sky.record(
            &mut encoder,
            &window.targets,
            &state.sky,
            &self.frame_bind_group,
            frame_offset,
            &self.sky_params_bind_group,
            sky_offset,
        );
        self.timer.checkpoint(&mut encoder, "sky");

        if let Some(scene) = &self.scene {
            self.geometry.record_transparent(
                &mut encoder,
                &window.targets,
                scene,
                &batches,
                &self.frame_bind_group,
                frame_offset,
                &self.mat4_bind_group,
                &object_offsets,
            );
        }
        self.timer.checkpoint(&mut encoder, "transparent geometry");

        if plan.bounding_boxes {
            self.debug.record(
                &mut encoder,
                &window.targets,
                &self.frame_bind_group,
                frame_offset,
                &self.mat4_bind_group,
                &debug_box_offsets,
            );
            self.timer.checkpoint(&mut encoder, "bounding boxes");
        }
        if plan.light_frustums {
            self.debug.record(
                &mut encoder,
                &window.targets,
                &self.frame_bind_group,
                frame_offset,
                &self.mat4_bind_group,
                &debug_frustum_offsets,
            );
            self.timer.checkpoint(&mut encoder, "light frustums");
        }

        hdr_state.to_shader_read();
        let mut downsample_offsets = Vec::with_capacity(DOWNSAMPLE_MIPS as usize);
        for mip in 0..DOWNSAMPLE_MIPS {
            let (sw, sh) = if mip == 0 {
                (
                    window.targets.plan.render_width,
                    window.targets.plan.render_height,
                )
            } else {
                window.targets.plan.bloom_mip(mip - 1)
            };
            let u = DownsampleUniforms {
                inv_source_size: [1.0 / sw as f32, 1.0 / sh as f32, 0.0, 0.0],
            };
            downsample_offsets.push(self.ring.push(queue, bytemuck::bytes_of(&u)) as u32);
        }
        self.downsample.record(
            &mut encoder,
            &window.targets,
            &window.downsample_bind_groups,
            &downsample_offsets,
        );
        self.timer.checkpoint(&mut encoder, "downsample");

        let bright_offset = self
            .ring
            .push(queue, bytemuck::bytes_of(&BloomUniforms::threshold()))
            as u32;
        let blur_offsets = [
            self.ring
                .push(queue, bytemuck::bytes_of(&BloomUniforms::blur(true))) as u32,
            self.ring
                .push(queue, bytemuck::bytes_of(&BloomUniforms::blur(false))) as u32,
        ];
        let composite_offset = self
            .ring
            .push(queue, bytemuck::bytes_of(&BloomUniforms::composite()))
            as u32;
        // The composite writes bloom back into the scene color.
        hdr_state.to_render_target();
        self.bloom.record(
            &mut encoder,
            &window.targets,
            &window.bloom_bright_bind_group,
            bright_offset,
            &window.bloom_blur_bind_groups,
            blur_offsets,
            &window.bloom_composite_bind_group,
            composite_offset,
        );
        self.timer.checkpoint(&mut encoder, "bloom");

        hdr_state.to_shader_read();
        resolved_state.to_render_target();
        let taa_offset = self.ring.push(
            queue,
            bytemuck::bytes_of(&TaaUniforms::new(window.history_valid)),
        ) as u32;
        self.taa.record(
            &mut encoder,
            &window.targets,
            &window.taa_bind_group,
            taa_offset,
        );
        window.history_valid = true;
        self.timer.checkpoint(&mut encoder, "temporal resolve");

        resolved_state.to_shader_read();
        tonemapped_state.to_render_target();
        let tonemap_offset = self.ring.push(
            queue,
            bytemuck::bytes_of(&TonemapUniforms::new(state.exposure, state.tone_operator)),
        ) as u32;
        self.tonemap.record(
            &mut encoder,
            &window.targets,
            &window.tonemap_bind_group,
            tonemap_offset,
        );
        self.timer.checkpoint(&mut encoder, "tone mapping");

        // Acquired only now: everything up to tone mapping records without
        // waiting on the swapchain, so this is the frame's backpressure
        // point.
        let surface_texture = match self.ctx.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(texture)
            | wgpu::CurrentSurfaceTexture::Suboptimal(texture) => texture,
            failure => return Err(KilnError::SurfaceAcquireFailed(failure)),
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        tonemapped_state.to_shader_read();
        if plan.sharpen {
            if (state.sharpness - window.last_sharpness).abs() > f32::EPSILON {
                self.sharpen.update_constants(
                    queue,
                    CasConstants::new(
                        state.sharpness,
                        state.upscale_mode,
                        (
                            window.targets.plan.render_width,
                            window.targets.plan.render_height,
                        ),
                        (
                            window.targets.plan.sharpen_width,
                            window.targets.plan.sharpen_height,
                        ),
                    ),
                );
                window.last_sharpness = state.sharpness;
            }
            self.sharpen.record(
                &mut encoder,
                &window.targets,
                &window.sharpen_bind_group,
                window.packed,
            );
            self.timer.checkpoint(&mut encoder, "sharpen");
        }

        let blit_bind_group = if plan.sharpen {
            &window.blit_sharpened
        } else {
            &window.blit_tonemapped
        };
        self.blit.record(&mut encoder, &surface_view, blit_bind_group);
        if let Some(overlay) = overlay.as_deref_mut() {
            overlay.record(
                &self.ctx.device,
                queue,
                &mut encoder,
                &surface_view,
                self.ctx.config.width,
                self.ctx.config.height,
            );
        }
        self.timer.checkpoint(&mut encoder, "present blit");

        self.timer.end_frame(&mut encoder);
        let fence = self.ctx.queue.submit(Some(encoder.finish()));
        self.timer.schedule_readback();
        self.ring.end_frame(fence);
        surface_texture.present();

        self.prev_view_projection = ctx.view_projection;
        self.frame_index += 1;
        Ok(())
    }

    /// Clears the G-buffer when no scene is loaded so the sky and post chain
    /// still run over defined data.
    fn record_clear(encoder: &mut wgpu::CommandEncoder, targets: &WindowTargets) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("G-Buffer Clear"),
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
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    /// Per-pass GPU timings from the most recently completed frame. Empty
    /// when the adapter lacks timestamp queries.
    #[must_use]
    pub fn timing_values(&self) -> &[TimingValue] {
        self.timer.timing_values()
    }

    /// Blocks until the GPU is idle. Called before shutdown.
    pub fn wait_idle(&self) {
        self.ctx.wait_idle();
    }
}
