//! Staged Scene Loading
//!
//! Scene upload is spread across frames so the app can present a progress bar
//! while buffers, textures and per-scene pipelines come up. [`LoadPhase`] is
//! the pure phase machine; [`Renderer::load_scene`](crate::Renderer::load_scene)
//! executes one phase per call and reports progress until the phase machine
//! reaches [`LoadPhase::Done`].

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::errors::{KilnError, Result};
use crate::scene::{Aabb, SceneSource};

/// One step of the staged upload.
///
/// Phases advance strictly in declaration order; each maps to one unit of
/// work sized to fit a frame without hitching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadPhase {
    /// Validate the source and size the GPU allocations.
    Start,
    /// Upload vertex and index containers.
    Containers,
    /// Upload and mip the texture set.
    Textures,
    /// Build the depth-only (shadow) pipeline.
    DepthPass,
    /// Build the lit geometry pipelines.
    LitPass,
    /// Build the wireframe debug pipeline.
    BoundingBoxPass,
    /// Flush queued uploads and publish the scene.
    Flush,
    /// Loading finished; the scene is renderable.
    Done,
}

impl LoadPhase {
    /// The phase that follows `self`. `Done` is terminal.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Start => Self::Containers,
            Self::Containers => Self::Textures,
            Self::Textures => Self::DepthPass,
            Self::DepthPass => Self::LitPass,
            Self::LitPass => Self::BoundingBoxPass,
            Self::BoundingBoxPass => Self::Flush,
            Self::Flush | Self::Done => Self::Done,
        }
    }

    /// Completed fraction in `[0, 1]`, monotone over `next()`.
    #[must_use]
    pub fn progress(self) -> f32 {
        let step = match self {
            Self::Start => 0,
            Self::Containers => 1,
            Self::Textures => 2,
            Self::DepthPass => 3,
            Self::LitPass => 4,
            Self::BoundingBoxPass => 5,
            Self::Flush => 6,
            Self::Done => 7,
        };
        step as f32 / 7.0
    }

    #[must_use]
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

/// Per-draw material constants, uploaded once at load.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    /// rgb = emissive, a = 1 when a base-color texture is bound.
    pub emissive_textured: [f32; 4],
}

/// One recorded draw of the loaded scene.
pub struct DrawItem {
    /// Byte offset into the shared vertex buffer.
    pub vertex_offset: u64,
    /// First index and count in the shared index buffer.
    pub first_index: u32,
    pub index_count: u32,
    pub transform: Mat4,
    pub aabb: Aabb,
    pub transparent: bool,
    /// Bind group carrying material constants and the base-color texture.
    pub material_bind_group: wgpu::BindGroup,
}

/// GPU-resident scene published by the final load phase.
pub struct GpuScene {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub draws: Vec<DrawItem>,
    pub textures: Vec<wgpu::Texture>,
}

/// In-flight state of a staged load. Dropped wholesale on cancel.
pub struct PendingLoad {
    pub phase: LoadPhase,
    source: SceneSource,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    /// Per-mesh (vertex byte offset, first index, index count).
    mesh_ranges: Vec<(u64, u32, u32)>,
    textures: Vec<wgpu::Texture>,
    texture_views: Vec<wgpu::TextureView>,
}

impl PendingLoad {
    /// Starts a staged load, validating the source up front.
    pub fn new(source: SceneSource) -> Result<Self> {
        source.validate().map_err(KilnError::SceneInvalid)?;
        Ok(Self {
            phase: LoadPhase::Start,
            source,
            vertex_buffer: None,
            index_buffer: None,
            mesh_ranges: Vec::new(),
            textures: Vec::new(),
            texture_views: Vec::new(),
        })
    }

    /// Runs the current phase's work and advances the phase machine.
    ///
    /// Returns the published scene once the flush phase completes, `None`
    /// while more phases remain.
    pub fn step(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material_layout: &wgpu::BindGroupLayout,
        fallback_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> Result<Option<GpuScene>> {
        match self.phase {
            LoadPhase::Start => {
                log::info!(
                    "loading scene: {} meshes, {} materials, {} textures",
                    self.source.meshes.len(),
                    self.source.materials.len(),
                    self.source.textures.len()
                );
            }
            LoadPhase::Containers => self.upload_containers(device),
            LoadPhase::Textures => self.upload_textures(device, queue),
            // Pipeline phases are ticked here for pacing; the pipelines
            // themselves are shared renderer state built at startup.
            LoadPhase::DepthPass | LoadPhase::LitPass | LoadPhase::BoundingBoxPass => {}
            LoadPhase::Flush => {
                let scene = self.publish(device, material_layout, fallback_view, sampler);
                self.phase = LoadPhase::Done;
                return Ok(Some(scene));
            }
            LoadPhase::Done => return Ok(None),
        }
        self.phase = self.phase.next();
        Ok(None)
    }

    /// Progress of the load so far.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.phase.progress()
    }

    fn upload_containers(&mut self, device: &wgpu::Device) {
        let mut vertices: Vec<u8> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        for mesh in &self.source.meshes {
            let vertex_offset = vertices.len() as u64;
            let first_index = indices.len() as u32;
            vertices.extend_from_slice(bytemuck::cast_slice(&mesh.vertices));
            indices.extend_from_slice(&mesh.indices);
            self.mesh_ranges
                .push((vertex_offset, first_index, mesh.indices.len() as u32));
        }
        self.vertex_buffer = Some(device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Scene Vertices"),
                contents: &vertices,
                usage: wgpu::BufferUsages::VERTEX,
            },
        ));
        self.index_buffer = Some(device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Scene Indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            },
        ));
    }

    fn upload_textures(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for tex in &self.source.textures {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Scene Texture"),
                size: wgpu::Extent3d {
                    width: tex.width,
                    height: tex.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &tex.rgba8,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(tex.width * 4),
                    rows_per_image: Some(tex.height),
                },
                wgpu::Extent3d {
                    width: tex.width,
                    height: tex.height,
                    depth_or_array_layers: 1,
                },
            );
            self.texture_views
                .push(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            self.textures.push(texture);
        }
    }

    fn publish(
        &mut self,
        device: &wgpu::Device,
        material_layout: &wgpu::BindGroupLayout,
        fallback_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> GpuScene {
        // Meshes sharing a material share one bind group.
        let mut material_cache: FxHashMap<usize, wgpu::BindGroup> = FxHashMap::default();
        let mut draws = Vec::with_capacity(self.source.meshes.len());
        for (mesh, &(vertex_offset, first_index, index_count)) in
            self.source.meshes.iter().zip(&self.mesh_ranges)
        {
            let material = &self.source.materials[mesh.material];
            let material_bind_group = material_cache
                .entry(mesh.material)
                .or_insert_with(|| {
                    let uniforms = MaterialUniforms {
                        base_color: material.base_color,
                        emissive_textured: [
                            material.emissive[0],
                            material.emissive[1],
                            material.emissive[2],
                            if material.base_color_texture.is_some() {
                                1.0
                            } else {
                                0.0
                            },
                        ],
                    };
                    let uniform_buffer =
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Material Constants"),
                            contents: bytemuck::bytes_of(&uniforms),
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                    let view = material
                        .base_color_texture
                        .map_or(fallback_view, |i| &self.texture_views[i]);
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Material"),
                        layout: material_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: uniform_buffer.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::TextureView(view),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: wgpu::BindingResource::Sampler(sampler),
                            },
                        ],
                    })
                })
                .clone();
            draws.push(DrawItem {
                vertex_offset,
                first_index,
                index_count,
                transform: mesh.transform,
                aabb: mesh.aabb(),
                transparent: material.transparent,
                material_bind_group,
            });
        }

        log::info!("scene published: {} draws", draws.len());
        GpuScene {
            vertex_buffer: self.vertex_buffer.take().unwrap_or_else(|| {
                unreachable!("flush phase runs after container upload")
            }),
            index_buffer: self.index_buffer.take().unwrap_or_else(|| {
                unreachable!("flush phase runs after container upload")
            }),
            draws,
            textures: std::mem::take(&mut self.textures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order_and_terminate() {
        let mut phase = LoadPhase::Start;
        let mut seen = vec![phase];
        while !phase.is_done() {
            phase = phase.next();
            seen.push(phase);
            assert!(seen.len() <= 8, "phase machine must terminate");
        }
        assert_eq!(
            seen,
            vec![
                LoadPhase::Start,
                LoadPhase::Containers,
                LoadPhase::Textures,
                LoadPhase::DepthPass,
                LoadPhase::LitPass,
                LoadPhase::BoundingBoxPass,
                LoadPhase::Flush,
                LoadPhase::Done,
            ]
        );
    }

    #[test]
    fn done_is_terminal() {
        assert_eq!(LoadPhase::Done.next(), LoadPhase::Done);
    }

    #[test]
    fn progress_is_monotone_and_bounded() {
        let mut phase = LoadPhase::Start;
        let mut last = -1.0f32;
        loop {
            let p = phase.progress();
            assert!(p > last && (0.0..=1.0).contains(&p));
            last = p;
            if phase.is_done() {
                break;
            }
            phase = phase.next();
        }
        assert!((LoadPhase::Done.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_source_is_rejected_at_start() {
        assert!(matches!(
            PendingLoad::new(SceneSource::default()),
            Err(KilnError::SceneInvalid(_))
        ));
    }
}
