//! Scene Source Data
//!
//! CPU-side, already-decoded scene content. Asset parsing (glTF, image
//! decode) is an external concern; the renderer only consumes plain vertex,
//! index, material and texel data and streams it to the GPU through the
//! staged loader in [`crate::renderer::loader`].

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Interleaved vertex layout shared by all scene meshes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Axis-aligned bounding box in object space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Computes the bounds of a vertex list. Empty input yields a degenerate
    /// box at the origin.
    #[must_use]
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in vertices {
            min = min.min(Vec3::from(v.position));
            max = max.max(Vec3::from(v.position));
        }
        if vertices.is_empty() {
            min = Vec3::ZERO;
            max = Vec3::ZERO;
        }
        Self { min, max }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// One mesh of the scene, referencing a material by index.
#[derive(Clone, Debug)]
pub struct MeshSource {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: usize,
    pub transform: Mat4,
}

impl MeshSource {
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_vertices(&self.vertices)
    }
}

/// Material parameters, optionally referencing a texture by index.
#[derive(Clone, Copy, Debug)]
pub struct MaterialSource {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub base_color_texture: Option<usize>,
    /// Transparent materials are drawn in the sorted second geometry pass.
    pub transparent: bool,
}

impl Default for MaterialSource {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            emissive: [0.0; 3],
            base_color_texture: None,
            transparent: false,
        }
    }
}

/// Raw RGBA8 texel data.
#[derive(Clone, Debug)]
pub struct TextureSource {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

/// A complete decoded scene, ready for staged GPU upload.
#[derive(Clone, Debug, Default)]
pub struct SceneSource {
    pub meshes: Vec<MeshSource>,
    pub materials: Vec<MaterialSource>,
    pub textures: Vec<TextureSource>,
}

impl SceneSource {
    /// Validates cross-references and texel sizes.
    ///
    /// Returns a description of the first problem found, or `Ok(())`.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.meshes.is_empty() {
            return Err("scene contains no meshes".into());
        }
        for (i, mesh) in self.meshes.iter().enumerate() {
            if mesh.vertices.is_empty() || mesh.indices.is_empty() {
                return Err(format!("mesh {i} has no geometry"));
            }
            if mesh.material >= self.materials.len() {
                return Err(format!(
                    "mesh {i} references material {} of {}",
                    mesh.material,
                    self.materials.len()
                ));
            }
            if let Some(&bad) = mesh
                .indices
                .iter()
                .find(|&&idx| idx as usize >= mesh.vertices.len())
            {
                return Err(format!("mesh {i} index {bad} out of bounds"));
            }
        }
        for (i, mat) in self.materials.iter().enumerate() {
            if let Some(tex) = mat.base_color_texture {
                if tex >= self.textures.len() {
                    return Err(format!(
                        "material {i} references texture {tex} of {}",
                        self.textures.len()
                    ));
                }
            }
        }
        for (i, tex) in self.textures.iter().enumerate() {
            let expected = tex.width as usize * tex.height as usize * 4;
            if tex.rgba8.len() != expected {
                return Err(format!(
                    "texture {i}: {} bytes, expected {expected}",
                    tex.rgba8.len()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshSource {
        MeshSource {
            vertices: vec![
                Vertex {
                    position: [0.0, 0.0, 0.0],
                    normal: [0.0, 0.0, 1.0],
                    uv: [0.0, 0.0],
                },
                Vertex {
                    position: [1.0, 0.0, 0.0],
                    normal: [0.0, 0.0, 1.0],
                    uv: [1.0, 0.0],
                },
                Vertex {
                    position: [0.0, 1.0, 0.0],
                    normal: [0.0, 0.0, 1.0],
                    uv: [0.0, 1.0],
                },
            ],
            indices: vec![0, 1, 2],
            material: 0,
            transform: Mat4::IDENTITY,
        }
    }

    #[test]
    fn empty_scene_fails_validation() {
        assert!(SceneSource::default().validate().is_err());
    }

    #[test]
    fn valid_scene_passes() {
        let scene = SceneSource {
            meshes: vec![triangle()],
            materials: vec![MaterialSource::default()],
            textures: vec![],
        };
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn dangling_material_reference_fails() {
        let mut mesh = triangle();
        mesh.material = 3;
        let scene = SceneSource {
            meshes: vec![mesh],
            materials: vec![MaterialSource::default()],
            textures: vec![],
        };
        assert!(scene.validate().unwrap_err().contains("material"));
    }

    #[test]
    fn short_texel_data_fails() {
        let scene = SceneSource {
            meshes: vec![triangle()],
            materials: vec![MaterialSource::default()],
            textures: vec![TextureSource {
                width: 2,
                height: 2,
                rgba8: vec![0; 15],
            }],
        };
        assert!(scene.validate().unwrap_err().contains("texture"));
    }

    #[test]
    fn aabb_spans_vertices() {
        let aabb = triangle().aabb();
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 0.0));
    }
}
