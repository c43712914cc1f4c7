//! Frame Context
//!
//! [`FrameContext`] is the immutable per-frame snapshot the whole pass
//! sequence reads from. It is built exactly once per frame from the caller's
//! [`FrameState`] and the previous frame's camera: light count validated and
//! capped, shadow-atlas indices assigned, the jittered camera projection
//! established. Nothing mutates it afterwards.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::frame::{FrameState, UpscaleMode, ViewportState};

/// Compile-time cap on lights per frame.
pub const MAX_LIGHTS: usize = 16;

/// Number of shadow views in the atlas (one per quadrant).
pub const MAX_SHADOW_VIEWS: usize = 4;

/// Fixed depth bias applied to shadowed spotlights.
pub const SHADOW_DEPTH_BIAS: f32 = 70.0 / 100_000.0;

/// A frame's view of one light.
#[derive(Clone, Copy, Debug)]
pub struct LightRecord {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub inner_cone_cos: f32,
    pub outer_cone_cos: f32,
    pub view_projection: Mat4,
    /// Atlas quadrant, assigned to the first [`MAX_SHADOW_VIEWS`] spotlights
    /// in frame order. Later lights cast no shadow.
    pub shadow_index: Option<u8>,
    pub depth_bias: f32,
}

/// GPU layout of one light inside [`FrameUniforms`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuLight {
    pub view_projection: [[f32; 4]; 4],
    /// xyz = position, w = range.
    pub position_range: [f32; 4],
    /// xyz = direction, w unused.
    pub direction: [f32; 4],
    /// rgb = color, a = intensity.
    pub color_intensity: [f32; 4],
    /// x = inner cone cos, y = outer cone cos, z = shadow index (-1 = none),
    /// w = depth bias.
    pub cone: [f32; 4],
}

/// Per-frame constant block uploaded once into the ring.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub view_projection_inverse: [[f32; 4]; 4],
    pub prev_view_projection: [[f32; 4]; 4],
    /// xyz = camera position, w unused.
    pub camera_position: [f32; 4],
    /// x,y = 1/render resolution; z = ibl factor, w = emissive factor.
    pub resolution_factors: [f32; 4],
    /// x = time, y = light count, z,w = projection jitter.
    pub time_lights_jitter: [f32; 4],
    pub lights: [GpuLight; MAX_LIGHTS],
}

/// Immutable snapshot of everything the pass sequence needs for one frame.
pub struct FrameContext {
    pub viewport: ViewportState,
    pub upscale_mode: UpscaleMode,
    /// Jittered view-projection used for geometry and sky.
    pub view_projection: Mat4,
    pub view_projection_inverse: Mat4,
    /// Previous frame's jittered view-projection, for motion vectors.
    pub prev_view_projection: Mat4,
    pub camera_position: Vec3,
    pub jitter: Vec2,
    pub time: f32,
    pub lights: SmallVec<[LightRecord; MAX_LIGHTS]>,
}

impl FrameContext {
    /// Builds the frame snapshot.
    ///
    /// The caller's spotlight list is capped at [`MAX_LIGHTS`] (excess lights
    /// are dropped with a warning) and shadow indices are assigned here, not
    /// during pass traversal.
    #[must_use]
    pub fn build(state: &FrameState, prev_view_projection: Mat4, frame_index: u64) -> Self {
        Self::build_with_display(
            state,
            prev_view_projection,
            frame_index,
            state.render_width,
            state.render_height,
        )
    }

    /// Builds the frame snapshot with an explicit display resolution.
    #[must_use]
    pub fn build_with_display(
        state: &FrameState,
        prev_view_projection: Mat4,
        frame_index: u64,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        let viewport = ViewportState::new(
            state.render_width,
            state.render_height,
            display_width,
            display_height,
            state.upscale_mode,
        );

        let aspect = state.render_width as f32 / state.render_height as f32;
        let view = state.camera.view();
        let proj = state.camera.projection(aspect);

        // Sub-pixel jitter for temporal resolve, in NDC units.
        let jitter = halton_jitter(frame_index)
            / Vec2::new(state.render_width as f32, state.render_height as f32)
            * 2.0;
        let jittered_proj = Mat4::from_translation(jitter.extend(0.0)) * proj;
        let view_projection = jittered_proj * view;

        let mut lights: SmallVec<[LightRecord; MAX_LIGHTS]> = SmallVec::new();
        if state.spotlights.len() > MAX_LIGHTS {
            log::warn!(
                "frame supplies {} lights, capping at {MAX_LIGHTS}",
                state.spotlights.len()
            );
        }
        let mut shadow_views = 0u8;
        for spot in state.spotlights.iter().take(MAX_LIGHTS) {
            let shadow_index = if (shadow_views as usize) < MAX_SHADOW_VIEWS {
                let idx = shadow_views;
                shadow_views += 1;
                Some(idx)
            } else {
                None
            };
            lights.push(LightRecord {
                position: spot.position,
                direction: spot.direction.normalize_or_zero(),
                color: spot.color,
                intensity: spot.intensity,
                range: spot.range,
                inner_cone_cos: (spot.fov * 0.9 / 2.0).cos(),
                outer_cone_cos: (spot.fov / 2.0).cos(),
                view_projection: spot.view_projection(),
                shadow_index,
                depth_bias: SHADOW_DEPTH_BIAS,
            });
        }

        Self {
            viewport,
            upscale_mode: state.upscale_mode,
            view_projection,
            view_projection_inverse: view_projection.inverse(),
            prev_view_projection,
            camera_position: state.camera.eye,
            jitter,
            time: state.time,
            lights,
        }
    }

    /// True when at least one light casts into the shadow atlas.
    #[must_use]
    pub fn has_shadow_casters(&self) -> bool {
        self.lights.iter().any(|l| l.shadow_index.is_some())
    }

    /// Flattens the snapshot into the GPU constant block.
    #[must_use]
    pub fn to_uniforms(&self, state: &FrameState) -> FrameUniforms {
        let mut lights = [GpuLight::zeroed(); MAX_LIGHTS];
        for (dst, src) in lights.iter_mut().zip(self.lights.iter()) {
            *dst = GpuLight {
                view_projection: src.view_projection.to_cols_array_2d(),
                position_range: src.position.extend(src.range).to_array(),
                direction: src.direction.extend(0.0).to_array(),
                color_intensity: src.color.extend(src.intensity).to_array(),
                cone: [
                    src.inner_cone_cos,
                    src.outer_cone_cos,
                    src.shadow_index.map_or(-1.0, f32::from),
                    src.depth_bias,
                ],
            };
        }
        FrameUniforms {
            view_projection: self.view_projection.to_cols_array_2d(),
            view_projection_inverse: self.view_projection_inverse.to_cols_array_2d(),
            prev_view_projection: self.prev_view_projection.to_cols_array_2d(),
            camera_position: self.camera_position.extend(1.0).to_array(),
            resolution_factors: Vec4::new(
                1.0 / self.viewport.render_width as f32,
                1.0 / self.viewport.render_height as f32,
                state.ibl_factor,
                state.emissive_factor,
            )
            .to_array(),
            time_lights_jitter: [
                self.time,
                self.lights.len() as f32,
                self.jitter.x,
                self.jitter.y,
            ],
            lights,
        }
    }
}

/// Halton(2,3) sub-pixel offset in `[-0.5, 0.5]`, cycling over 8 samples.
#[must_use]
pub fn halton_jitter(frame_index: u64) -> Vec2 {
    let i = (frame_index % 8) as u32 + 1;
    Vec2::new(halton(i, 2) - 0.5, halton(i, 3) - 0.5)
}

fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0f32;
    let mut result = 0.0f32;
    while index > 0 {
        f /= base as f32;
        result += f * (index % base) as f32;
        index /= base;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Spotlight;

    fn state_with_spots(count: usize) -> FrameState {
        FrameState {
            render_width: 960,
            render_height: 540,
            upscale_mode: UpscaleMode::SharpenOnly,
            spotlights: (0..count).map(|_| Spotlight::default()).collect(),
            ..FrameState::default()
        }
    }

    #[test]
    fn first_four_spots_get_atlas_indices() {
        let ctx = FrameContext::build(&state_with_spots(5), Mat4::IDENTITY, 0);
        let indices: Vec<_> = ctx.lights.iter().map(|l| l.shadow_index).collect();
        assert_eq!(
            indices,
            vec![Some(0), Some(1), Some(2), Some(3), None],
            "exactly the first four spotlights receive atlas quadrants"
        );
    }

    #[test]
    fn light_list_is_capped() {
        let ctx = FrameContext::build(&state_with_spots(MAX_LIGHTS + 7), Mat4::IDENTITY, 0);
        assert_eq!(ctx.lights.len(), MAX_LIGHTS);
    }

    #[test]
    fn shadowed_lights_carry_fixed_bias() {
        let ctx = FrameContext::build(&state_with_spots(2), Mat4::IDENTITY, 0);
        for light in &ctx.lights {
            assert!((light.depth_bias - SHADOW_DEPTH_BIAS).abs() < 1e-9);
        }
    }

    #[test]
    fn no_lights_means_no_shadow_casters() {
        let ctx = FrameContext::build(&state_with_spots(0), Mat4::IDENTITY, 0);
        assert!(!ctx.has_shadow_casters());
    }

    #[test]
    fn jitter_cycles_and_stays_subpixel() {
        for i in 0..16 {
            let j = halton_jitter(i);
            assert!(j.x.abs() <= 0.5 && j.y.abs() <= 0.5);
        }
        assert_eq!(halton_jitter(0), halton_jitter(8));
        assert_ne!(halton_jitter(0), halton_jitter(1));
    }
}
