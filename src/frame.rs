//! Per-Frame Input State
//!
//! [`FrameState`] is the caller-owned description of one displayed frame:
//! camera, resolutions, upscale/sharpen configuration, tone mapping, sky
//! selection, debug toggles and the spotlight list. The renderer snapshots it
//! at the top of [`Renderer::render`](crate::Renderer::render) and never
//! mutates it.

use bitflags::bitflags;
use glam::{Mat4, Vec3};

/// Output configuration of the sharpen stage.
///
/// Switching modes at fixed resolutions changes only the sharpen stage's
/// target dimensions, but still requires one destroy/recreate cycle of the
/// window-sized resources (the intermediate target is window-sized).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum UpscaleMode {
    /// Tone-mapped image is copied to the display-resolution target unchanged.
    #[default]
    Disabled,
    /// Spatial upscale from render to display resolution with integrated
    /// sharpening.
    UpsampleAndSharpen,
    /// Sharpening at render resolution; no resolution change.
    SharpenOnly,
}

/// Tone-mapping operator applied by the tone-map stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ToneOperator {
    Linear = 0,
    Reinhard = 1,
    Uncharted2 = 2,
    #[default]
    AcesFilm = 3,
}

/// Sky rendering mode. Exactly one of the two runs per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SkyMode {
    /// Analytic sky driven by sun direction and atmospheric coefficients.
    Procedural(ProceduralSky),
    /// Environment cube map sampled via the inverse view-projection.
    Cubemap,
}

impl Default for SkyMode {
    fn default() -> Self {
        Self::Procedural(ProceduralSky::default())
    }
}

/// Parameters of the analytic sky model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProceduralSky {
    pub sun_direction: Vec3,
    pub turbidity: f32,
    pub rayleigh: f32,
    pub mie_coefficient: f32,
    pub mie_directional_g: f32,
    pub luminance: f32,
}

impl Default for ProceduralSky {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(1.0, 0.05, 0.0),
            turbidity: 10.0,
            rayleigh: 2.0,
            mie_coefficient: 0.005,
            mie_directional_g: 0.8,
            luminance: 1.0,
        }
    }
}

bitflags! {
    /// Toggles for the optional debug passes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct DebugFlags: u32 {
        /// Draw object bounding boxes as wireframes.
        const BOUNDING_BOXES = 1 << 0;
        /// Draw the frustum of every light as a wireframe box.
        const LIGHT_FRUSTUMS = 1 << 1;
    }
}

/// Camera description for one frame.
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraState {
    /// View matrix (right-handed, +Y up).
    #[must_use]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    /// Projection matrix for the given aspect ratio.
    #[must_use]
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 1.0, 3.5),
            target: Vec3::ZERO,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// A spotlight supplied by the caller.
///
/// Only the first [`MAX_SHADOW_VIEWS`](crate::renderer::MAX_SHADOW_VIEWS)
/// spotlights in frame order receive a shadow-atlas quadrant.
#[derive(Clone, Copy, Debug)]
pub struct Spotlight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Full vertical cone angle in radians.
    pub fov: f32,
    pub range: f32,
}

impl Spotlight {
    /// View-projection matrix from the light's point of view.
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        let up = if self.direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_to_rh(self.position, self.direction.normalize_or_zero(), up);
        let proj = Mat4::perspective_rh(self.fov, 1.0, 0.1, self.range.max(0.2));
        proj * view
    }
}

impl Default for Spotlight {
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 2.5, 2.0),
            direction: Vec3::new(-0.5, -0.7, -0.5),
            color: Vec3::ONE,
            intensity: 10.0,
            fov: std::f32::consts::FRAC_PI_2,
            range: 15.0,
        }
    }
}

/// Caller-owned per-frame render state.
#[derive(Clone, Debug)]
pub struct FrameState {
    pub camera: CameraState,
    pub render_width: u32,
    pub render_height: u32,
    pub upscale_mode: UpscaleMode,
    /// Sharpening strength in `[0, 1]`.
    pub sharpness: f32,
    /// Select the packed (fp16) sharpening kernel when the device supports it.
    /// Evaluated only when window-sized resources are (re)created.
    pub packed_math: bool,
    pub tone_operator: ToneOperator,
    pub exposure: f32,
    pub ibl_factor: f32,
    pub emissive_factor: f32,
    pub sky: SkyMode,
    pub debug: DebugFlags,
    pub spotlights: Vec<Spotlight>,
    /// Elapsed scene time in seconds.
    pub time: f32,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            camera: CameraState::default(),
            render_width: 0,
            render_height: 0,
            upscale_mode: UpscaleMode::default(),
            sharpness: 0.0,
            packed_math: false,
            tone_operator: ToneOperator::default(),
            exposure: 1.0,
            ibl_factor: 2.0,
            emissive_factor: 1.0,
            sky: SkyMode::default(),
            debug: DebugFlags::empty(),
            spotlights: vec![Spotlight::default()],
            time: 0.0,
        }
    }
}

/// Render-resolution rectangle vs display-resolution rectangle.
///
/// The invariant enforced at construction: the internal render resolution
/// never exceeds the display resolution while upsampling is active, and the
/// two are equal when upscaling is disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportState {
    pub render_width: u32,
    pub render_height: u32,
    pub display_width: u32,
    pub display_height: u32,
}

impl ViewportState {
    /// Builds a viewport state, validating the render/display relationship
    /// for the given mode.
    ///
    /// # Panics
    ///
    /// Panics when the invariant is violated; a mismatched viewport is a
    /// programming-contract error, not a recoverable fault.
    #[must_use]
    pub fn new(
        render_width: u32,
        render_height: u32,
        display_width: u32,
        display_height: u32,
        mode: UpscaleMode,
    ) -> Self {
        assert!(
            render_width > 0 && render_height > 0 && display_width > 0 && display_height > 0,
            "viewport dimensions must be non-zero"
        );
        match mode {
            UpscaleMode::Disabled => assert!(
                render_width == display_width && render_height == display_height,
                "render resolution must equal display resolution with upscaling disabled \
                 ({render_width}x{render_height} vs {display_width}x{display_height})"
            ),
            UpscaleMode::UpsampleAndSharpen => assert!(
                render_width <= display_width && render_height <= display_height,
                "render resolution must not exceed display resolution while upsampling \
                 ({render_width}x{render_height} vs {display_width}x{display_height})"
            ),
            UpscaleMode::SharpenOnly => {}
        }
        Self {
            render_width,
            render_height,
            display_width,
            display_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_accepts_equal_resolutions_when_disabled() {
        let vp = ViewportState::new(1920, 1080, 1920, 1080, UpscaleMode::Disabled);
        assert_eq!(vp.render_width, vp.display_width);
    }

    #[test]
    #[should_panic(expected = "must equal display resolution")]
    fn viewport_rejects_mismatch_when_disabled() {
        let _ = ViewportState::new(960, 540, 1920, 1080, UpscaleMode::Disabled);
    }

    #[test]
    fn viewport_accepts_smaller_render_when_upsampling() {
        let vp = ViewportState::new(960, 540, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
        assert!(vp.render_width <= vp.display_width);
    }

    #[test]
    #[should_panic(expected = "must not exceed display resolution")]
    fn viewport_rejects_larger_render_when_upsampling() {
        let _ = ViewportState::new(2560, 1440, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
    }

    #[test]
    fn spotlight_view_projection_is_finite() {
        let vp = Spotlight::default().view_projection();
        assert!(vp.is_finite());
    }
}
