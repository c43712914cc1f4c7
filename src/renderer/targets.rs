//! Render Targets
//!
//! Window-sized GPU resources and the pure planning logic that sizes them.
//! [`TargetPlan`] decides, from the viewport and upscale mode alone, which
//! targets live at render resolution and which at display resolution, so the
//! sizing rules are testable without a device. [`WindowTargets`] turns a plan
//! into actual textures and is destroyed/recreated wholesale on any display
//! resize or mode change.

use crate::errors::Result;
use crate::frame::{UpscaleMode, ViewportState};

/// Depth format of the scene depth buffer and the shadow atlas.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// HDR color format used throughout the pre-tonemap chain.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Motion-vector format (screen-space UV delta per pixel).
pub const MOTION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Side length of the square shadow atlas.
pub const SHADOW_ATLAS_SIZE: u32 = 2048;

/// Mip count of the scene-color downsample chain.
pub const DOWNSAMPLE_MIPS: u32 = 5;

/// Pure sizing plan for the window-sized target set.
///
/// | Target              | Resolution                         |
/// |---------------------|------------------------------------|
/// | Depth, HDR, motion  | render                             |
/// | Temporal history    | render                             |
/// | Bloom chain         | render / 2 (then halving)          |
/// | Tone-map output     | render                             |
/// | Sharpen output      | display (upsample) or render (else)|
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetPlan {
    pub render_width: u32,
    pub render_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    /// Dimensions of the sharpen stage's output target.
    pub sharpen_width: u32,
    pub sharpen_height: u32,
    /// Whether the sharpen stage runs at all.
    pub sharpen_enabled: bool,
}

impl TargetPlan {
    /// Computes the plan for a viewport and mode.
    ///
    /// In [`UpscaleMode::SharpenOnly`] the sharpen target stays at render
    /// resolution even when the display is larger; the final blit covers the
    /// remaining scale.
    #[must_use]
    pub fn new(viewport: ViewportState, mode: UpscaleMode) -> Self {
        let (sharpen_width, sharpen_height, sharpen_enabled) = match mode {
            UpscaleMode::Disabled => (viewport.render_width, viewport.render_height, false),
            UpscaleMode::UpsampleAndSharpen => {
                (viewport.display_width, viewport.display_height, true)
            }
            UpscaleMode::SharpenOnly => (viewport.render_width, viewport.render_height, true),
        };
        Self {
            render_width: viewport.render_width,
            render_height: viewport.render_height,
            display_width: viewport.display_width,
            display_height: viewport.display_height,
            sharpen_width,
            sharpen_height,
            sharpen_enabled,
        }
    }

    /// Dimensions of bloom mip `level` (level 0 is half render resolution).
    #[must_use]
    pub fn bloom_mip(&self, level: u32) -> (u32, u32) {
        let w = (self.render_width / 2) >> level;
        let h = (self.render_height / 2) >> level;
        (w.max(1), h.max(1))
    }
}

/// Logical access state of a render target.
///
/// wgpu inserts the actual barriers; this tracker only enforces that the pass
/// sequence never samples a target it is still rendering to in the same pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    RenderTarget,
    ShaderRead,
}

/// Tracks the logical state of one target across the frame.
#[derive(Debug)]
pub struct TrackedState {
    label: &'static str,
    state: ResourceState,
}

impl TrackedState {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: ResourceState::ShaderRead,
        }
    }

    /// Marks the target as the destination of a pass.
    pub fn to_render_target(&mut self) {
        self.state = ResourceState::RenderTarget;
    }

    /// Marks the target as readable by later passes.
    ///
    /// # Panics
    ///
    /// Panics if the target was never written. Sampling a target before any
    /// pass produced it is a pass-ordering bug.
    pub fn to_shader_read(&mut self) {
        assert_eq!(
            self.state,
            ResourceState::RenderTarget,
            "{}: transition to shader-read without a prior write",
            self.label
        );
        self.state = ResourceState::ShaderRead;
    }

    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    mip_level_count: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// A render-target texture with its default view.
pub struct Target {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Target {
    fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let (texture, view) = create_target(device, label, width, height, format, usage, 1);
        Self { texture, view }
    }
}

/// The complete window-sized target set.
///
/// Created in one shot from a [`TargetPlan`]; any display resize, render
/// resize or upscale-mode change destroys and recreates the whole set.
pub struct WindowTargets {
    pub plan: TargetPlan,
    /// Scene depth, render resolution.
    pub depth: Target,
    /// HDR scene color, render resolution.
    pub hdr: Target,
    /// Per-pixel motion vectors, render resolution.
    pub motion: Target,
    /// Temporal accumulation history (previous resolved frame).
    pub history: Target,
    /// Temporal resolve output, consumed by tone mapping.
    pub resolved: Target,
    /// Downsample chain of the HDR scene color.
    pub downsample: Target,
    /// Per-mip views of the downsample chain.
    pub downsample_mips: Vec<wgpu::TextureView>,
    /// Bloom ping-pong pair at half render resolution.
    pub bloom: [Target; 2],
    /// Tone-mapped LDR-range image, still [`HDR_FORMAT`], render resolution.
    pub tonemapped: Target,
    /// Sharpen stage output (storage texture), sized per the plan.
    pub sharpened: Target,
}

impl WindowTargets {
    /// Creates every window-sized target for the plan.
    pub fn new(device: &wgpu::Device, plan: TargetPlan) -> Result<Self> {
        let (rw, rh) = (plan.render_width, plan.render_height);
        let attach_sample = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING;

        let depth = Target::new(device, "Scene Depth", rw, rh, DEPTH_FORMAT, attach_sample);
        let hdr = Target::new(device, "Scene HDR", rw, rh, HDR_FORMAT, attach_sample);
        let motion = Target::new(
            device,
            "Motion Vectors",
            rw,
            rh,
            MOTION_FORMAT,
            attach_sample,
        );
        let history = Target::new(
            device,
            "Temporal History",
            rw,
            rh,
            HDR_FORMAT,
            attach_sample | wgpu::TextureUsages::COPY_DST,
        );
        let resolved = Target::new(
            device,
            "Temporal Resolve",
            rw,
            rh,
            HDR_FORMAT,
            attach_sample | wgpu::TextureUsages::COPY_SRC,
        );

        let (ds_texture, _) = create_target(
            device,
            "Scene Downsample",
            (rw / 2).max(1),
            (rh / 2).max(1),
            HDR_FORMAT,
            attach_sample,
            DOWNSAMPLE_MIPS,
        );
        let downsample_mips = (0..DOWNSAMPLE_MIPS)
            .map(|mip| {
                ds_texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Downsample Mip"),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let downsample = Target {
            view: ds_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            texture: ds_texture,
        };

        let (bw, bh) = plan.bloom_mip(0);
        let bloom = [
            Target::new(device, "Bloom A", bw, bh, HDR_FORMAT, attach_sample),
            Target::new(device, "Bloom B", bw, bh, HDR_FORMAT, attach_sample),
        ];

        let tonemapped = Target::new(device, "Tonemapped", rw, rh, HDR_FORMAT, attach_sample);

        let sharpened = Target::new(
            device,
            "Sharpened",
            plan.sharpen_width,
            plan.sharpen_height,
            HDR_FORMAT,
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        log::debug!(
            "window targets created: render {rw}x{rh}, display {}x{}, sharpen {}x{}",
            plan.display_width,
            plan.display_height,
            plan.sharpen_width,
            plan.sharpen_height
        );

        Ok(Self {
            plan,
            depth,
            hdr,
            motion,
            history,
            resolved,
            downsample,
            downsample_mips,
            bloom,
            tonemapped,
            sharpened,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(rw: u32, rh: u32, dw: u32, dh: u32, mode: UpscaleMode) -> ViewportState {
        ViewportState::new(rw, rh, dw, dh, mode)
    }

    #[test]
    fn disabled_mode_keeps_everything_at_render_resolution() {
        let plan = TargetPlan::new(
            viewport(1920, 1080, 1920, 1080, UpscaleMode::Disabled),
            UpscaleMode::Disabled,
        );
        assert!(!plan.sharpen_enabled);
        assert_eq!((plan.sharpen_width, plan.sharpen_height), (1920, 1080));
    }

    #[test]
    fn upsample_mode_targets_display_resolution() {
        let plan = TargetPlan::new(
            viewport(1280, 720, 1920, 1080, UpscaleMode::UpsampleAndSharpen),
            UpscaleMode::UpsampleAndSharpen,
        );
        assert!(plan.sharpen_enabled);
        assert_eq!((plan.sharpen_width, plan.sharpen_height), (1920, 1080));
    }

    #[test]
    fn sharpen_only_stays_at_render_resolution() {
        let plan = TargetPlan::new(
            viewport(960, 540, 1920, 1080, UpscaleMode::SharpenOnly),
            UpscaleMode::SharpenOnly,
        );
        assert!(plan.sharpen_enabled);
        assert_eq!((plan.sharpen_width, plan.sharpen_height), (960, 540));
    }

    #[test]
    fn bloom_mips_halve_and_clamp() {
        let plan = TargetPlan::new(
            viewport(1280, 720, 1280, 720, UpscaleMode::Disabled),
            UpscaleMode::Disabled,
        );
        assert_eq!(plan.bloom_mip(0), (640, 360));
        assert_eq!(plan.bloom_mip(1), (320, 180));
        assert_eq!(plan.bloom_mip(10), (1, 1));
    }

    #[test]
    fn tracked_state_round_trips() {
        let mut s = TrackedState::new("hdr");
        s.to_render_target();
        assert_eq!(s.state(), ResourceState::RenderTarget);
        s.to_shader_read();
        assert_eq!(s.state(), ResourceState::ShaderRead);
    }

    #[test]
    #[should_panic(expected = "without a prior write")]
    fn tracked_state_rejects_read_before_write() {
        let mut s = TrackedState::new("motion");
        s.to_shader_read();
    }
}
