//! Resolution planning: viewport invariants and target sizing across the
//! three sharpen modes.

use kiln::renderer::targets::TargetPlan;
use kiln::{UpscaleMode, ViewportState};

fn plan(rw: u32, rh: u32, dw: u32, dh: u32, mode: UpscaleMode) -> TargetPlan {
    TargetPlan::new(ViewportState::new(rw, rh, dw, dh, mode), mode)
}

#[test]
fn upsample_renders_low_and_sharpens_to_display() {
    let p = plan(1280, 720, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
    assert_eq!((p.render_width, p.render_height), (1280, 720));
    assert_eq!((p.sharpen_width, p.sharpen_height), (1920, 1080));
    assert!(p.sharpen_enabled);
}

#[test]
fn sharpen_only_keeps_render_resolution_below_display() {
    // The sharpen target stays at render resolution; the present blit
    // covers the remaining scale to the display.
    let p = plan(960, 540, 1920, 1080, UpscaleMode::SharpenOnly);
    assert_eq!((p.sharpen_width, p.sharpen_height), (960, 540));
    assert!(p.sharpen_enabled);
}

#[test]
fn disabled_mode_plans_no_sharpen_stage() {
    let p = plan(1920, 1080, 1920, 1080, UpscaleMode::Disabled);
    assert!(!p.sharpen_enabled);
    assert_eq!((p.sharpen_width, p.sharpen_height), (1920, 1080));
}

#[test]
fn equal_resolutions_are_a_valid_upsample_configuration() {
    let p = plan(1920, 1080, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
    assert_eq!((p.sharpen_width, p.sharpen_height), (1920, 1080));
}

#[test]
#[should_panic(expected = "must equal display resolution")]
fn disabled_mode_rejects_differing_resolutions() {
    let _ = ViewportState::new(1280, 720, 1920, 1080, UpscaleMode::Disabled);
}

#[test]
#[should_panic(expected = "must not exceed display resolution")]
fn upsample_rejects_render_above_display() {
    let _ = ViewportState::new(3840, 2160, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
}

#[test]
#[should_panic(expected = "non-zero")]
fn zero_dimensions_are_rejected() {
    let _ = ViewportState::new(0, 1080, 1920, 1080, UpscaleMode::SharpenOnly);
}

#[test]
fn display_resize_changes_only_display_derived_dimensions() {
    // Display shrinks while the render resolution stays fixed; every
    // render-resolution-sized target keeps its dimensions and only the
    // sharpen output follows the display.
    let before = plan(960, 540, 1920, 1080, UpscaleMode::UpsampleAndSharpen);
    let after = plan(960, 540, 1280, 720, UpscaleMode::UpsampleAndSharpen);
    assert_eq!(
        (before.render_width, before.render_height),
        (after.render_width, after.render_height)
    );
    assert_eq!(before.bloom_mip(0), after.bloom_mip(0));
    assert_eq!((before.sharpen_width, before.sharpen_height), (1920, 1080));
    assert_eq!((after.sharpen_width, after.sharpen_height), (1280, 720));
}

#[test]
fn bloom_chain_halves_from_half_render_resolution() {
    let p = plan(1920, 1080, 1920, 1080, UpscaleMode::Disabled);
    assert_eq!(p.bloom_mip(0), (960, 540));
    assert_eq!(p.bloom_mip(4), (60, 33));
}
