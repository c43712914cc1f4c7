//! Frame snapshot behavior: light capping, shadow-view assignment and the
//! per-frame pass plan.

use glam::Mat4;
use kiln::renderer::frame_context::{FrameContext, halton_jitter};
use kiln::renderer::timing::FramePlan;
use kiln::{DebugFlags, FrameState, Spotlight, UpscaleMode};
use kiln::{MAX_LIGHTS, MAX_SHADOW_VIEWS};

fn state(spots: usize) -> FrameState {
    FrameState {
        render_width: 1280,
        render_height: 720,
        upscale_mode: UpscaleMode::UpsampleAndSharpen,
        spotlights: (0..spots).map(|_| Spotlight::default()).collect(),
        ..FrameState::default()
    }
}

fn snapshot(spots: usize) -> FrameContext {
    FrameContext::build_with_display(&state(spots), Mat4::IDENTITY, 3, 1920, 1080)
}

#[test]
fn shadow_views_go_to_the_first_spotlights_in_frame_order() {
    let ctx = snapshot(MAX_SHADOW_VIEWS + 2);
    for (i, light) in ctx.lights.iter().enumerate() {
        if i < MAX_SHADOW_VIEWS {
            assert_eq!(light.shadow_index, Some(i as u8));
        } else {
            assert_eq!(light.shadow_index, None);
        }
    }
}

#[test]
fn excess_lights_are_dropped_not_reordered() {
    let mut st = state(MAX_LIGHTS + 3);
    // Tag each light with a distinct intensity to observe ordering.
    for (i, spot) in st.spotlights.iter_mut().enumerate() {
        spot.intensity = i as f32;
    }
    let ctx = FrameContext::build_with_display(&st, Mat4::IDENTITY, 0, 1920, 1080);
    assert_eq!(ctx.lights.len(), MAX_LIGHTS);
    for (i, light) in ctx.lights.iter().enumerate() {
        assert!((light.intensity - i as f32).abs() < f32::EPSILON);
    }
}

#[test]
fn uniforms_report_the_capped_light_count() {
    let st = state(MAX_LIGHTS + 5);
    let ctx = FrameContext::build_with_display(&st, Mat4::IDENTITY, 0, 1920, 1080);
    let uniforms = ctx.to_uniforms(&st);
    assert!((uniforms.time_lights_jitter[1] - MAX_LIGHTS as f32).abs() < f32::EPSILON);
}

#[test]
fn unshadowed_lights_encode_a_negative_shadow_index() {
    let st = state(MAX_SHADOW_VIEWS + 1);
    let ctx = FrameContext::build_with_display(&st, Mat4::IDENTITY, 0, 1920, 1080);
    let uniforms = ctx.to_uniforms(&st);
    assert!(uniforms.lights[MAX_SHADOW_VIEWS].cone[2] < 0.0);
    assert!(uniforms.lights[0].cone[2].abs() < f32::EPSILON);
}

#[test]
fn jitter_repeats_with_the_sample_cycle() {
    assert_eq!(halton_jitter(2), halton_jitter(10));
    assert_ne!(halton_jitter(2), halton_jitter(3));
}

#[test]
fn frame_plan_matches_recorded_passes() {
    let ctx = snapshot(1);
    let plan = FramePlan::new(&ctx, DebugFlags::empty(), true);
    let labels = plan.checkpoints();
    assert_eq!(labels.first(), Some(&"frame begin"));
    assert_eq!(labels.last(), Some(&"present blit"));
    assert!(labels.contains(&"shadow atlas"));
    assert!(labels.contains(&"sharpen"));
    assert!(!labels.contains(&"bounding boxes"));
}

#[test]
fn frame_plan_omits_skipped_passes_entirely() {
    let ctx = snapshot(0);
    let plan = FramePlan::new(&ctx, DebugFlags::empty(), false);
    let labels = plan.checkpoints();
    assert!(!labels.contains(&"shadow atlas"));
    assert!(!labels.contains(&"sharpen"));
    // Unconditional stages are always present, in pipeline order.
    let order = [
        "opaque geometry",
        "sky",
        "downsample",
        "bloom",
        "temporal resolve",
        "tone mapping",
    ];
    let positions: Vec<_> = order
        .iter()
        .map(|l| labels.iter().position(|x| x == l).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn temporal_resolve_runs_after_bloom_composites_into_the_scene() {
    // The resolve consumes the bloomed scene color, so downsample and bloom
    // must be timed before it in every configuration.
    for spots in [0, 1] {
        let ctx = snapshot(spots);
        let plan = FramePlan::new(&ctx, DebugFlags::all(), true);
        let labels = plan.checkpoints();
        let pos = |l: &str| labels.iter().position(|x| *x == l).unwrap();
        assert!(pos("downsample") < pos("bloom"));
        assert!(pos("bloom") < pos("temporal resolve"));
        assert!(pos("temporal resolve") < pos("tone mapping"));
    }
}
