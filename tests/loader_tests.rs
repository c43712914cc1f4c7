//! Staged loading: phase machine ordering, progress reporting and source
//! validation.

use glam::Mat4;
use kiln::renderer::loader::{LoadPhase, PendingLoad};
use kiln::{KilnError, MaterialSource, MeshSource, SceneSource, TextureSource, Vertex};

fn quad() -> MeshSource {
    let v = |x: f32, y: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        uv: [x, y],
    };
    MeshSource {
        vertices: vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
        indices: vec![0, 1, 2, 0, 2, 3],
        material: 0,
        transform: Mat4::IDENTITY,
    }
}

fn scene() -> SceneSource {
    SceneSource {
        meshes: vec![quad()],
        materials: vec![MaterialSource::default()],
        textures: vec![],
    }
}

#[test]
fn phases_run_containers_before_textures_before_pipelines() {
    let order = [
        LoadPhase::Start,
        LoadPhase::Containers,
        LoadPhase::Textures,
        LoadPhase::DepthPass,
        LoadPhase::LitPass,
        LoadPhase::BoundingBoxPass,
        LoadPhase::Flush,
        LoadPhase::Done,
    ];
    let mut phase = LoadPhase::Start;
    for expected in order {
        assert_eq!(phase, expected);
        phase = phase.next();
    }
    assert_eq!(phase, LoadPhase::Done);
}

#[test]
fn progress_reaches_one_exactly_at_done() {
    assert!(LoadPhase::Flush.progress() < 1.0);
    assert!((LoadPhase::Done.progress() - 1.0).abs() < f32::EPSILON);
    assert!(LoadPhase::Start.progress().abs() < f32::EPSILON);
}

#[test]
fn valid_scene_starts_a_load_at_phase_start() {
    let pending = PendingLoad::new(scene()).unwrap();
    assert_eq!(pending.phase, LoadPhase::Start);
    assert!(pending.progress().abs() < f32::EPSILON);
}

#[test]
fn empty_scene_never_starts_loading() {
    match PendingLoad::new(SceneSource::default()) {
        Err(KilnError::SceneInvalid(msg)) => assert!(msg.contains("no meshes")),
        Err(other) => panic!("expected SceneInvalid, got {other}"),
        Ok(_) => panic!("expected SceneInvalid, got a pending load"),
    }
}

#[test]
fn out_of_range_index_is_reported_with_the_mesh() {
    let mut bad = scene();
    bad.meshes[0].indices[2] = 99;
    match PendingLoad::new(bad) {
        Err(KilnError::SceneInvalid(msg)) => {
            assert!(msg.contains("mesh 0"));
            assert!(msg.contains("99"));
        }
        Err(other) => panic!("expected SceneInvalid, got {other}"),
        Ok(_) => panic!("expected SceneInvalid, got a pending load"),
    }
}

#[test]
fn texture_size_mismatch_is_rejected() {
    let mut bad = scene();
    bad.materials[0].base_color_texture = Some(0);
    bad.textures.push(TextureSource {
        width: 4,
        height: 4,
        rgba8: vec![0; 4 * 4 * 3],
    });
    assert!(matches!(
        PendingLoad::new(bad),
        Err(KilnError::SceneInvalid(_))
    ));
}
