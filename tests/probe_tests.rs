//! Light Probe Tests
//!
//! Tests for:
//! - One-shot baking and idempotence
//! - Capture binding lifetime
//! - Capture parameters and level of detail
//! - Cube face seams

use glam::{Vec2, Vec3, Vec4};

use umbra::params::names;
use umbra::passes::probe::cube_lookup;
use umbra::scene::{LightSnapshot, MaterialHandle, MeshData, RenderableObject, Scene, SceneSettings};
use umbra::{
    Camera, CubeFace, FrameData, LightProbe, LightProbeManager, MissingBindingPolicy,
    ParameterBindingRegistry, PassKey, ProbeConfig, ProbeFaceCamera, ProbeState,
    RecordingBackend, RenderBackend, RenderError, ShadowSnapshot, Skybox, Viewport,
};

const PROBE_POSITION: Vec3 = Vec3::new(0.0, 10.0, 35.0);

fn frame() -> FrameData {
    FrameData {
        camera: Camera::default(),
        light: LightSnapshot {
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::new(1.0, 0.9, 0.8),
            ambient: Vec3::splat(0.1),
        },
        shadows: ShadowSnapshot::default(),
    }
}

fn probe_config() -> ProbeConfig {
    ProbeConfig {
        position: PROBE_POSITION,
        resolution: 64,
    }
}

fn captured(name: &str) -> RenderableObject {
    let mut object = RenderableObject::new(name)
        .with_mesh(MeshData::new(name))
        .in_light_probe(true);
    for face in 0..6 {
        object.set_material(PassKey::probe_face(face), MaterialHandle(100 + face as u32));
    }
    object
}

fn probe_scene() -> Scene {
    let mut scene = Scene::new(SceneSettings::default());
    scene.add(captured("Statue").with_lods(3)).unwrap();
    // Not captured and without probe materials: must be ignored by the bake.
    scene
        .add(RenderableObject::new("Tree").with_mesh(MeshData::new("tree")))
        .unwrap();
    scene
}

fn bake(
    probe: &mut LightProbe,
    backend: &mut RecordingBackend,
    scene: &Scene,
    registry: &mut ParameterBindingRegistry,
) -> umbra::Result<umbra::BakeStats> {
    probe.bake(
        backend,
        scene,
        registry,
        &frame(),
        None,
        MissingBindingPolicy::Error,
    )
}

#[derive(Default)]
struct RecordingSky {
    updates: Vec<Camera>,
    draws: usize,
}

impl Skybox for RecordingSky {
    fn update(&mut self, camera: &Camera) {
        self.updates.push(*camera);
    }

    fn draw(&mut self, _backend: &mut dyn RenderBackend, _camera: &Camera) -> umbra::Result<()> {
        self.draws += 1;
        Ok(())
    }

    fn draw_sun(
        &mut self,
        _backend: &mut dyn RenderBackend,
        _camera: &Camera,
        _light: &LightSnapshot,
    ) -> umbra::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Baking
// ============================================================================

#[test]
fn bake_captures_each_face_once() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();

    let stats = bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();

    assert!(!stats.skipped);
    assert_eq!(stats.draws, 6);
    assert_eq!(probe.state(), ProbeState::Computed);
    for face in 0..6 {
        assert_eq!(backend.draws_for_pass(&PassKey::probe_face(face)), 1);
    }
}

#[test]
fn second_bake_is_a_no_op() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();

    bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();
    let draws = backend.draw_count();
    let registrations = registry.registrations();

    let stats = bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();
    assert!(stats.skipped);
    assert_eq!(stats.draws, 0);
    assert_eq!(backend.draw_count(), draws);
    assert_eq!(registry.registrations(), registrations);
}

#[test]
fn capture_bindings_do_not_outlive_the_bake() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let statue = scene.id_of("Statue").unwrap();

    let mut registry = ParameterBindingRegistry::new();
    registry.register(statue, PassKey::deferred_prepass(), |_, _| {});

    let stats = bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();

    assert_eq!(stats.bindings_registered, 6);
    assert_eq!(stats.bindings_removed, stats.bindings_registered);
    assert_eq!(registry.count_in_namespace(PassKey::PROBE_NAMESPACE), 0);
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(statue, &PassKey::deferred_prepass()));
    assert_eq!(registry.registrations() - registry.removals(), 1);
}

#[test]
fn capture_draws_lowest_lod_with_probe_lighting() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();

    bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();

    for face in CubeFace::ALL {
        let pass = PassKey::probe_face(face.index());
        let draw = backend.draws().find(|d| d.pass == pass).unwrap();
        assert_eq!(draw.lod, 2);
        assert_eq!(
            draw.params.mat4(names::VIEW_PROJECTION),
            Some(probe.face_camera(face).view_projection())
        );
        assert_eq!(
            draw.params.vec4(names::CAMERA_POSITION),
            Some(PROBE_POSITION.extend(1.0))
        );
        assert_eq!(
            draw.params.vec4(names::SUN_DIRECTION),
            Some(Vec4::new(0.0, 1.0, 0.0, 0.0))
        );
        assert_eq!(
            draw.params.vec4(names::SUN_COLOR).map(|c| c.w),
            Some(5.0)
        );
    }
}

#[test]
fn capture_uses_the_frames_cascade_distances() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();
    let mut frame = frame();
    frame.shadows = ShadowSnapshot {
        far_distances: vec![12.0, 48.0, 250.0],
        resolution: 2048,
        ..Default::default()
    };

    probe
        .bake(
            &mut backend,
            &scene,
            &mut registry,
            &frame,
            None,
            MissingBindingPolicy::Error,
        )
        .unwrap();

    for face in 0..6 {
        let pass = PassKey::probe_face(face);
        let draw = backend.draws().find(|d| d.pass == pass).unwrap();
        assert_eq!(
            draw.params.vec4(names::SHADOW_CASCADE_DISTANCES),
            Some(Vec4::new(12.0, 48.0, 250.0, 1.0))
        );
        assert_eq!(
            draw.params.vec4(names::SHADOW_TEXEL_SIZE),
            Some(Vec4::new(1.0 / 2048.0, 1.0, 1.0, 1.0))
        );
    }
}

#[test]
fn bake_restores_the_viewport() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();

    bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();
    assert_eq!(backend.viewport(), Viewport::new(1280, 720));
    assert_eq!(
        backend.target(probe.color_target()).map(|t| t.layers),
        Some(6)
    );
}

#[test]
fn skybox_follows_each_face_camera() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();
    let mut sky = RecordingSky::default();

    probe
        .bake(
            &mut backend,
            &scene,
            &mut registry,
            &frame(),
            Some(&mut sky as &mut dyn Skybox),
            MissingBindingPolicy::Error,
        )
        .unwrap();

    assert_eq!(sky.draws, 6);
    let forwards: Vec<Vec3> = sky.updates.iter().map(|c| c.forward).collect();
    let expected: Vec<Vec3> = CubeFace::ALL.iter().map(|f| f.direction()).collect();
    assert_eq!(forwards, expected);
    assert!(sky.updates.iter().all(|c| c.position == PROBE_POSITION));
}

#[test]
fn failed_bake_is_retried_next_time() {
    let mut backend = RecordingBackend::new(1280, 720);
    let mut probe = LightProbe::new(&mut backend, 0, &probe_config(), 0.1, 1000.0).unwrap();
    let mut scene = Scene::new(SceneSettings::default());
    let mut half = RenderableObject::new("Half")
        .with_mesh(MeshData::new("half"))
        .in_light_probe(true);
    for face in 0..3 {
        half.set_material(PassKey::probe_face(face), MaterialHandle(1));
    }
    let id = scene.add(half).unwrap();
    let mut registry = ParameterBindingRegistry::new();

    let err = bake(&mut probe, &mut backend, &scene, &mut registry).unwrap_err();
    match err {
        RenderError::MissingPassMaterial { object, pass } => {
            assert_eq!(object, "Half");
            assert_eq!(pass, PassKey::probe_face(3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(probe.state(), ProbeState::Uncomputed);
    assert_eq!(registry.count_in_namespace(PassKey::PROBE_NAMESPACE), 0);
    assert_eq!(backend.viewport(), Viewport::new(1280, 720));

    let object = scene.get_mut(id).unwrap();
    for face in 3..6 {
        object.set_material(PassKey::probe_face(face), MaterialHandle(1));
    }
    let stats = bake(&mut probe, &mut backend, &scene, &mut registry).unwrap();
    assert_eq!(stats.draws, 6);
    assert!(probe.is_computed());
}

#[test]
fn manager_bakes_only_pending_probes() {
    let mut backend = RecordingBackend::new(1280, 720);
    let configs = [
        probe_config(),
        ProbeConfig {
            position: Vec3::new(-20.0, 5.0, 0.0),
            resolution: 32,
        },
    ];
    let mut manager = LightProbeManager::new(&mut backend, &configs, 0.1, 1000.0).unwrap();
    let scene = probe_scene();
    let mut registry = ParameterBindingRegistry::new();
    assert_eq!(manager.pending_count(), 2);

    let stats = manager
        .bake_pending(
            &mut backend,
            &scene,
            &mut registry,
            &frame(),
            None,
            MissingBindingPolicy::Error,
        )
        .unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[1].probe, 1);
    assert!(manager.all_computed());
    assert_eq!(manager.texture_refs().len(), 2);

    let again = manager
        .bake_pending(
            &mut backend,
            &scene,
            &mut registry,
            &frame(),
            None,
            MissingBindingPolicy::Error,
        )
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(backend.draws_in_namespace(PassKey::PROBE_NAMESPACE), 12);
}

// ============================================================================
// Seams
// ============================================================================

fn rig() -> [ProbeFaceCamera; 6] {
    CubeFace::ALL.map(|face| ProbeFaceCamera::new(PROBE_POSITION, face, 0.1, 100.0))
}

fn on_face(uv: Vec2) -> bool {
    const SLACK: f32 = 1e-3;
    (-SLACK..=1.0 + SLACK).contains(&uv.x) && (-SLACK..=1.0 + SLACK).contains(&uv.y)
}

#[test]
fn every_face_edge_is_shared_with_exactly_one_neighbour() {
    let rig = rig();
    let edges = |t: f32| {
        [
            Vec2::new(t, 0.0),
            Vec2::new(t, 1.0),
            Vec2::new(0.0, t),
            Vec2::new(1.0, t),
        ]
    };

    for camera in &rig {
        for t in [0.2, 0.5, 0.8] {
            for uv in edges(t) {
                let direction = camera.direction_at(uv);
                let neighbours: Vec<_> = rig
                    .iter()
                    .filter(|other| other.face != camera.face)
                    .filter_map(|other| other.project(direction).map(|uv| (other, uv)))
                    .filter(|(_, uv)| on_face(*uv))
                    .collect();

                assert_eq!(
                    neighbours.len(),
                    1,
                    "{:?} edge uv {uv} touches {} faces",
                    camera.face,
                    neighbours.len()
                );
                let (neighbour, shared) = neighbours[0];
                let across = neighbour.direction_at(shared);
                assert!(
                    (across - direction).length() < 1e-3,
                    "{:?} {uv} and {:?} {shared} disagree: {direction} vs {across}",
                    camera.face,
                    neighbour.face
                );
            }
        }
    }
}

#[test]
fn lookup_is_continuous_across_the_x_y_seam() {
    let rig = rig();
    let from = CubeFace::PositiveX.direction();
    let to = CubeFace::PositiveY.direction();

    let mut previous: Option<Vec3> = None;
    for step in 0..=64 {
        let t = step as f32 / 64.0;
        let direction = from.lerp(to, t).normalize() + Vec3::new(0.0, 0.0, 0.15);
        let direction = direction.normalize();

        let (face, uv) = cube_lookup(direction).unwrap();
        let sampled = rig[face.index()].direction_at(uv);
        assert!(
            (sampled - direction).length() < 1e-3,
            "step {step}: {face:?} texel maps to {sampled}, expected {direction}"
        );
        if let Some(previous) = previous {
            assert!((sampled - previous).length() < 0.1, "jump at step {step}");
        }
        previous = Some(sampled);
    }
}
