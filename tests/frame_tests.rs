//! Frame Orchestration Tests
//!
//! Tests for:
//! - Stage order and optional stages
//! - Level initialization checks
//! - Pass failure isolation
//! - End-to-end frames against the recording backend

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec3;

use umbra::params::{ParamValue, TextureRef, names};
use umbra::scene::{LightSnapshot, MaterialHandle, MeshData, RenderableObject, Scene, SceneSettings};
use umbra::{
    Camera, FrameOrchestrator, FramePass, NoCulling, NodeContext, PassKey, PassOutcome,
    ProbeConfig, RecordingBackend, RenderBackend, RenderError, RenderNode, RendererConfig, Skybox,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

fn config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.shadows.cascade_count = 3;
    config.shadows.resolution = 1024;
    config.probes = vec![ProbeConfig {
        position: Vec3::ZERO,
        resolution: 128,
    }];
    config
}

/// A plane with materials for every pass it takes part in.
fn plane() -> RenderableObject {
    let mut plane = RenderableObject::new("Plane")
        .with_mesh(MeshData::new("plane"))
        .with_material(PassKey::deferred_prepass(), MaterialHandle(1))
        .in_light_probe(true);
    for cascade in 0..3 {
        plane.set_material(PassKey::shadow_cascade(cascade), MaterialHandle(2));
    }
    for face in 0..6 {
        plane.set_material(PassKey::probe_face(face), MaterialHandle(3));
    }
    plane
}

fn plane_scene() -> Scene {
    let mut scene = Scene::new(SceneSettings::default());
    scene.add(plane()).unwrap();
    scene
}

fn camera() -> Camera {
    Camera::new()
        .at(0.0, 5.0, 20.0)
        .looking_at(0.0, 0.0, 0.0)
        .with_aspect(WIDTH as f32 / HEIGHT as f32)
}

fn build(
    backend: &mut RecordingBackend,
    scene: &mut Scene,
    config: RendererConfig,
) -> FrameOrchestrator {
    FrameOrchestrator::builder(config)
        .size(WIDTH, HEIGHT)
        .build(backend, scene)
        .unwrap()
}

/// Node that logs its label when it runs.
struct LogNode {
    label: &'static str,
    log: Rc<RefCell<Vec<&'static str>>>,
    fail: bool,
}

impl LogNode {
    fn new(label: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Self {
        Self {
            label,
            log: log.clone(),
            fail: false,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl RenderNode for LogNode {
    fn label(&self) -> &str {
        self.label
    }

    fn execute(
        &mut self,
        _backend: &mut dyn RenderBackend,
        _ctx: &NodeContext<'_>,
    ) -> umbra::Result<usize> {
        self.log.borrow_mut().push(self.label);
        if self.fail {
            return Err(RenderError::ResourceCreation(format!("{} lost its target", self.label)));
        }
        Ok(0)
    }
}

/// Sky whose draw fails once, on the given call.
struct FlakySky {
    fail_at: Rc<Cell<Option<usize>>>,
    draws: usize,
}

impl FlakySky {
    fn new(fail_at: &Rc<Cell<Option<usize>>>) -> Self {
        Self {
            fail_at: fail_at.clone(),
            draws: 0,
        }
    }
}

impl Skybox for FlakySky {
    fn update(&mut self, _camera: &Camera) {}

    fn draw(&mut self, _backend: &mut dyn RenderBackend, _camera: &Camera) -> umbra::Result<()> {
        let call = self.draws;
        self.draws += 1;
        if self.fail_at.get() == Some(call) {
            self.fail_at.set(None);
            return Err(RenderError::ResourceCreation("sky cubemap not resident".into()));
        }
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
// End to end
// ============================================================================

#[test]
fn plane_frame_draws_every_pass_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = build(&mut backend, &mut scene, config());

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();

    assert!(report.is_clean(), "aborted: {:?}", report.aborted);
    assert_eq!(report.visible_objects, 1);
    assert_eq!(backend.draws_for_pass(&PassKey::deferred_prepass()), 1);
    for cascade in 0..3 {
        assert_eq!(backend.draws_for_pass(&PassKey::shadow_cascade(cascade)), 1);
    }
    assert_eq!(backend.draws_in_namespace(PassKey::PROBE_NAMESPACE), 6);
    assert!(orchestrator.probes().probe(0).unwrap().is_computed());
    assert_eq!(
        orchestrator
            .registry()
            .count_in_namespace(PassKey::PROBE_NAMESPACE),
        0
    );

    let local = backend
        .fullscreen_labels()
        .into_iter()
        .filter(|l| *l == "local-illumination")
        .count();
    assert_eq!(local, 1);
    assert_eq!(report.total_draws(), 10);
    assert_eq!(backend.submit_count(), 1);
}

#[test]
fn second_frame_skips_probe_bake() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = build(&mut backend, &mut scene, config());
    let camera = camera();

    let first = orchestrator.render_frame(&mut backend, &scene, &camera).unwrap();
    assert!(first.trace.ran(FramePass::ProbeBake));
    assert_eq!(first.probes_baked.len(), 1);

    let second = orchestrator.render_frame(&mut backend, &scene, &camera).unwrap();
    assert_eq!(
        second.trace.outcome(FramePass::ProbeBake),
        Some(&PassOutcome::Skipped)
    );
    assert!(second.probes_baked.is_empty());
    assert_eq!(backend.draws_in_namespace(PassKey::PROBE_NAMESPACE), 6);
    assert_eq!(second.frame_index, 2);
}

#[test]
fn empty_frame_still_runs_every_required_stage() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = build(&mut backend, &mut scene, config());
    let away = Camera::new()
        .at(0.0, 5.0, 20.0)
        .looking_to(Vec3::Z, Vec3::Y);

    // Bake first so the probe does not contribute draws.
    orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    backend.clear_commands();

    let report = orchestrator.render_frame(&mut backend, &scene, &away).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.visible_objects, 0);
    assert_eq!(report.total_draws(), 0);
    assert_eq!(backend.draws().count(), 0);
    for pass in FramePass::ORDER.iter().filter(|p| !p.is_optional()) {
        assert!(report.trace.ran(*pass), "{pass} did not run");
    }
    assert_eq!(
        backend.fullscreen_labels(),
        vec!["global-illumination", "local-illumination"]
    );
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn stages_run_in_fixed_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut config = config();
    config.editor_mode = true;

    let mut orchestrator = FrameOrchestrator::builder(config)
        .size(WIDTH, HEIGHT)
        .debug_overlay(LogNode::new("debug", &log))
        .volumetrics(LogNode::new("volumetrics", &log))
        .post_processing(LogNode::new("post", &log))
        .ui_overlay(LogNode::new("ui", &log))
        .build(&mut backend, &mut scene)
        .unwrap();

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();

    assert_eq!(report.trace.executed(), FramePass::ORDER.to_vec());
    assert_eq!(*log.borrow(), vec!["debug", "volumetrics", "post", "ui"]);

    let groups = backend.debug_groups();
    let position = |label: &str| groups.iter().position(|g| *g == label).unwrap();
    assert!(position("deferred-prepass") < position("shadow-cascade-0"));
    assert!(position("shadow-cascade-2") < position("forward-probe-0"));
    assert!(position("forward-probe-5") < position("global-illumination"));
    assert!(position("global-illumination") < position("local-illumination"));
    assert!(position("local-illumination") < position("debug"));
    assert!(position("post") < position("ui"));
}

#[test]
fn debug_overlay_only_runs_in_editor_mode() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();

    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .debug_overlay(LogNode::new("debug", &log))
        .build(&mut backend, &mut scene)
        .unwrap();

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();
    assert_eq!(
        report.trace.outcome(FramePass::DebugOverlay),
        Some(&PassOutcome::Skipped)
    );
    assert!(log.borrow().is_empty());
}

// ============================================================================
// Initialization
// ============================================================================

#[test]
fn missing_material_fails_the_build() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = Scene::new(SceneSettings::default());
    scene
        .add(
            RenderableObject::new("Crate")
                .with_mesh(MeshData::new("crate"))
                .with_material(PassKey::deferred_prepass(), MaterialHandle(1))
                .with_material(PassKey::shadow_cascade(0), MaterialHandle(2))
                .with_material(PassKey::shadow_cascade(1), MaterialHandle(2)),
        )
        .unwrap();

    let err = FrameOrchestrator::builder(config())
        .build(&mut backend, &mut scene)
        .unwrap_err();
    match err {
        RenderError::MissingPassMaterial { object, pass } => {
            assert_eq!(object, "Crate");
            assert_eq!(pass, PassKey::shadow_cascade(2));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn probe_materials_are_not_required_when_probes_are_disabled() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut settings = SceneSettings::default();
    settings.features.light_probes = false;
    let mut scene = Scene::new(settings);
    let mut rock = RenderableObject::new("Rock")
        .with_mesh(MeshData::new("rock"))
        .with_material(PassKey::deferred_prepass(), MaterialHandle(1))
        .in_light_probe(true);
    for cascade in 0..3 {
        rock.set_material(PassKey::shadow_cascade(cascade), MaterialHandle(2));
    }
    scene.add(rock).unwrap();

    let mut orchestrator = build(&mut backend, &mut scene, config());
    assert!(orchestrator.probes().is_empty());

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();
    assert!(report.is_clean());
    assert!(!report.trace.ran(FramePass::ProbeBake));
}

#[test]
fn oversized_shadow_maps_fail_the_build() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT).with_max_target_size(2048);
    let mut scene = plane_scene();
    let mut config = config();
    config.shadows.resolution = 4096;

    let err = FrameOrchestrator::builder(config)
        .build(&mut backend, &mut scene)
        .unwrap_err();
    assert!(matches!(err, RenderError::ResourceCreation(_)));
    assert!(err.is_fatal());
}

#[test]
fn invalid_config_fails_the_build() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut config = config();
    config.shadows.cascade_count = 0;

    let err = FrameOrchestrator::builder(config)
        .build(&mut backend, &mut scene)
        .unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)));
}

#[test]
fn build_registers_level_bindings_for_bound_passes() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let orchestrator = build(&mut backend, &mut scene, config());
    let plane = scene.id_of("Plane").unwrap();

    let registry = orchestrator.registry();
    assert!(registry.contains(plane, &PassKey::deferred_prepass()));
    for cascade in 0..3 {
        assert!(registry.contains(plane, &PassKey::shadow_cascade(cascade)));
    }
    assert!(!registry.contains(plane, &PassKey::forward_lighting()));
    assert_eq!(registry.len(), 4);
    assert_eq!(scene.light().listener_count(), 1);
}

#[test]
fn main_camera_uses_configured_far_plane() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut config = config();
    config.camera_far = 750.0;
    let orchestrator = build(&mut backend, &mut scene, config);

    let camera = orchestrator.main_camera(&scene);
    assert_eq!(camera.far, 750.0);
    assert_eq!(camera.aspect, WIDTH as f32 / HEIGHT as f32);
    assert_eq!(camera.position, scene.settings().camera_position);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn missing_binding_aborts_only_its_stage() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .ui_overlay(LogNode::new("ui", &log))
        .build(&mut backend, &mut scene)
        .unwrap();
    orchestrator
        .registry_mut()
        .unregister_all(&PassKey::deferred_prepass());

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();

    assert_eq!(report.aborted.len(), 1);
    assert_eq!(report.aborted[0].0, FramePass::GeometryPrepass);
    assert!(matches!(
        report.trace.outcome(FramePass::GeometryPrepass),
        Some(PassOutcome::Aborted(_))
    ));
    assert_eq!(report.trace.draws(FramePass::ShadowCascades), 3);
    assert!(report.trace.ran(FramePass::LocalIllumination));
    assert_eq!(*log.borrow(), vec!["ui"]);
    assert_eq!(backend.submit_count(), 1);
}

#[test]
fn missing_binding_is_tolerated_when_allowed() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut config = config();
    config.allow_missing_bindings = true;
    let mut orchestrator = build(&mut backend, &mut scene, config);
    orchestrator
        .registry_mut()
        .unregister_all(&PassKey::deferred_prepass());

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.trace.draws(FramePass::GeometryPrepass), 1);
    let draw = backend
        .draws()
        .find(|d| d.pass == PassKey::deferred_prepass())
        .unwrap();
    assert!(draw.params.is_empty());
}

#[test]
fn failing_node_does_not_stop_later_stages() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .volumetrics(LogNode::new("volumetrics", &log).failing())
        .post_processing(LogNode::new("post", &log))
        .build(&mut backend, &mut scene)
        .unwrap();

    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();
    assert_eq!(report.aborted.len(), 1);
    assert_eq!(report.aborted[0].0, FramePass::Volumetrics);
    assert_eq!(*log.borrow(), vec!["volumetrics", "post"]);
}

#[test]
fn failed_probe_bake_is_retried_next_frame() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    // The sky fails on the fourth face, after three faces were redrawn.
    let fail_at = Rc::new(Cell::new(Some(3)));
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .skybox(FlakySky::new(&fail_at))
        .build(&mut backend, &mut scene)
        .unwrap();

    let first = orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert!(matches!(
        first.trace.outcome(FramePass::ProbeBake),
        Some(PassOutcome::Aborted(_))
    ));
    assert_eq!(backend.draws_in_namespace(PassKey::PROBE_NAMESPACE), 3);
    assert!(!orchestrator.probes().all_computed());
    assert_eq!(
        orchestrator
            .registry()
            .count_in_namespace(PassKey::PROBE_NAMESPACE),
        0
    );

    // Global illumination must not sample the half-written probe.
    let gi = backend.fullscreen_params("global-illumination").unwrap();
    assert_eq!(
        gi.get(names::PROBE_TEXTURES),
        Some(&ParamValue::TextureArray(Vec::new()))
    );
    assert!(first.trace.ran(FramePass::GlobalIllumination));

    let second = orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert!(matches!(
        second.trace.outcome(FramePass::ProbeBake),
        Some(PassOutcome::Completed { draws: 6 })
    ));
    assert!(orchestrator.probes().all_computed());

    let color = orchestrator.probes().probe(0).unwrap().color_target();
    let gi = backend.fullscreen_params("global-illumination").unwrap();
    assert_eq!(
        gi.get(names::PROBE_TEXTURES),
        Some(&ParamValue::TextureArray(vec![TextureRef::Target(color.view())]))
    );
}

// ============================================================================
// Scene changes
// ============================================================================

#[test]
fn objects_added_between_frames_get_level_bindings() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .culling(NoCulling)
        .build(&mut backend, &mut scene)
        .unwrap();
    orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();

    let mut rock = RenderableObject::new("Rock")
        .with_mesh(MeshData::new("rock"))
        .with_material(PassKey::deferred_prepass(), MaterialHandle(4));
    for cascade in 0..3 {
        rock.set_material(PassKey::shadow_cascade(cascade), MaterialHandle(2));
    }
    let rock = scene.add(rock).unwrap();
    backend.clear_commands();

    let report = orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert!(report.is_clean(), "aborted: {:?}", report.aborted);
    assert!(
        orchestrator
            .registry()
            .contains(rock, &PassKey::deferred_prepass())
    );
    assert_eq!(orchestrator.registry().len(), 8);
    assert_eq!(report.trace.draws(FramePass::GeometryPrepass), 2);
    assert_eq!(report.trace.draws(FramePass::ShadowCascades), 6);

    // Already bound objects are not bound twice.
    orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert_eq!(orchestrator.registry().len(), 8);
}

#[test]
fn added_object_missing_a_material_aborts_only_its_pass() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .culling(NoCulling)
        .build(&mut backend, &mut scene)
        .unwrap();
    scene
        .add(
            RenderableObject::new("Crate")
                .with_mesh(MeshData::new("crate"))
                .with_material(PassKey::deferred_prepass(), MaterialHandle(1))
                .casts_shadows(false),
        )
        .unwrap();

    let report = orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert!(report.is_clean(), "aborted: {:?}", report.aborted);

    let mut barrel = RenderableObject::new("Barrel")
        .with_mesh(MeshData::new("barrel"))
        .with_material(PassKey::deferred_prepass(), MaterialHandle(1));
    barrel.set_material(PassKey::shadow_cascade(0), MaterialHandle(2));
    scene.add(barrel).unwrap();

    let report = orchestrator.render_frame(&mut backend, &scene, &camera()).unwrap();
    assert_eq!(report.aborted.len(), 1);
    assert_eq!(report.aborted[0].0, FramePass::ShadowCascades);
    assert!(report.trace.ran(FramePass::GeometryPrepass));
    assert_eq!(report.trace.draws(FramePass::GeometryPrepass), 3);
}

// ============================================================================
// Shadow invalidation
// ============================================================================

#[test]
fn shadows_recompute_only_when_light_or_camera_changes() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut orchestrator = FrameOrchestrator::builder(config())
        .size(WIDTH, HEIGHT)
        .culling(NoCulling)
        .build(&mut backend, &mut scene)
        .unwrap();
    let camera = camera();

    let first = orchestrator.render_frame(&mut backend, &scene, &camera).unwrap();
    assert!(first.shadows_recomputed);

    let second = orchestrator.render_frame(&mut backend, &scene, &camera).unwrap();
    assert!(!second.shadows_recomputed);

    scene.light_mut().set_direction(Vec3::new(0.4, -0.8, 0.1));
    let third = orchestrator.render_frame(&mut backend, &scene, &camera).unwrap();
    assert!(third.shadows_recomputed);

    let moved = camera.at(2.0, 5.0, 20.0);
    let fourth = orchestrator.render_frame(&mut backend, &scene, &moved).unwrap();
    assert!(fourth.shadows_recomputed);
    assert_eq!(orchestrator.shadows().recompute_count(), 3);
}

#[test]
fn forward_objects_draw_in_local_illumination() {
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    let mut scene = plane_scene();
    let mut water = RenderableObject::new("Water")
        .with_mesh(MeshData::new("water"))
        .with_material(PassKey::forward_lighting(), MaterialHandle(9))
        .forward_shaded();
    for cascade in 0..3 {
        water.set_material(PassKey::shadow_cascade(cascade), MaterialHandle(2));
    }
    scene.add(water).unwrap();
    let water = scene.id_of("Water").unwrap();

    let mut orchestrator = build(&mut backend, &mut scene, config());
    let report = orchestrator
        .render_frame(&mut backend, &scene, &camera())
        .unwrap();

    assert!(report.is_clean(), "aborted: {:?}", report.aborted);
    assert_eq!(report.trace.draws(FramePass::LocalIllumination), 1);
    assert_eq!(report.trace.draws(FramePass::GeometryPrepass), 1);
    let draw = backend
        .draws()
        .find(|d| d.pass == PassKey::forward_lighting())
        .unwrap();
    assert_eq!(draw.object, water);
    assert!(
        backend
            .draws()
            .filter(|d| d.pass == PassKey::deferred_prepass())
            .all(|d| d.object != water)
    );
}
