//! The frame orchestrator and its builder.

use crate::backend::RenderBackend;
use crate::binding::{FrameData, ParameterBindingRegistry, PassKey};
use crate::camera::Camera;
use crate::config::{DebugToggles, ProbeConfig, RendererConfig};
use crate::culling::{Culling, FrustumCulling};
use crate::error::Result;
use crate::passes::gbuffer::{GeometryPrepass, prepass_binding};
use crate::passes::illumination::{IlluminationComposer, forward_lighting_binding};
use crate::passes::probe::{CubeFace, LightProbeManager};
use crate::passes::shadow::{CascadedShadowPipeline, cascade_binding};
use crate::passes::{PassContext, with_debug_group};
use crate::render_graph::{
    FramePass, FrameOutputs, FrameReport, FrameTrace, NodeContext, PassOutcome, RenderNode,
    Skybox,
};
use crate::scene::{RenderableObject, Scene};

/// Builder for a [`FrameOrchestrator`].
///
/// Collaborators are optional; an empty slot still appears in the frame
/// trace as a completed stage with no draws.
///
/// ```ignore
/// let mut orchestrator = FrameOrchestrator::builder(config)
///     .size(1920, 1080)
///     .skybox(sky)
///     .post_processing(tonemap)
///     .build(&mut backend, &mut scene)?;
///
/// loop {
///     let report = orchestrator.render_frame(&mut backend, &scene, &camera)?;
/// }
/// ```
pub struct FrameOrchestratorBuilder {
    config: RendererConfig,
    width: u32,
    height: u32,
    skybox: Option<Box<dyn Skybox>>,
    culling: Box<dyn Culling>,
    debug_overlay: Option<Box<dyn RenderNode>>,
    volumetrics: Option<Box<dyn RenderNode>>,
    post_processing: Option<Box<dyn RenderNode>>,
    ui_overlay: Option<Box<dyn RenderNode>>,
}

impl FrameOrchestratorBuilder {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            width: 1280,
            height: 720,
            skybox: None,
            culling: Box::new(FrustumCulling),
            debug_overlay: None,
            volumetrics: None,
            post_processing: None,
            ui_overlay: None,
        }
    }

    /// Size of the G-buffer and main color target.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn skybox<S: Skybox + 'static>(mut self, skybox: S) -> Self {
        self.skybox = Some(Box::new(skybox));
        self
    }

    pub fn culling<C: Culling + 'static>(mut self, culling: C) -> Self {
        self.culling = Box::new(culling);
        self
    }

    pub fn debug_overlay<N: RenderNode + 'static>(mut self, node: N) -> Self {
        self.debug_overlay = Some(Box::new(node));
        self
    }

    pub fn volumetrics<N: RenderNode + 'static>(mut self, node: N) -> Self {
        self.volumetrics = Some(Box::new(node));
        self
    }

    pub fn post_processing<N: RenderNode + 'static>(mut self, node: N) -> Self {
        self.post_processing = Some(Box::new(node));
        self
    }

    pub fn ui_overlay<N: RenderNode + 'static>(mut self, node: N) -> Self {
        self.ui_overlay = Some(Box::new(node));
        self
    }

    /// Validates the level against the configuration, allocates every
    /// target and registers the level-lifetime bindings.
    ///
    /// Any error here is fatal for the level.
    pub fn build(
        self,
        backend: &mut dyn RenderBackend,
        scene: &mut Scene,
    ) -> Result<FrameOrchestrator> {
        self.config.validate()?;

        let probe_configs: &[ProbeConfig] = if scene.features().light_probes {
            self.config.probes.as_slice()
        } else {
            &[]
        };
        validate_scene(scene, &self.config, !probe_configs.is_empty())?;

        let prepass = GeometryPrepass::new(backend, self.width, self.height)?;
        let shadows = CascadedShadowPipeline::new(backend, &self.config.shadows)?;
        let probes = LightProbeManager::new(
            backend,
            probe_configs,
            self.config.probe_near,
            self.config.probe_far,
        )?;
        let composer = IlluminationComposer::new(backend, self.width, self.height)?;
        shadows.watch_light(scene.light_mut());

        let outputs = FrameOutputs {
            color: composer.color_target(),
            gbuffer: *prepass.targets(),
            global_illumination: composer.gi_target(),
            shadow_maps: shadows.cascades().iter().map(|c| c.depth.view()).collect(),
        };

        let mut orchestrator = FrameOrchestrator {
            config: self.config,
            registry: ParameterBindingRegistry::new(),
            prepass,
            shadows,
            probes,
            composer,
            outputs,
            skybox: self.skybox,
            culling: self.culling,
            debug_overlay: self.debug_overlay,
            volumetrics: self.volumetrics,
            post_processing: self.post_processing,
            ui_overlay: self.ui_overlay,
            size: (self.width, self.height),
            bound_objects: 0,
            frame_index: 0,
        };
        let bindings = orchestrator.register_level_bindings(scene);
        log::info!(
            "frame orchestrator ready: {} objects, {} level bindings, {} probes",
            scene.len(),
            bindings,
            orchestrator.probes.len()
        );
        Ok(orchestrator)
    }
}

/// Passes `object` must have a material for under `config`.
pub fn required_passes(
    object: &RenderableObject,
    config: &RendererConfig,
    probes_enabled: bool,
) -> Vec<PassKey> {
    let mut passes = Vec::new();
    if object.forward_shading {
        passes.push(PassKey::forward_lighting());
    } else {
        passes.push(PassKey::deferred_prepass());
    }
    if object.casts_shadows {
        passes.extend((0..config.shadows.cascade_count).map(PassKey::shadow_cascade));
    }
    if object.in_light_probe && probes_enabled {
        passes.extend(CubeFace::ALL.map(|f| PassKey::probe_face(f.index())));
    }
    passes
}

/// Checks every object carries a material for every pass it takes part in.
///
/// A missing pass is an error naming the object and pass. Materials for
/// passes the configuration never runs are only logged.
pub fn validate_scene(scene: &Scene, config: &RendererConfig, probes_enabled: bool) -> Result<()> {
    scene
        .iter()
        .try_for_each(|object| validate_object(object, config, probes_enabled))
}

fn validate_object(
    object: &RenderableObject,
    config: &RendererConfig,
    probes_enabled: bool,
) -> Result<()> {
    let required = required_passes(object, config, probes_enabled);
    for pass in &required {
        object.require_material(pass)?;
    }
    for (pass, _) in object.materials() {
        if !required.contains(pass) {
            log::warn!(
                "object '{}' has a material for unused pass '{}'",
                object.name(),
                pass
            );
        }
    }
    Ok(())
}

/// Runs the fixed frame sequence against a scene.
///
/// ```text
/// GeometryPrepass → ShadowCascades → ProbeBake? → GlobalIllumination
///   → LocalIllumination → DebugOverlay? → SunSky → Volumetrics
///   → PostProcessing → UiOverlay
/// ```
///
/// `ProbeBake` runs only while a probe is uncomputed, `DebugOverlay` only in
/// editor mode. A stage that fails is logged, listed in the
/// [`FrameReport`] and the frame carries on with the next stage.
///
/// An orchestrator is bound to the scene it was built with: its level
/// bindings and light listener live on that scene, so every frame must be
/// rendered from it. Objects added to the scene between frames are validated
/// and bound at the start of the next frame.
pub struct FrameOrchestrator {
    config: RendererConfig,
    registry: ParameterBindingRegistry,
    prepass: GeometryPrepass,
    shadows: CascadedShadowPipeline,
    probes: LightProbeManager,
    composer: IlluminationComposer,
    outputs: FrameOutputs,
    skybox: Option<Box<dyn Skybox>>,
    culling: Box<dyn Culling>,
    debug_overlay: Option<Box<dyn RenderNode>>,
    volumetrics: Option<Box<dyn RenderNode>>,
    post_processing: Option<Box<dyn RenderNode>>,
    ui_overlay: Option<Box<dyn RenderNode>>,
    size: (u32, u32),
    bound_objects: usize,
    frame_index: u64,
}

impl FrameOrchestrator {
    pub fn builder(config: RendererConfig) -> FrameOrchestratorBuilder {
        FrameOrchestratorBuilder::new(config)
    }

    /// Registers the prepass, shadow and forward-lighting bindings of every
    /// object for the lifetime of the level. Returns how many were added.
    ///
    /// Only passes the object has a material for are bound.
    pub fn register_level_bindings(&mut self, scene: &Scene) -> usize {
        let count: usize = scene
            .iter()
            .map(|object| self.register_object_bindings(object))
            .sum();
        self.bound_objects = scene.len();
        count
    }

    fn register_object_bindings(&mut self, object: &RenderableObject) -> usize {
        let id = object.id();
        let mut count = 0;
        let prepass = PassKey::deferred_prepass();
        if object.material(&prepass).is_some() {
            self.registry.register(id, prepass, prepass_binding);
            count += 1;
        }
        for cascade in 0..self.shadows.cascade_count() {
            let pass = PassKey::shadow_cascade(cascade);
            if object.material(&pass).is_some() {
                self.registry.register(id, pass, cascade_binding(cascade));
                count += 1;
            }
        }
        let forward = PassKey::forward_lighting();
        if object.material(&forward).is_some() {
            self.registry.register(id, forward, forward_lighting_binding);
            count += 1;
        }
        count
    }

    /// Validates and binds objects added to the scene since the last frame.
    ///
    /// An object missing a material is still bound for the passes it has;
    /// the pass it cannot draw in aborts with a diagnostic.
    fn adopt_new_objects(&mut self, scene: &Scene) -> usize {
        if scene.len() <= self.bound_objects {
            return 0;
        }
        let probes_enabled = !self.probes.is_empty();
        let first = self.bound_objects;
        let mut added = 0;
        for object in scene.iter().filter(|o| o.id().index() >= first) {
            if let Err(e) = validate_object(object, &self.config, probes_enabled) {
                log::error!("object '{}' added mid-level: {}", object.name(), e);
            }
            added += self.register_object_bindings(object);
        }
        log::debug!(
            "bound {} objects added mid-level ({} bindings)",
            scene.len() - first,
            added
        );
        self.bound_objects = scene.len();
        added
    }

    /// Renders one frame and submits it.
    ///
    /// Stage failures do not fail the call; they are reported in the
    /// returned [`FrameReport`]. Only a failing submit is an error.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &Scene,
        camera: &Camera,
    ) -> Result<FrameReport> {
        debug_assert!(
            scene.len() >= self.bound_objects
                && scene.light().has_listener(CascadedShadowPipeline::LISTENER),
            "frame rendered from a scene the orchestrator was not built with"
        );
        self.adopt_new_objects(scene);
        self.frame_index += 1;
        let mut report = FrameReport {
            frame_index: self.frame_index,
            ..Default::default()
        };
        let mut trace = FrameTrace::new();

        let light = scene.light().snapshot();
        report.shadows_recomputed = self.shadows.update(camera, &light);
        let frame = FrameData {
            camera: *camera,
            light,
            shadows: self.shadows.snapshot(),
        };
        let visible = self.culling.cull(scene, camera);
        report.visible_objects = visible.len();
        let policy = self.config.missing_binding_policy();

        // Geometry prepass, shadows.
        {
            let ctx = PassContext {
                scene,
                registry: &self.registry,
                frame: &frame,
                policy,
            };
            let result = self.prepass.render(backend, &ctx, &visible);
            record(&mut trace, &mut report, FramePass::GeometryPrepass, result);

            let result = self.shadows.render(backend, &ctx, &visible);
            record(&mut trace, &mut report, FramePass::ShadowCascades, result);
        }

        // Probe bake.
        if self.probes.all_computed() {
            trace.record(FramePass::ProbeBake, PassOutcome::Skipped);
        } else {
            let result = self.probes.bake_pending(
                backend,
                scene,
                &mut self.registry,
                &frame,
                boxed_skybox(&mut self.skybox),
                policy,
            );
            let result = result.map(|stats| {
                let draws = stats.iter().map(|s| s.draws).sum();
                report.probes_baked = stats;
                draws
            });
            record(&mut trace, &mut report, FramePass::ProbeBake, result);
        }

        // Illumination.
        let result = self
            .composer
            .render_global(
                backend,
                self.prepass.targets(),
                &frame.shadows,
                self.probes.texture_refs(),
            )
            .map(|()| 0);
        record(&mut trace, &mut report, FramePass::GlobalIllumination, result);

        let ctx = PassContext {
            scene,
            registry: &self.registry,
            frame: &frame,
            policy,
        };
        let result = self.composer.render_local(
            backend,
            &ctx,
            self.prepass.targets(),
            boxed_skybox(&mut self.skybox),
            &visible,
        );
        record(&mut trace, &mut report, FramePass::LocalIllumination, result);

        let node_ctx = NodeContext {
            scene,
            frame: &frame,
            outputs: &self.outputs,
            toggles: &self.config.toggles,
            frame_index: self.frame_index,
        };

        if self.config.editor_mode {
            let result = run_node(backend, self.debug_overlay.as_deref_mut(), &node_ctx);
            record(&mut trace, &mut report, FramePass::DebugOverlay, result);
        } else {
            trace.record(FramePass::DebugOverlay, PassOutcome::Skipped);
        }

        let result = match self.skybox.as_deref_mut() {
            Some(sky) => with_debug_group(backend, FramePass::SunSky.label(), |backend| {
                backend.bind_targets(
                    &[self.outputs.color.view()],
                    Some(self.outputs.gbuffer.depth.view()),
                );
                sky.draw_sun(backend, camera, &frame.light).map(|()| 0)
            }),
            None => Ok(0),
        };
        record(&mut trace, &mut report, FramePass::SunSky, result);

        let result = run_node(backend, self.volumetrics.as_deref_mut(), &node_ctx);
        record(&mut trace, &mut report, FramePass::Volumetrics, result);

        let result = run_node(backend, self.post_processing.as_deref_mut(), &node_ctx);
        record(&mut trace, &mut report, FramePass::PostProcessing, result);

        let result = run_node(backend, self.ui_overlay.as_deref_mut(), &node_ctx);
        record(&mut trace, &mut report, FramePass::UiOverlay, result);

        let leaked = self.registry.count_in_namespace(PassKey::PROBE_NAMESPACE);
        if leaked > 0 {
            log::error!("{} light-probe bindings outlived their capture", leaked);
        }
        debug_assert_eq!(leaked, 0, "light-probe bindings outlived their capture");

        report.trace = trace;
        backend.submit()?;
        Ok(report)
    }

    /// The level's start camera, matched to the output size and the
    /// configured far plane.
    pub fn main_camera(&self, scene: &Scene) -> Camera {
        let (width, height) = self.size;
        let mut camera = scene.start_camera();
        camera.aspect = width as f32 / height.max(1) as f32;
        camera.far = self.config.camera_far;
        camera
    }

    /// Checks `scene` against this orchestrator's configuration.
    pub fn validate_scene(&self, scene: &Scene) -> Result<()> {
        validate_scene(scene, &self.config, !self.probes.is_empty())
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn toggles_mut(&mut self) -> &mut DebugToggles {
        &mut self.config.toggles
    }

    pub fn registry(&self) -> &ParameterBindingRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParameterBindingRegistry {
        &mut self.registry
    }

    pub fn prepass(&self) -> &GeometryPrepass {
        &self.prepass
    }

    pub fn shadows(&self) -> &CascadedShadowPipeline {
        &self.shadows
    }

    pub fn probes(&self) -> &LightProbeManager {
        &self.probes
    }

    pub fn composer(&self) -> &IlluminationComposer {
        &self.composer
    }

    pub fn outputs(&self) -> &FrameOutputs {
        &self.outputs
    }

    /// Frames rendered so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

fn boxed_skybox(skybox: &mut Option<Box<dyn Skybox>>) -> Option<&mut dyn Skybox> {
    match skybox {
        Some(sky) => Some(sky.as_mut()),
        None => None,
    }
}

fn run_node(
    backend: &mut dyn RenderBackend,
    node: Option<&mut (dyn RenderNode + 'static)>,
    ctx: &NodeContext<'_>,
) -> Result<usize> {
    match node {
        Some(node) => {
            let label = node.label().to_owned();
            with_debug_group(backend, &label, |backend| node.execute(backend, ctx))
        }
        None => Ok(0),
    }
}

fn record(
    trace: &mut FrameTrace,
    report: &mut FrameReport,
    pass: FramePass,
    result: Result<usize>,
) {
    match result {
        Ok(draws) => {
            log::trace!("{} completed with {} draws", pass, draws);
            trace.record(pass, PassOutcome::Completed { draws });
        }
        Err(e) => {
            log::error!("{} aborted: {}", pass, e);
            let message = e.to_string();
            trace.record(pass, PassOutcome::Aborted(message.clone()));
            report.aborted.push((pass, message));
        }
    }
}

impl std::fmt::Debug for FrameOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOrchestrator")
            .field("frame_index", &self.frame_index)
            .field("registry", &self.registry)
            .field("cascades", &self.shadows.cascade_count())
            .field("probes", &self.probes.len())
            .field("editor_mode", &self.config.editor_mode)
            .finish()
    }
}
