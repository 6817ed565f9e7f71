//! Light-probe baking.
//!
//! A probe captures the lit scene around a point into a six-layer color
//! target, one layer per cube face. Capture is lazy and one-shot: a probe is
//! baked the first frame it is found uncomputed and never again.
//!
//! # Face cameras
//!
//! Each face is rendered with a 90° square camera looking down one axis.
//! Cubemap faces are addressed in a left-handed frame while the scene is
//! right-handed, so face cameras use a mirrored projection (clip-space X
//! negated) together with fixed per-face up vectors:
//!
//! | face | look | up |
//! |------|------|----|
//! | +X   | +X   | +Y |
//! | −X   | −X   | +Y |
//! | +Y   | +Y   | −Z |
//! | −Y   | −Y   | +Z |
//! | +Z   | +Z   | +Y |
//! | −Z   | −Z   | +Y |
//!
//! With this rig a direction projected through its face camera lands on the
//! same texel a cubemap lookup of that direction samples, so adjacent faces
//! meet without seams.
//!
//! # Capture bindings
//!
//! Capture parameters only exist for the duration of a bake. They are
//! registered through a [`BindingScope`](crate::binding::BindingScope) under
//! the `forward-probe-<face>` keys and removed when the scope ends, whether
//! the bake succeeded or not.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::{PassContext, draw_object, with_debug_group, write_lighting_params, write_mesh_textures};
use crate::backend::{RenderBackend, TargetDesc, TargetFormat, TargetId, Viewport};
use crate::binding::{FrameData, MissingBindingPolicy, ParameterBindingRegistry, PassKey};
use crate::camera::Camera;
use crate::config::ProbeConfig;
use crate::error::{RenderError, Result};
use crate::params::{TextureRef, names};
use crate::render_graph::Skybox;
use crate::scene::{RenderableObject, Scene};

/// One face of a cube map, in layer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::NEG_Z,
            CubeFace::NegativeY => Vec3::Z,
            _ => Vec3::Y,
        }
    }
}

/// Face and texture coordinate a cube map lookup of `direction` samples.
///
/// Follows the conventional major-axis selection; `uv` has its origin at the
/// top-left of the face. Returns `None` for a zero vector.
pub fn cube_lookup(direction: Vec3) -> Option<(CubeFace, Vec2)> {
    let a = direction.abs();
    if a.max_element() <= 0.0 {
        return None;
    }
    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if direction.x > 0.0 {
            (CubeFace::PositiveX, -direction.z, -direction.y, a.x)
        } else {
            (CubeFace::NegativeX, direction.z, -direction.y, a.x)
        }
    } else if a.y >= a.z {
        if direction.y > 0.0 {
            (CubeFace::PositiveY, direction.x, direction.z, a.y)
        } else {
            (CubeFace::NegativeY, direction.x, -direction.z, a.y)
        }
    } else if direction.z > 0.0 {
        (CubeFace::PositiveZ, direction.x, -direction.y, a.z)
    } else {
        (CubeFace::NegativeZ, -direction.x, -direction.y, a.z)
    };
    let uv = Vec2::new((sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5);
    Some((face, uv))
}

/// The camera that renders one cube face of a probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeFaceCamera {
    pub face: CubeFace,
    camera: Camera,
}

impl ProbeFaceCamera {
    pub fn new(position: Vec3, face: CubeFace, near: f32, far: f32) -> Self {
        let camera = Camera {
            position,
            forward: face.direction(),
            up: face.up(),
            fov: std::f32::consts::FRAC_PI_2,
            aspect: 1.0,
            near,
            far,
            mirrored: true,
        };
        Self { face, camera }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn view_projection(&self) -> Mat4 {
        self.camera.view_projection()
    }

    /// Face uv a world-space direction projects to, or `None` if it points
    /// away from this face.
    pub fn project(&self, direction: Vec3) -> Option<Vec2> {
        let clip = self.camera.view_projection() * direction.extend(0.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate().truncate() / clip.w;
        Some(Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5))
    }

    /// World-space direction through face coordinate `uv`.
    pub fn direction_at(&self, uv: Vec2) -> Vec3 {
        let ndc = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 1.0, 1.0);
        let world = self.camera.view_projection().inverse() * ndc;
        ((world.truncate() / world.w) - self.camera.position).normalize_or_zero()
    }
}

/// Bake state of a probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeState {
    #[default]
    Uncomputed,
    InProgress,
    Computed,
}

/// Counters describing one call to [`LightProbe::bake`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BakeStats {
    pub probe: usize,
    pub draws: usize,
    pub bindings_registered: usize,
    pub bindings_removed: usize,
    /// The probe was already computed and nothing was drawn.
    pub skipped: bool,
}

/// A single cube-map light probe.
#[derive(Debug)]
pub struct LightProbe {
    index: usize,
    position: Vec3,
    resolution: u32,
    faces: [ProbeFaceCamera; 6],
    depth: [TargetId; 6],
    color: TargetId,
    pub(crate) state: ProbeState,
}

impl LightProbe {
    /// Allocates the probe's six depth targets and six-layer color target.
    pub fn new(
        backend: &mut dyn RenderBackend,
        index: usize,
        config: &ProbeConfig,
        near: f32,
        far: f32,
    ) -> Result<Self> {
        let position = config.position;
        let resolution = config.resolution;
        let faces = CubeFace::ALL.map(|face| ProbeFaceCamera::new(position, face, near, far));

        let mut depth = [TargetId::new(0); 6];
        for (face, target) in depth.iter_mut().enumerate() {
            *target = backend.create_target(&TargetDesc::square(
                format!("probe-{index}-depth-{face}"),
                resolution,
                TargetFormat::Depth,
            ))?;
        }
        let color = backend.create_target(
            &TargetDesc::square(
                format!("probe-{index}-color"),
                resolution,
                TargetFormat::Rgba16Float,
            )
            .with_layers(6),
        )?;

        Ok(Self {
            index,
            position,
            resolution,
            faces,
            depth,
            color,
            state: ProbeState::Uncomputed,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn is_computed(&self) -> bool {
        self.state == ProbeState::Computed
    }

    pub fn face_camera(&self, face: CubeFace) -> &ProbeFaceCamera {
        &self.faces[face.index()]
    }

    pub fn face_cameras(&self) -> &[ProbeFaceCamera; 6] {
        &self.faces
    }

    pub fn depth_target(&self, face: CubeFace) -> TargetId {
        self.depth[face.index()]
    }

    pub fn color_target(&self) -> TargetId {
        self.color
    }

    /// Captures the probe if it has not been computed yet.
    ///
    /// A computed probe returns immediately with `skipped` set and zero
    /// draws. A bake requested while one is running fails with
    /// [`RenderError::ProbeBakeInProgress`]. A failed bake leaves the probe
    /// uncomputed so the next frame tries again.
    pub fn bake(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &Scene,
        registry: &mut ParameterBindingRegistry,
        frame: &FrameData,
        skybox: Option<&mut dyn Skybox>,
        policy: MissingBindingPolicy,
    ) -> Result<BakeStats> {
        match self.state {
            ProbeState::Computed => {
                return Ok(BakeStats {
                    probe: self.index,
                    skipped: true,
                    ..Default::default()
                });
            }
            ProbeState::InProgress => {
                return Err(RenderError::ProbeBakeInProgress { probe: self.index });
            }
            ProbeState::Uncomputed => {}
        }

        self.state = ProbeState::InProgress;
        let result = self.capture(backend, scene, registry, frame, skybox, policy);
        self.state = match result {
            Ok(_) => ProbeState::Computed,
            Err(_) => ProbeState::Uncomputed,
        };

        match &result {
            Ok(stats) => log::info!(
                "baked light probe {} at {} ({} draws)",
                self.index,
                self.position,
                stats.draws
            ),
            Err(e) => log::error!("light probe {} bake failed: {}", self.index, e),
        }
        result
    }

    fn capture(
        &self,
        backend: &mut dyn RenderBackend,
        scene: &Scene,
        registry: &mut ParameterBindingRegistry,
        frame: &FrameData,
        mut skybox: Option<&mut dyn Skybox>,
        policy: MissingBindingPolicy,
    ) -> Result<BakeStats> {
        let captured: Vec<&RenderableObject> =
            scene.iter().filter(|o| o.in_light_probe).collect();

        // 1. Capture bindings, one per face and captured object. Shadow
        // inputs, cascade distances included, are the main camera's: they
        // describe the maps rendered this frame.
        let mut scope = registry.scope();
        let eye = self.position;
        for face in &self.faces {
            let pass = PassKey::probe_face(face.face.index());
            let face_vp = face.view_projection();
            for object in &captured {
                scope.register(object.id(), pass.clone(), move |ctx, params| {
                    params
                        .set_mat4(names::VIEW_PROJECTION, face_vp)
                        .set_mat4(names::WORLD, ctx.object.world_matrix());
                    write_lighting_params(params, ctx.frame, eye);
                    if let Some(mesh) = ctx.object.meshes().get(ctx.mesh_index) {
                        write_mesh_textures(params, &mesh.textures);
                    }
                });
            }
        }
        let registered = scope.registered();

        // 2. Viewport to probe resolution.
        let saved = backend.viewport();
        backend.set_viewport(Viewport::square(self.resolution));

        // 3. Faces.
        let ctx = PassContext {
            scene,
            registry: &*scope,
            frame,
            policy,
        };
        let mut drawn = Ok(0);
        for face in &self.faces {
            let pass = PassKey::probe_face(face.face.index());
            let layer = face.face.index();
            let result = with_debug_group(backend, pass.as_str(), |backend| {
                backend.bind_targets(
                    &[self.color.layer(layer as u32)],
                    Some(self.depth[layer].view()),
                );
                backend.set_viewport(Viewport::square(self.resolution));
                backend.clear_color(Vec4::ZERO);
                backend.clear_depth(1.0);

                if let Some(sky) = skybox.as_deref_mut() {
                    sky.update(face.camera());
                    sky.draw(backend, face.camera())?;
                }

                let mut draws = 0;
                for object in &captured {
                    draws += draw_object(backend, &ctx, object, &pass, object.lowest_lod())?;
                }
                Ok(draws)
            });
            match result {
                Ok(draws) => drawn = drawn.map(|total| total + draws),
                Err(e) => {
                    drawn = Err(e);
                    break;
                }
            }
        }

        // 4. Restore viewport.
        backend.set_viewport(saved);

        // 5. Tear down capture bindings.
        let removed = scope.close();

        // 6. Caller marks the probe computed.
        Ok(BakeStats {
            probe: self.index,
            draws: drawn?,
            bindings_registered: registered,
            bindings_removed: removed,
            skipped: false,
        })
    }
}

/// Owns every probe of the level.
#[derive(Debug, Default)]
pub struct LightProbeManager {
    probes: Vec<LightProbe>,
}

impl LightProbeManager {
    pub fn new(
        backend: &mut dyn RenderBackend,
        configs: &[ProbeConfig],
        near: f32,
        far: f32,
    ) -> Result<Self> {
        let probes = configs
            .iter()
            .enumerate()
            .map(|(i, config)| LightProbe::new(backend, i, config, near, far))
            .collect::<Result<Vec<_>>>()?;
        if !probes.is_empty() {
            log::info!("{} light probe(s) pending bake", probes.len());
        }
        Ok(Self { probes })
    }

    pub fn probes(&self) -> &[LightProbe] {
        &self.probes
    }

    pub fn probe(&self, index: usize) -> Option<&LightProbe> {
        self.probes.get(index)
    }

    pub fn probe_mut(&mut self, index: usize) -> Option<&mut LightProbe> {
        self.probes.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn all_computed(&self) -> bool {
        self.probes.iter().all(LightProbe::is_computed)
    }

    pub fn pending_count(&self) -> usize {
        self.probes.iter().filter(|p| !p.is_computed()).count()
    }

    /// Color targets of the computed probes as shader inputs, in probe order.
    ///
    /// A probe whose bake failed part way holds partly cleared faces and is
    /// left out until a bake completes.
    pub fn texture_refs(&self) -> Vec<TextureRef> {
        self.probes
            .iter()
            .filter(|p| p.is_computed())
            .map(|p| TextureRef::Target(p.color.view()))
            .collect()
    }

    /// Bakes every uncomputed probe. Stops at the first failure; the
    /// remaining probes stay pending.
    pub fn bake_pending(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &Scene,
        registry: &mut ParameterBindingRegistry,
        frame: &FrameData,
        mut skybox: Option<&mut dyn Skybox>,
        policy: MissingBindingPolicy,
    ) -> Result<Vec<BakeStats>> {
        let mut stats = Vec::new();
        for probe in self.probes.iter_mut().filter(|p| !p.is_computed()) {
            let sky: Option<&mut dyn Skybox> = match skybox.as_mut() {
                Some(sky) => Some(&mut **sky),
                None => None,
            };
            stats.push(probe.bake(backend, scene, registry, frame, sky, policy)?);
        }
        Ok(stats)
    }
}
