//! Extension points for stages whose internals live outside the core.

use crate::backend::{RenderBackend, TargetId, TargetView};
use crate::binding::FrameData;
use crate::camera::Camera;
use crate::config::DebugToggles;
use crate::error::Result;
use crate::passes::gbuffer::GBufferTargets;
use crate::scene::{LightSnapshot, Scene};

/// Targets produced by the built-in stages, readable by external nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutputs {
    /// Main color target. External nodes render on top of it.
    pub color: TargetId,
    pub gbuffer: GBufferTargets,
    pub global_illumination: TargetId,
    pub shadow_maps: Vec<TargetView>,
}

/// Everything a node may read while it executes.
pub struct NodeContext<'a> {
    pub scene: &'a Scene,
    pub frame: &'a FrameData,
    pub outputs: &'a FrameOutputs,
    pub toggles: &'a DebugToggles,
    pub frame_index: u64,
}

/// A stage plugged into one of the orchestrator's fixed slots
/// (debug overlay, volumetrics, post-processing, UI overlay).
///
/// Nodes bind their own targets. They cannot change where in the frame they
/// run; the slot decides that.
///
/// ```ignore
/// struct Fog { density: f32 }
///
/// impl RenderNode for Fog {
///     fn label(&self) -> &str { "fog" }
///
///     fn execute(&mut self, backend: &mut dyn RenderBackend, ctx: &NodeContext<'_>) -> Result<usize> {
///         backend.bind_targets(&[ctx.outputs.color.view()], None);
///         // ... fullscreen draw reading ctx.outputs.gbuffer.depth
///         Ok(0)
///     }
/// }
/// ```
pub trait RenderNode {
    fn label(&self) -> &str;

    /// Records the node's work. Returns the number of mesh draws issued.
    fn execute(&mut self, backend: &mut dyn RenderBackend, ctx: &NodeContext<'_>)
    -> Result<usize>;
}

/// Sky rendering supplied by the environment system.
pub trait Skybox {
    /// Follows `camera` before drawing from it.
    fn update(&mut self, camera: &Camera);

    /// Draws the sky background into the bound targets.
    fn draw(&mut self, backend: &mut dyn RenderBackend, camera: &Camera) -> Result<()>;

    /// Draws the sun disc for the light's current direction.
    fn draw_sun(
        &mut self,
        backend: &mut dyn RenderBackend,
        camera: &Camera,
        light: &LightSnapshot,
    ) -> Result<()>;
}
