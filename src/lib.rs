//! # Umbra
//!
//! **Frame orchestration core for a deferred renderer.**
//!
//! Umbra sequences the GPU passes of a frame against a scene: geometry
//! prepass, cascaded shadow maps, one-shot light-probe capture, global and
//! local illumination, then the external sky, volumetrics, post-processing
//! and UI stages. Per-object shader inputs are supplied through a
//! [`ParameterBindingRegistry`] keyed by object and pass.
//!
//! ## Quick Start
//!
//! ```no_run
//! use umbra::*;
//! use umbra::scene::{MaterialHandle, MeshData, RenderableObject, Scene, SceneSettings};
//!
//! fn main() -> umbra::Result<()> {
//!     let config = RendererConfig::from_path("renderer.json")?;
//!
//!     let mut scene = Scene::new(SceneSettings::default());
//!     let mut plane = RenderableObject::new("Plane")
//!         .with_mesh(MeshData::new("plane"))
//!         .with_material(PassKey::deferred_prepass(), MaterialHandle(1));
//!     for cascade in 0..config.shadows.cascade_count {
//!         plane.set_material(PassKey::shadow_cascade(cascade), MaterialHandle(2));
//!     }
//!     scene.add(plane)?;
//!
//!     let mut backend = RecordingBackend::new(1280, 720);
//!     let mut orchestrator = FrameOrchestrator::builder(config)
//!         .size(1280, 720)
//!         .build(&mut backend, &mut scene)?;
//!
//!     let camera = orchestrator.main_camera(&scene);
//!     let report = orchestrator.render_frame(&mut backend, &scene, &camera)?;
//!     println!("{} draws", report.total_draws());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`binding`]: the parameter binding registry and capture scopes
//! - [`passes`]: G-buffer, shadow cascades, light probes, illumination
//! - [`render_graph`]: the orchestrator, frame trace and extension traits
//! - [`backend`]: the GPU abstraction with recording and wgpu backends
//! - [`scene`]: objects, lights and level settings

pub mod backend;
pub mod binding;
mod camera;
pub mod config;
pub mod culling;
mod error;
pub mod params;
pub mod passes;
pub mod render_graph;
pub mod scene;

pub use backend::{
    GpuContext, MaterialEncoder, RecordingBackend, RenderBackend, TargetDesc, TargetFormat,
    TargetId, TargetView, Viewport, WgpuBackend,
};
pub use binding::{
    BindingContext, BindingId, BindingScope, FrameData, MissingBindingPolicy,
    ParameterBindingRegistry, PassKey,
};
pub use camera::Camera;
pub use config::{DebugToggles, ProbeConfig, RendererConfig, ShadowConfig, SplitPolicy};
pub use culling::{Culling, FrustumCulling, NoCulling};
pub use error::{RenderError, Result};
pub use params::{ParamValue, ParameterBlock, TextureRef};
pub use passes::gbuffer::{GBufferTargets, GeometryPrepass};
pub use passes::illumination::IlluminationComposer;
pub use passes::probe::{
    BakeStats, CubeFace, LightProbe, LightProbeManager, ProbeFaceCamera, ProbeState,
};
pub use passes::shadow::{CascadedShadowPipeline, ShadowCascade, ShadowSnapshot};
pub use render_graph::{
    FrameOrchestrator, FrameOrchestratorBuilder, FrameOutputs, FramePass, FrameReport,
    FrameTrace, NodeContext, PassOutcome, RenderNode, Skybox,
};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
