//! Frame sequencing.
//!
//! The [`FrameOrchestrator`] owns the built-in passes and runs them in a
//! fixed linear order every frame. External stages plug into named slots as
//! [`RenderNode`]s; the sky comes from a [`Skybox`].
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌────────┐   ┌────────┐
//! │ Prepass  │──▶│ Shadows │──▶│ Probe bake │──▶│   GI   │──▶│ Local  │──▶ …
//! │ G-buffer │   │ N maps  │   │ (pending)  │   │        │   │ illum. │
//! └──────────┘   └─────────┘   └────────────┘   └────────┘   └────────┘
//!                                   …──▶ Debug? ──▶ Sun/sky ──▶ Volumetrics
//!                                        ──▶ Post-processing ──▶ UI overlay
//! ```
//!
//! Every stage is recorded in a [`FrameTrace`], returned inside the
//! [`FrameReport`] of each frame.

mod orchestrator;
mod render_node;
mod trace;

pub use orchestrator::{
    FrameOrchestrator, FrameOrchestratorBuilder, required_passes, validate_scene,
};
pub use render_node::{FrameOutputs, NodeContext, RenderNode, Skybox};
pub use trace::{FramePass, FrameReport, FrameTrace, PassOutcome, PassRecord};
