//! GPU backend abstraction.
//!
//! Passes talk to the GPU only through [`RenderBackend`]: create targets,
//! bind them, clear, set the viewport and issue draws. Two implementations
//! ship with the crate:
//!
//! - [`RecordingBackend`] keeps an inspectable command log and draw counters.
//!   It runs without a device and is what the tests drive.
//! - [`WgpuBackend`] allocates real wgpu textures and encodes the recorded
//!   passes into a command buffer on [`submit`](RenderBackend::submit).

mod gpu;
mod recording;
mod wgpu_backend;

pub use gpu::GpuContext;
pub use recording::{Command, RecordingBackend};
pub use wgpu_backend::{MaterialEncoder, TargetTable, WgpuBackend};

use glam::Vec4;

use crate::binding::PassKey;
use crate::error::Result;
use crate::params::ParameterBlock;
use crate::scene::{MaterialHandle, ObjectId};

/// Handle to a render target owned by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// View of a single array layer of this target.
    pub fn layer(self, layer: u32) -> TargetView {
        TargetView {
            target: self,
            layer,
        }
    }

    /// View of the first (or only) layer.
    pub fn view(self) -> TargetView {
        self.layer(0)
    }
}

/// One array layer of a render target, bindable as an attachment or a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetView {
    pub target: TargetId,
    pub layer: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// 32-bit float depth.
    Depth,
    /// 8-bit RGBA color.
    Rgba8,
    /// 16-bit float RGBA color.
    Rgba16Float,
}

impl TargetFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TargetFormat::Depth)
    }
}

/// Description of a render target to create.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Array layers; cube captures use six.
    pub layers: u32,
    pub format: TargetFormat,
}

impl TargetDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TargetFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            layers: 1,
            format,
        }
    }

    pub fn square(label: impl Into<String>, size: u32, format: TargetFormat) -> Self {
        Self::new(label, size, size, format)
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }
}

/// Pixel rectangle the rasterizer writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

/// A single mesh draw handed to the backend.
#[derive(Clone, Copy, Debug)]
pub struct DrawRequest<'a> {
    pub pass: &'a PassKey,
    pub object: ObjectId,
    pub mesh_index: usize,
    pub lod: usize,
    pub material: MaterialHandle,
    pub params: &'a ParameterBlock,
}

impl DrawRequest<'_> {
    pub fn to_command(&self) -> DrawCommand {
        DrawCommand {
            pass: self.pass.clone(),
            object: self.object,
            mesh_index: self.mesh_index,
            lod: self.lod,
            material: self.material,
            params: self.params.clone(),
        }
    }
}

/// Owned copy of a [`DrawRequest`], as stored by backends that defer encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    pub pass: PassKey,
    pub object: ObjectId,
    pub mesh_index: usize,
    pub lod: usize,
    pub material: MaterialHandle,
    pub params: ParameterBlock,
}

/// A fullscreen triangle draw (composition passes).
#[derive(Clone, Copy, Debug)]
pub struct FullscreenRequest<'a> {
    pub label: &'a str,
    pub params: &'a ParameterBlock,
}

/// Operations every pass needs from the GPU.
pub trait RenderBackend {
    /// Allocates a render target.
    ///
    /// Fails with [`RenderError::ResourceCreation`](crate::RenderError::ResourceCreation)
    /// if the backend cannot provide it.
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId>;

    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Binds color attachments and an optional depth attachment for the
    /// draws that follow.
    fn bind_targets(&mut self, color: &[TargetView], depth: Option<TargetView>);

    /// Clears every bound color attachment.
    fn clear_color(&mut self, color: Vec4);

    fn clear_depth(&mut self, depth: f32);

    fn draw(&mut self, request: &DrawRequest<'_>) -> Result<()>;

    fn draw_fullscreen(&mut self, request: &FullscreenRequest<'_>) -> Result<()>;

    fn push_debug_group(&mut self, label: &str);

    fn pop_debug_group(&mut self);

    /// Flushes the frame's work to the GPU.
    fn submit(&mut self) -> Result<()>;
}
