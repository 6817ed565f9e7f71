//! wgpu implementation of [`RenderBackend`].
//!
//! Calls are recorded into pending render passes while the frame runs and
//! encoded into a single command buffer on [`submit`](RenderBackend::submit).
//! A new wgpu render pass starts whenever targets are rebound or a clear
//! follows a draw, since wgpu only clears through attachment load ops.
//!
//! Pipelines and bind groups belong to the material system. The backend hands
//! every draw to a [`MaterialEncoder`], which sets the pipeline for the
//! draw's material, uploads its [`ParameterBlock`] and issues the draw call.

use std::collections::HashMap;

use glam::Vec4;

use super::gpu::GpuContext;
use super::{
    DrawCommand, DrawRequest, FullscreenRequest, RenderBackend, TargetDesc, TargetFormat,
    TargetId, TargetView, Viewport,
};
use crate::error::{RenderError, Result};
use crate::params::ParameterBlock;

/// Encodes material draws into an open wgpu render pass.
pub trait MaterialEncoder {
    /// Encodes one mesh draw. `targets` resolves render-target textures
    /// referenced by the draw's parameters.
    fn encode_draw(
        &mut self,
        gpu: &GpuContext,
        targets: &TargetTable,
        pass: &mut wgpu::RenderPass<'_>,
        draw: &DrawCommand,
    ) -> Result<()>;

    /// Encodes a fullscreen composition pass.
    fn encode_fullscreen(
        &mut self,
        gpu: &GpuContext,
        targets: &TargetTable,
        pass: &mut wgpu::RenderPass<'_>,
        label: &str,
        params: &ParameterBlock,
    ) -> Result<()>;
}

struct GpuTarget {
    texture: wgpu::Texture,
    desc: TargetDesc,
}

/// Render targets allocated by a [`WgpuBackend`].
#[derive(Default)]
pub struct TargetTable {
    targets: HashMap<TargetId, GpuTarget>,
}

impl TargetTable {
    pub fn desc(&self, id: TargetId) -> Option<&TargetDesc> {
        self.targets.get(&id).map(|t| &t.desc)
    }

    pub fn texture(&self, id: TargetId) -> Option<&wgpu::Texture> {
        self.targets.get(&id).map(|t| &t.texture)
    }

    /// Creates a 2D view of one layer of a target.
    pub fn layer_view(&self, view: TargetView) -> Option<wgpu::TextureView> {
        let target = self.targets.get(&view.target)?;
        if view.layer >= target.desc.layers {
            return None;
        }
        Some(target.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&target.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: view.layer,
            array_layer_count: Some(1),
            ..Default::default()
        }))
    }

    fn insert(&mut self, id: TargetId, texture: wgpu::Texture, desc: TargetDesc) {
        self.targets.insert(id, GpuTarget { texture, desc });
    }
}

enum PassOp {
    Viewport(Viewport),
    Draw(DrawCommand),
    Fullscreen {
        label: String,
        params: ParameterBlock,
    },
}

struct PendingPass {
    color: Vec<TargetView>,
    depth: Option<TargetView>,
    clear_color: Option<Vec4>,
    clear_depth: Option<f32>,
    ops: Vec<PassOp>,
}

enum Recorded {
    Pass(PendingPass),
    PushGroup(String),
    PopGroup,
}

/// A [`RenderBackend`] that renders with wgpu.
pub struct WgpuBackend {
    gpu: GpuContext,
    encoder: Box<dyn MaterialEncoder>,
    targets: TargetTable,
    next_target: u32,
    viewport: Viewport,
    bound: Option<(Vec<TargetView>, Option<TargetView>)>,
    recorded: Vec<Recorded>,
}

impl WgpuBackend {
    pub fn new(
        gpu: GpuContext,
        encoder: Box<dyn MaterialEncoder>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            gpu,
            encoder,
            targets: TargetTable::default(),
            next_target: 0,
            viewport: Viewport::new(width, height),
            bound: None,
            recorded: Vec::new(),
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn targets(&self) -> &TargetTable {
        &self.targets
    }

    fn format(format: TargetFormat) -> wgpu::TextureFormat {
        match format {
            TargetFormat::Depth => wgpu::TextureFormat::Depth32Float,
            TargetFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }

    /// The pass draws should land in, opening one on the bound targets if needed.
    fn current_pass(&mut self) -> Result<&mut PendingPass> {
        let needs_new = !matches!(self.recorded.last(), Some(Recorded::Pass(_)));
        if needs_new {
            let (color, depth) = self.bound.clone().ok_or_else(|| {
                RenderError::Configuration("draw issued with no render targets bound".into())
            })?;
            self.open_pass(color, depth);
        }
        match self.recorded.last_mut() {
            Some(Recorded::Pass(pass)) => Ok(pass),
            _ => Err(RenderError::Configuration("no open render pass".into())),
        }
    }

    fn open_pass(&mut self, color: Vec<TargetView>, depth: Option<TargetView>) {
        self.recorded.push(Recorded::Pass(PendingPass {
            color,
            depth,
            clear_color: None,
            clear_depth: None,
            ops: vec![PassOp::Viewport(self.viewport)],
        }));
    }

    /// Pass a clear can be folded into: an open pass with no draws yet.
    fn clearable_pass(&mut self) -> Option<&mut PendingPass> {
        let open_and_empty = match self.recorded.last() {
            Some(Recorded::Pass(pass)) => pass
                .ops
                .iter()
                .all(|op| matches!(op, PassOp::Viewport(_))),
            _ => false,
        };
        if !open_and_empty {
            let (color, depth) = self.bound.clone()?;
            self.open_pass(color, depth);
        }
        match self.recorded.last_mut() {
            Some(Recorded::Pass(pass)) => Some(pass),
            _ => None,
        }
    }

    fn attachment_size(&self, pass: &PendingPass) -> Option<(u32, u32)> {
        pass.color
            .first()
            .or(pass.depth.as_ref())
            .and_then(|view| self.targets.desc(view.target))
            .map(|desc| (desc.width, desc.height))
    }

    fn encode_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        pending: &PendingPass,
    ) -> Result<()> {
        let resolve = |view: &TargetView| {
            self.targets.layer_view(*view).ok_or_else(|| {
                RenderError::ResourceCreation(format!("unknown render target {:?}", view))
            })
        };
        let color_views = pending.color.iter().map(resolve).collect::<Result<Vec<_>>>()?;
        let depth_view = pending.depth.as_ref().map(resolve).transpose()?;
        let (width, height) = self.attachment_size(pending).unwrap_or((1, 1));

        let load_color = match pending.clear_color {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.x as f64,
                g: c.y as f64,
                b: c.z as f64,
                a: c.w as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<_> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: load_color,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match pending.clear_depth {
                            Some(d) => wgpu::LoadOp::Clear(d),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: None,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for op in &pending.ops {
            match op {
                PassOp::Viewport(vp) => {
                    let x = vp.x.min(width.saturating_sub(1));
                    let y = vp.y.min(height.saturating_sub(1));
                    let w = vp.width.min(width - x).max(1);
                    let h = vp.height.min(height - y).max(1);
                    pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
                }
                PassOp::Draw(draw) => {
                    self.encoder
                        .encode_draw(&self.gpu, &self.targets, &mut pass, draw)?;
                }
                PassOp::Fullscreen { label, params } => {
                    self.encoder.encode_fullscreen(
                        &self.gpu,
                        &self.targets,
                        &mut pass,
                        label,
                        params,
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        let max = self.gpu.max_texture_size();
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RenderError::ResourceCreation(format!(
                "target '{}' is {}x{}, device allows 1..={max}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.layers == 0 || desc.layers > self.gpu.max_array_layers() {
            return Err(RenderError::ResourceCreation(format!(
                "target '{}' has {} layers",
                desc.label, desc.layers
            )));
        }

        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let id = TargetId::new(self.next_target);
        self.next_target += 1;
        log::debug!(
            "created target '{}' {}x{}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.layers,
            desc.format
        );
        self.targets.insert(id, texture, desc.clone());
        Ok(id)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if let Some(Recorded::Pass(pass)) = self.recorded.last_mut() {
            pass.ops.push(PassOp::Viewport(viewport));
        }
    }

    fn bind_targets(&mut self, color: &[TargetView], depth: Option<TargetView>) {
        self.bound = Some((color.to_vec(), depth));
        self.open_pass(color.to_vec(), depth);
    }

    fn clear_color(&mut self, color: Vec4) {
        match self.clearable_pass() {
            Some(pass) => pass.clear_color = Some(color),
            None => log::warn!("clear_color with no render targets bound"),
        }
    }

    fn clear_depth(&mut self, depth: f32) {
        match self.clearable_pass() {
            Some(pass) => pass.clear_depth = Some(depth),
            None => log::warn!("clear_depth with no render targets bound"),
        }
    }

    fn draw(&mut self, request: &DrawRequest<'_>) -> Result<()> {
        let command = request.to_command();
        self.current_pass()?.ops.push(PassOp::Draw(command));
        Ok(())
    }

    fn draw_fullscreen(&mut self, request: &FullscreenRequest<'_>) -> Result<()> {
        let op = PassOp::Fullscreen {
            label: request.label.to_owned(),
            params: request.params.clone(),
        };
        self.current_pass()?.ops.push(op);
        Ok(())
    }

    fn push_debug_group(&mut self, label: &str) {
        self.recorded.push(Recorded::PushGroup(label.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.recorded.push(Recorded::PopGroup);
    }

    fn submit(&mut self) -> Result<()> {
        let recorded = std::mem::take(&mut self.recorded);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let mut result = Ok(());
        for item in &recorded {
            match item {
                Recorded::PushGroup(label) => encoder.push_debug_group(label),
                Recorded::PopGroup => encoder.pop_debug_group(),
                Recorded::Pass(pass) => {
                    if result.is_ok() {
                        result = self.encode_pass(&mut encoder, pass);
                    }
                }
            }
        }

        // Submit even on encode errors so debug groups stay balanced and the
        // passes that did encode still land.
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.bound = None;
        result
    }
}
