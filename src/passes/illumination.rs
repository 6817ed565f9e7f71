//! Global and local illumination composition.
//!
//! Global illumination resolves probe lighting over the G-buffer into its
//! own target. Local illumination then builds the main color target: sky
//! background, the deferred composite, then forward-shaded objects on top.

use glam::Vec4;

use super::gbuffer::GBufferTargets;
use super::shadow::ShadowSnapshot;
use super::{PassContext, draw_object, with_debug_group, write_lighting_params, write_mesh_textures};
use crate::backend::{FullscreenRequest, RenderBackend, TargetDesc, TargetFormat, TargetId};
use crate::binding::{BindingContext, PassKey};
use crate::error::Result;
use crate::params::{ParamValue, ParameterBlock, TextureRef, names};
use crate::render_graph::Skybox;
use crate::scene::ObjectId;

pub const GLOBAL_ILLUMINATION_LABEL: &str = "global-illumination";
pub const LOCAL_ILLUMINATION_LABEL: &str = "local-illumination";

/// Owns the GI and main color targets.
#[derive(Debug)]
pub struct IlluminationComposer {
    gi: TargetId,
    color: TargetId,
    forward: PassKey,
}

impl IlluminationComposer {
    pub fn new(backend: &mut dyn RenderBackend, width: u32, height: u32) -> Result<Self> {
        let gi = backend.create_target(&TargetDesc::new(
            "global-illumination",
            width,
            height,
            TargetFormat::Rgba16Float,
        ))?;
        let color = backend.create_target(&TargetDesc::new(
            "main-color",
            width,
            height,
            TargetFormat::Rgba16Float,
        ))?;
        Ok(Self {
            gi,
            color,
            forward: PassKey::forward_lighting(),
        })
    }

    pub fn gi_target(&self) -> TargetId {
        self.gi
    }

    /// The main color target every later stage renders into.
    pub fn color_target(&self) -> TargetId {
        self.color
    }

    /// Fullscreen GI resolve from the G-buffer, shadow maps and probes.
    pub fn render_global(
        &self,
        backend: &mut dyn RenderBackend,
        gbuffer: &GBufferTargets,
        shadows: &ShadowSnapshot,
        probes: Vec<TextureRef>,
    ) -> Result<()> {
        let mut params = ParameterBlock::new();
        params
            .set(
                names::GBUFFER_TEXTURES,
                ParamValue::TextureArray(gbuffer.texture_refs()),
            )
            .set(
                names::SHADOW_TEXTURES,
                ParamValue::TextureArray(shadows.texture_refs()),
            )
            .set(names::PROBE_TEXTURES, ParamValue::TextureArray(probes));

        with_debug_group(backend, GLOBAL_ILLUMINATION_LABEL, |backend| {
            backend.bind_targets(&[self.gi.view()], None);
            backend.clear_color(Vec4::ZERO);
            backend.draw_fullscreen(&FullscreenRequest {
                label: GLOBAL_ILLUMINATION_LABEL,
                params: &params,
            })
        })
    }

    /// Sky, deferred composite and forward-shaded objects into the main
    /// color target. Returns the number of mesh draws.
    pub fn render_local(
        &self,
        backend: &mut dyn RenderBackend,
        ctx: &PassContext<'_>,
        gbuffer: &GBufferTargets,
        skybox: Option<&mut dyn Skybox>,
        visible: &[ObjectId],
    ) -> Result<usize> {
        let frame = ctx.frame;
        let mut params = ParameterBlock::new();
        params
            .set(
                names::GBUFFER_TEXTURES,
                ParamValue::TextureArray(gbuffer.texture_refs()),
            )
            .set_texture(
                names::GLOBAL_ILLUMINATION,
                Some(TextureRef::Target(self.gi.view())),
            );
        write_lighting_params(&mut params, frame, frame.camera.position);

        with_debug_group(backend, LOCAL_ILLUMINATION_LABEL, |backend| {
            backend.bind_targets(&[self.color.view()], Some(gbuffer.depth.view()));
            backend.clear_color(Vec4::ZERO);

            if let Some(sky) = skybox {
                sky.update(&frame.camera);
                sky.draw(backend, &frame.camera)?;
            }

            backend.draw_fullscreen(&FullscreenRequest {
                label: LOCAL_ILLUMINATION_LABEL,
                params: &params,
            })?;

            let mut draws = 0;
            for object in visible.iter().filter_map(|id| ctx.scene.get(*id)) {
                if object.forward_shading {
                    draws += draw_object(backend, ctx, object, &self.forward, 0)?;
                }
            }
            Ok(draws)
        })
    }
}

/// Level-lifetime binding for forward-shaded objects.
pub fn forward_lighting_binding(ctx: &BindingContext<'_>, params: &mut ParameterBlock) {
    let frame = ctx.frame;
    params
        .set_mat4(names::VIEW_PROJECTION, frame.camera.view_projection())
        .set_mat4(names::WORLD, ctx.object.world_matrix());
    write_lighting_params(params, frame, frame.camera.position);
    if let Some(mesh) = ctx.object.meshes().get(ctx.mesh_index) {
        write_mesh_textures(params, &mesh.textures);
    }
}
