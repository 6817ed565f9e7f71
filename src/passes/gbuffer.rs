//! Geometry prepass: fills the G-buffer for deferred shading.

use glam::Vec4;

use super::{PassContext, draw_object, with_debug_group, write_mesh_textures};
use crate::backend::{RenderBackend, TargetDesc, TargetFormat, TargetId, TargetView};
use crate::binding::{BindingContext, PassKey};
use crate::error::Result;
use crate::params::{ParameterBlock, TextureRef, names};
use crate::scene::ObjectId;

/// Render targets written by the prepass and read by the lighting passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GBufferTargets {
    pub albedo: TargetId,
    pub normal: TargetId,
    /// Specular, roughness and metallic packed per texel.
    pub material: TargetId,
    pub depth: TargetId,
}

impl GBufferTargets {
    pub fn color_views(&self) -> [TargetView; 3] {
        [self.albedo.view(), self.normal.view(), self.material.view()]
    }

    /// All four targets as shader inputs, depth last.
    pub fn texture_refs(&self) -> Vec<TextureRef> {
        [self.albedo, self.normal, self.material, self.depth]
            .into_iter()
            .map(|t| TextureRef::Target(t.view()))
            .collect()
    }
}

/// Draws every visible deferred-shaded object into the G-buffer.
#[derive(Debug)]
pub struct GeometryPrepass {
    targets: GBufferTargets,
    pass: PassKey,
}

impl GeometryPrepass {
    pub fn new(backend: &mut dyn RenderBackend, width: u32, height: u32) -> Result<Self> {
        let mut create = |label: &str, format| {
            backend.create_target(&TargetDesc::new(label, width, height, format))
        };
        let targets = GBufferTargets {
            albedo: create("gbuffer-albedo", TargetFormat::Rgba8)?,
            normal: create("gbuffer-normal", TargetFormat::Rgba16Float)?,
            material: create("gbuffer-material", TargetFormat::Rgba8)?,
            depth: create("gbuffer-depth", TargetFormat::Depth)?,
        };
        Ok(Self {
            targets,
            pass: PassKey::deferred_prepass(),
        })
    }

    pub fn targets(&self) -> &GBufferTargets {
        &self.targets
    }

    pub fn pass_key(&self) -> &PassKey {
        &self.pass
    }

    /// Clears the G-buffer and draws the visible objects that are not
    /// forward shaded. Zero visible objects still clears.
    pub fn render(
        &self,
        backend: &mut dyn RenderBackend,
        ctx: &PassContext<'_>,
        visible: &[ObjectId],
    ) -> Result<usize> {
        with_debug_group(backend, self.pass.as_str(), |backend| {
            backend.bind_targets(
                &self.targets.color_views(),
                Some(self.targets.depth.view()),
            );
            backend.clear_color(Vec4::ZERO);
            backend.clear_depth(1.0);

            let mut draws = 0;
            for object in visible.iter().filter_map(|id| ctx.scene.get(*id)) {
                if !object.forward_shading {
                    draws += draw_object(backend, ctx, object, &self.pass, 0)?;
                }
            }
            log::trace!("prepass drew {} meshes", draws);
            Ok(draws)
        })
    }
}

/// Level-lifetime binding for the geometry prepass.
pub fn prepass_binding(ctx: &BindingContext<'_>, params: &mut ParameterBlock) {
    params
        .set_mat4(names::WORLD, ctx.object.world_matrix())
        .set_mat4(names::VIEW_PROJECTION, ctx.frame.camera.view_projection());
    if let Some(mesh) = ctx.object.meshes().get(ctx.mesh_index) {
        write_mesh_textures(params, &mesh.textures);
    }
}
