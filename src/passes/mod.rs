//! The built-in render passes and the helpers they share.
//!
//! Every pass draws objects the same way: look up the object's material for
//! the pass key, then for each mesh invoke the registered binding into a
//! fresh [`ParameterBlock`] and hand the draw to the backend.

pub mod gbuffer;
pub mod illumination;
pub mod probe;
pub mod shadow;

use glam::Vec3;

use crate::backend::{DrawRequest, RenderBackend};
use crate::binding::{
    BindingContext, FrameData, MissingBindingPolicy, ParameterBindingRegistry, PassKey,
};
use crate::error::{RenderError, Result};
use crate::params::{ParamValue, ParameterBlock, TextureRef, names};
use crate::scene::{RenderableObject, Scene, TextureMaps};

/// Read-only state every pass draws against.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    pub scene: &'a Scene,
    pub registry: &'a ParameterBindingRegistry,
    pub frame: &'a FrameData,
    pub policy: MissingBindingPolicy,
}

/// Draws every mesh of `object` under `pass` at level of detail `lod`.
///
/// Returns the number of draws issued.
pub fn draw_object(
    backend: &mut dyn RenderBackend,
    ctx: &PassContext<'_>,
    object: &RenderableObject,
    pass: &PassKey,
    lod: usize,
) -> Result<usize> {
    let material = object.require_material(pass)?;
    let mut params = ParameterBlock::new();

    for mesh_index in 0..object.mesh_count() {
        params.clear();
        let binding_ctx = BindingContext {
            object,
            mesh_index,
            frame: ctx.frame,
        };
        match ctx.registry.invoke(&binding_ctx, pass, &mut params) {
            Ok(()) => {}
            Err(RenderError::BindingNotFound { .. })
                if ctx.policy == MissingBindingPolicy::Ignore =>
            {
                log::debug!(
                    "drawing '{}' under '{}' without parameters",
                    object.name(),
                    pass
                );
            }
            Err(e) => return Err(e),
        }

        backend.draw(&DrawRequest {
            pass,
            object: object.id(),
            mesh_index,
            lod,
            material,
            params: &params,
        })?;
    }
    Ok(object.mesh_count())
}

/// Runs `body` inside a backend debug group, popping it on every path.
pub fn with_debug_group<T>(
    backend: &mut dyn RenderBackend,
    label: &str,
    body: impl FnOnce(&mut dyn RenderBackend) -> Result<T>,
) -> Result<T> {
    backend.push_debug_group(label);
    let result = body(&mut *backend);
    backend.pop_debug_group();
    result
}

/// Writes the per-mesh texture maps.
pub fn write_mesh_textures(params: &mut ParameterBlock, textures: &TextureMaps) {
    params
        .set_texture(names::ALBEDO_TEXTURE, textures.albedo.map(TextureRef::Asset))
        .set_texture(names::NORMAL_TEXTURE, textures.normal.map(TextureRef::Asset))
        .set_texture(
            names::SPECULAR_TEXTURE,
            textures.specular.map(TextureRef::Asset),
        )
        .set_texture(
            names::ROUGHNESS_TEXTURE,
            textures.roughness.map(TextureRef::Asset),
        )
        .set_texture(
            names::METALLIC_TEXTURE,
            textures.metallic.map(TextureRef::Asset),
        );
}

/// Sun intensity packed into the `w` of the sun color.
pub const SUN_INTENSITY: f32 = 5.0;

/// Writes the lighting and shadow inputs shared by the forward-lit passes.
///
/// `eye` is the position shading is evaluated from: the main camera for
/// forward lighting, the probe center for probe captures.
pub fn write_lighting_params(params: &mut ParameterBlock, frame: &FrameData, eye: Vec3) {
    let shadows = &frame.shadows;
    let light = &frame.light;
    params
        .set(
            names::SHADOW_MATRICES,
            ParamValue::Mat4Array(shadows.matrices.clone()),
        )
        .set(
            names::SHADOW_TEXTURES,
            ParamValue::TextureArray(shadows.texture_refs()),
        )
        .set_vec4(names::CAMERA_POSITION, eye.extend(1.0))
        .set_vec4(names::SUN_DIRECTION, (-light.direction).extend(0.0))
        .set_vec4(names::SUN_COLOR, light.color.extend(SUN_INTENSITY))
        .set_vec4(names::AMBIENT_COLOR, light.ambient.extend(1.0))
        .set_vec4(names::SHADOW_TEXEL_SIZE, shadows.texel_size())
        .set_vec4(
            names::SHADOW_CASCADE_DISTANCES,
            shadows.cascade_distances(),
        );
}
