//! Per-draw shader inputs written by parameter bindings.
//!
//! A [`ParameterBlock`] is the Rust stand-in for "the material's shader
//! variables": binding callbacks write named values into it right before a
//! draw, and the backend hands it to whatever encodes the draw.

use glam::{Mat4, Vec4};

use crate::backend::TargetView;
use crate::scene::TextureId;

/// Well-known parameter names written by the built-in bindings.
pub mod names {
    pub const WORLD: &str = "world";
    pub const VIEW_PROJECTION: &str = "view_projection";
    pub const LIGHT_VIEW_PROJECTION: &str = "light_view_projection";
    pub const SHADOW_MATRICES: &str = "shadow_matrices";
    pub const SHADOW_TEXTURES: &str = "shadow_textures";
    pub const SHADOW_TEXEL_SIZE: &str = "shadow_texel_size";
    pub const SHADOW_CASCADE_DISTANCES: &str = "shadow_cascade_distances";
    pub const CAMERA_POSITION: &str = "camera_position";
    pub const SUN_DIRECTION: &str = "sun_direction";
    pub const SUN_COLOR: &str = "sun_color";
    pub const AMBIENT_COLOR: &str = "ambient_color";
    pub const ALBEDO_TEXTURE: &str = "albedo_texture";
    pub const NORMAL_TEXTURE: &str = "normal_texture";
    pub const SPECULAR_TEXTURE: &str = "specular_texture";
    pub const ROUGHNESS_TEXTURE: &str = "roughness_texture";
    pub const METALLIC_TEXTURE: &str = "metallic_texture";
    pub const GBUFFER_TEXTURES: &str = "gbuffer_textures";
    pub const PROBE_TEXTURES: &str = "probe_textures";
    pub const GLOBAL_ILLUMINATION: &str = "global_illumination";
}

/// A texture input: either an asset texture or a layer of a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRef {
    Asset(TextureId),
    Target(TargetView),
}

/// A single shader input value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vec4(Vec4),
    Mat4(Mat4),
    Mat4Array(Vec<Mat4>),
    Texture(Option<TextureRef>),
    TextureArray(Vec<TextureRef>),
}

/// Named shader inputs for one draw, in write order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterBlock {
    values: Vec<(&'static str, ParamValue)>,
}

impl ParameterBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value` under `name`, replacing any earlier value of that name.
    pub fn set(&mut self, name: &'static str, value: ParamValue) -> &mut Self {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    pub fn set_mat4(&mut self, name: &'static str, value: Mat4) -> &mut Self {
        self.set(name, ParamValue::Mat4(value))
    }

    pub fn set_vec4(&mut self, name: &'static str, value: Vec4) -> &mut Self {
        self.set(name, ParamValue::Vec4(value))
    }

    pub fn set_texture(&mut self, name: &'static str, texture: Option<TextureRef>) -> &mut Self {
        self.set(name, ParamValue::Texture(texture))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Convenience accessor for matrix parameters.
    pub fn mat4(&self, name: &str) -> Option<Mat4> {
        match self.get(name) {
            Some(ParamValue::Mat4(m)) => Some(*m),
            _ => None,
        }
    }

    pub fn vec4(&self, name: &str) -> Option<Vec4> {
        match self.get(name) {
            Some(ParamValue::Vec4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    /// Packs the numeric values into a uniform-buffer byte stream.
    ///
    /// Scalars are padded to 16 bytes so every entry starts on a vec4
    /// boundary. Texture entries occupy no bytes.
    pub fn packed_uniforms(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (_, value) in &self.values {
            match value {
                ParamValue::Float(f) => {
                    bytes.extend_from_slice(bytemuck::bytes_of(&Vec4::new(*f, 0.0, 0.0, 0.0)));
                }
                ParamValue::Vec4(v) => bytes.extend_from_slice(bytemuck::bytes_of(v)),
                ParamValue::Mat4(m) => bytes.extend_from_slice(bytemuck::bytes_of(m)),
                ParamValue::Mat4Array(ms) => bytes.extend_from_slice(bytemuck::cast_slice(ms)),
                ParamValue::Texture(_) | ParamValue::TextureArray(_) => {}
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_value() {
        let mut block = ParameterBlock::new();
        block.set_mat4(names::WORLD, Mat4::IDENTITY);
        block.set_mat4(names::WORLD, Mat4::from_scale(glam::Vec3::splat(2.0)));

        assert_eq!(block.len(), 1);
        assert_eq!(
            block.mat4(names::WORLD),
            Some(Mat4::from_scale(glam::Vec3::splat(2.0)))
        );
    }

    #[test]
    fn packed_uniforms_pads_scalars_and_skips_textures() {
        let mut block = ParameterBlock::new();
        block
            .set(names::SHADOW_TEXEL_SIZE, ParamValue::Float(0.5))
            .set_texture(names::ALBEDO_TEXTURE, None)
            .set_mat4(names::WORLD, Mat4::IDENTITY);

        let bytes = block.packed_uniforms();
        assert_eq!(bytes.len(), 16 + 64);
        let scalar = Vec4::new(0.5, 0.0, 0.0, 0.0);
        assert_eq!(&bytes[..16], bytemuck::bytes_of(&scalar));
    }
}
