//! Renderable objects and the handles the asset system hands out.

use std::collections::BTreeMap;

use glam::{Mat4, Quat, Vec3};

use crate::binding::PassKey;
use crate::error::{RenderError, Result};

/// Index of an object inside its owning [`Scene`](super::Scene).
///
/// Ids are assigned by [`Scene::add`](super::Scene::add) and stay valid for
/// the lifetime of the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub(crate) const UNASSIGNED: ObjectId = ObjectId(usize::MAX);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Type-safe handle to a texture owned by the asset system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Type-safe handle to a compiled material owned by the asset system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Texture maps sampled by the lighting passes for one mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextureMaps {
    pub albedo: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub specular: Option<TextureId>,
    pub roughness: Option<TextureId>,
    pub metallic: Option<TextureId>,
}

/// One mesh of an object. Geometry buffers live in the asset system; the
/// pipeline only needs the per-mesh textures.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub textures: TextureMaps,
}

impl MeshData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: TextureMaps::default(),
        }
    }

    pub fn with_textures(mut self, textures: TextureMaps) -> Self {
        self.textures = textures;
        self
    }
}

/// World-space placement of an object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World-space position (translation).
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Scale factors for each axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Computes the model matrix (scale, then rotate, then translate).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Sphere used for culling, in object space unless stated otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 1.0,
        }
    }
}

/// A drawable object: meshes, placement, flags and one material per pass.
#[derive(Clone, Debug)]
pub struct RenderableObject {
    pub(crate) id: ObjectId,
    name: String,
    pub transform: Transform,
    meshes: Vec<MeshData>,
    lod_count: usize,
    pub bounds: BoundingSphere,
    /// Drawn in the local illumination pass instead of the G-buffer.
    pub forward_shading: bool,
    /// Captured by light probes.
    pub in_light_probe: bool,
    pub casts_shadows: bool,
    materials: BTreeMap<PassKey, MaterialHandle>,
}

impl RenderableObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::UNASSIGNED,
            name: name.into(),
            transform: Transform::default(),
            meshes: Vec::new(),
            lod_count: 1,
            bounds: BoundingSphere::default(),
            forward_shading: false,
            in_light_probe: false,
            casts_shadows: true,
            materials: BTreeMap::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: MeshData) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_bounds(mut self, center: Vec3, radius: f32) -> Self {
        self.bounds = BoundingSphere { center, radius };
        self
    }

    pub fn with_lods(mut self, lod_count: usize) -> Self {
        self.lod_count = lod_count.max(1);
        self
    }

    pub fn with_material(mut self, pass: PassKey, material: MaterialHandle) -> Self {
        self.materials.insert(pass, material);
        self
    }

    pub fn forward_shaded(mut self) -> Self {
        self.forward_shading = true;
        self
    }

    pub fn in_light_probe(mut self, captured: bool) -> Self {
        self.in_light_probe = captured;
        self
    }

    pub fn casts_shadows(mut self, casts: bool) -> Self {
        self.casts_shadows = casts;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn lod_count(&self) -> usize {
        self.lod_count
    }

    /// Index of the coarsest level of detail.
    pub fn lowest_lod(&self) -> usize {
        self.lod_count - 1
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    /// Bounding sphere transformed into world space.
    pub fn world_bounds(&self) -> BoundingSphere {
        let max_scale = self.transform.scale.abs().max_element();
        BoundingSphere {
            center: self.world_matrix().transform_point3(self.bounds.center),
            radius: self.bounds.radius * max_scale,
        }
    }

    pub fn materials(&self) -> impl Iterator<Item = (&PassKey, &MaterialHandle)> {
        self.materials.iter()
    }

    pub fn material(&self, pass: &PassKey) -> Option<MaterialHandle> {
        self.materials.get(pass).copied()
    }

    pub fn set_material(&mut self, pass: PassKey, material: MaterialHandle) {
        self.materials.insert(pass, material);
    }

    /// Looks up the material for `pass`, treating absence as a configuration error.
    pub fn require_material(&self, pass: &PassKey) -> Result<MaterialHandle> {
        self.material(pass)
            .ok_or_else(|| RenderError::MissingPassMaterial {
                object: self.name.clone(),
                pass: pass.clone(),
            })
    }
}
