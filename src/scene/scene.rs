//! Scene definition: object arena, name index and level settings.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::light::DirectionalLight;
use super::object::{ObjectId, RenderableObject};
use crate::camera::Camera;
use crate::error::{RenderError, Result};

/// Optional level features the loader detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneFeatures {
    pub terrain: bool,
    pub foliage: bool,
    pub light_probes: bool,
    pub volumetric_fog: bool,
}

/// Level-wide values read once at load time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub ambient_color: Vec3,
    pub sun_color: Vec3,
    pub sun_direction: Vec3,
    pub camera_position: Vec3,
    pub camera_direction: Vec3,
    pub features: SceneFeatures,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::splat(0.08),
            sun_color: Vec3::ONE,
            sun_direction: Vec3::new(-0.3, -0.9, -0.3),
            camera_position: Vec3::new(0.0, 8.4, 60.0),
            camera_direction: Vec3::NEG_Z,
            features: SceneFeatures {
                light_probes: true,
                ..Default::default()
            },
        }
    }
}

/// The level being rendered.
///
/// Objects are stored by value in an arena and indexed by [`ObjectId`]. The
/// name index is ordered, so [`iter`](Self::iter) visits objects by name.
/// The scene is only mutated between frames; passes receive `&Scene`.
#[derive(Debug)]
pub struct Scene {
    objects: Vec<RenderableObject>,
    names: BTreeMap<String, ObjectId>,
    settings: SceneSettings,
    light: DirectionalLight,
}

impl Scene {
    pub fn new(settings: SceneSettings) -> Self {
        let light = DirectionalLight::new(
            settings.sun_direction,
            settings.sun_color,
            settings.ambient_color,
        );
        Self {
            objects: Vec::new(),
            names: BTreeMap::new(),
            settings,
            light,
        }
    }

    /// Adds an object and returns its id.
    ///
    /// Object names are unique; adding a second object with the same name is
    /// a configuration error.
    pub fn add(&mut self, mut object: RenderableObject) -> Result<ObjectId> {
        if self.names.contains_key(object.name()) {
            return Err(RenderError::Configuration(format!(
                "duplicate object name '{}'",
                object.name()
            )));
        }
        let id = ObjectId(self.objects.len());
        object.id = id;
        self.names.insert(object.name().to_owned(), id);
        self.objects.push(object);
        Ok(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&RenderableObject> {
        self.objects.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RenderableObject> {
        self.objects.get_mut(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<&RenderableObject> {
        self.names.get(name).and_then(|id| self.get(*id))
    }

    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates objects in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RenderableObject> {
        self.names.values().map(|id| &self.objects[id.0])
    }

    /// Object ids in name order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.names.values().copied()
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    pub fn features(&self) -> SceneFeatures {
        self.settings.features
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.light
    }

    /// The camera pose the level starts with.
    pub fn start_camera(&self) -> Camera {
        Camera {
            position: self.settings.camera_position,
            forward: self
                .settings
                .camera_direction
                .try_normalize()
                .unwrap_or(Vec3::NEG_Z),
            ..Camera::default()
        }
    }
}
