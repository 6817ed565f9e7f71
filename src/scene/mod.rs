//! Scene data consumed by the frame pipeline.
//!
//! A [`Scene`] is produced by the level loader and only read by the
//! orchestrator while a frame is running. Objects live in an arena owned by
//! the scene and are addressed by [`ObjectId`]; the scene also keeps an
//! ordered name index so passes visit objects in a stable order.
//!
//! # Example
//!
//! ```
//! use umbra::scene::{MaterialHandle, MeshData, RenderableObject, Scene, SceneSettings};
//! use umbra::PassKey;
//!
//! let mut scene = Scene::new(SceneSettings::default());
//! let plane = RenderableObject::new("Plane")
//!     .with_mesh(MeshData::new("plane"))
//!     .with_material(PassKey::deferred_prepass(), MaterialHandle(1));
//! let id = scene.add(plane).unwrap();
//!
//! assert_eq!(scene.id_of("Plane"), Some(id));
//! ```

mod light;
mod object;
#[allow(clippy::module_inception)]
pub mod scene;

pub use light::{DirectionalLight, LightSnapshot};
pub use object::{
    BoundingSphere, MaterialHandle, MeshData, ObjectId, RenderableObject, TextureId, TextureMaps,
    Transform,
};
pub use scene::{Scene, SceneFeatures, SceneSettings};
