//! Visibility determination for the camera-driven passes.

use glam::{Mat4, Vec3, Vec4};

use crate::camera::Camera;
use crate::scene::{ObjectId, Scene};

/// Decides which objects a camera can see this frame.
pub trait Culling {
    /// Returns the visible objects in scene (name) order.
    fn cull(&self, scene: &Scene, camera: &Camera) -> Vec<ObjectId>;
}

/// Treats every object as visible.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCulling;

impl Culling for NoCulling {
    fn cull(&self, scene: &Scene, _camera: &Camera) -> Vec<ObjectId> {
        scene.ids().collect()
    }
}

/// Bounding-sphere against view-frustum test.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrustumCulling;

impl Culling for FrustumCulling {
    fn cull(&self, scene: &Scene, camera: &Camera) -> Vec<ObjectId> {
        let frustum = Frustum::from_view_projection(camera.view_projection());
        scene
            .iter()
            .filter(|object| {
                let bounds = object.world_bounds();
                frustum.intersects_sphere(bounds.center, bounds.radius)
            })
            .map(|object| object.id())
            .collect()
    }
}

/// Six clip planes extracted from a view-projection matrix (0..1 depth).
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let len = p.truncate().length();
            if len > 0.0 { p / len } else { p }
        });
        Self { planes }
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}
