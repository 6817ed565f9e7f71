use glam::{Mat4, Vec3};

/// A perspective camera for the main view, shadow fitting and probe faces.
///
/// Provides position, orientation, field of view and clip planes. The
/// `mirrored` flag flips clip-space X; light-probe face cameras set it so that
/// right-handed views line up with the cubemap face layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians, vertical
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub mirrored: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
            mirrored: false,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let target = Vec3::new(target_x, target_y, target_z);
        self.forward = (target - self.position).normalize_or_zero();
        self
    }

    pub fn looking_to(mut self, direction: Vec3, up: Vec3) -> Self {
        self.forward = direction.normalize_or_zero();
        self.up = up.normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Recompute up to be orthogonal to forward and right.
    pub fn orthogonal_up(&self) -> Vec3 {
        self.right().cross(self.forward).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        if self.mirrored {
            Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)) * projection
        } else {
            projection
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space corners of the frustum slice between `slice_near` and `slice_far`.
    ///
    /// Order: near face (bottom-left, bottom-right, top-right, top-left),
    /// then the far face in the same order.
    pub fn frustum_slice_corners(&self, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
        let forward = self.forward.normalize_or_zero();
        let right = self.right();
        let up = self.orthogonal_up();
        let tan_half_fov = (self.fov * 0.5).tan();

        let corners_at = |distance: f32| {
            let center = self.position + forward * distance;
            let half_h = tan_half_fov * distance;
            let half_w = half_h * self.aspect;
            [
                center - right * half_w - up * half_h,
                center + right * half_w - up * half_h,
                center + right * half_w + up * half_h,
                center - right * half_w + up * half_h,
            ]
        };

        let n = corners_at(slice_near);
        let f = corners_at(slice_far);
        [n[0], n[1], n[2], n[3], f[0], f[1], f[2], f[3]]
    }
}
