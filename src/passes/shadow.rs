//! Cascaded shadow maps for the scene's directional light.
//!
//! The camera depth range is split into contiguous slices; each slice gets
//! its own orthographic light-space camera fitted to the slice and its own
//! square depth target. Cascade geometry is cached and only re-derived when
//! the light reports a direction change or the camera moves.
//!
//! ```text
//!  camera ─┬─ near ──── split0 ──── split1 ────── far
//!          │  cascade 0 │ cascade 1 │  cascade 2  │
//! ```

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use super::{PassContext, draw_object, with_debug_group};
use crate::backend::{RenderBackend, TargetDesc, TargetFormat, TargetId, TargetView, Viewport};
use crate::binding::{BindingContext, PassKey};
use crate::camera::Camera;
use crate::config::{MAX_CASCADES, ShadowConfig, SplitPolicy};
use crate::error::Result;
use crate::params::{ParameterBlock, TextureRef, names};
use crate::scene::{DirectionalLight, LightSnapshot, ObjectId};

// ============================================================================
// Split and fit math
// ============================================================================

/// Cascade far distances using the practical split scheme.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. The last split is exactly `far`. Without a positive `near`
/// the logarithmic term is undefined and the distribution is uniform.
#[must_use]
pub fn compute_cascade_splits(count: usize, near: f32, far: f32, lambda: f32) -> Vec<f32> {
    let n = count.clamp(1, MAX_CASCADES);
    let mut splits: Vec<f32> = (1..=n)
        .map(|i| {
            let p = i as f32 / n as f32;
            let uni_split = near + (far - near) * p;
            if near <= 0.0 {
                return uni_split;
            }
            let log_split = near * (far / near).powf(p);
            lambda * log_split + (1.0 - lambda) * uni_split
        })
        .collect();
    splits[n - 1] = far;
    splits
}

/// Cascade far distances for a split policy and camera clip range.
///
/// Returns `None` when the range cannot be split into non-empty slices: a
/// clip range that is not positive and finite, a practical range that ends
/// inside the near plane, or fixed distances at or before `near`.
pub fn cascade_splits(policy: &SplitPolicy, count: usize, near: f32, far: f32) -> Option<Vec<f32>> {
    if !(near.is_finite() && far.is_finite()) || near <= 0.0 || far <= near {
        return None;
    }
    match policy {
        SplitPolicy::Practical {
            lambda,
            max_distance,
        } => {
            let far = far.min(*max_distance);
            (far > near).then(|| compute_cascade_splits(count, near, far, *lambda))
        }
        SplitPolicy::Fixed { distances } => {
            let splits: Vec<f32> = distances.iter().take(count).copied().collect();
            let mut previous = near;
            for &d in &splits {
                if d <= previous {
                    return None;
                }
                previous = d;
            }
            Some(splits)
        }
    }
}

/// Rotation-only view looking along `direction`.
///
/// Keeping the light view free of translation makes the texel grid fixed in
/// world space, so snapped bounds do not shimmer as the camera moves.
pub fn light_view(direction: Vec3) -> Mat4 {
    let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let up = if dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
    Mat4::look_to_rh(Vec3::ZERO, dir, up)
}

/// Orthographic projection enclosing `corners` in light space.
///
/// The x/y bounds are snapped outward to the texel grid of a
/// `resolution`-sized map, which grows them by less than one texel per side.
/// The near plane is pulled `caster_distance` towards the light so casters
/// outside the slice still land in the map.
#[must_use]
pub fn fit_cascade_projection(
    view: Mat4,
    corners: &[Vec3; 8],
    resolution: u32,
    caster_distance: f32,
) -> Mat4 {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for c in corners {
        let ls = view.transform_point3(*c);
        min = min.min(ls);
        max = max.max(ls);
    }

    let texel_x = (max.x - min.x) / resolution as f32;
    let texel_y = (max.y - min.y) / resolution as f32;
    if texel_x > 0.0 {
        min.x = (min.x / texel_x).floor() * texel_x;
        max.x = (max.x / texel_x).ceil() * texel_x;
    }
    if texel_y > 0.0 {
        min.y = (min.y / texel_y).floor() * texel_y;
        max.y = (max.y / texel_y).ceil() * texel_y;
    }

    // Light looks down -Z: max.z is closest to the light.
    Mat4::orthographic_rh(
        min.x,
        max.x,
        min.y,
        max.y,
        -(max.z + caster_distance),
        -min.z,
    )
}

/// Maps clip space to shadow-map uv: x, y from [-1, 1] to [0, 1] with y flipped.
pub fn shadow_uv_bias() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

// ============================================================================
// Cascades
// ============================================================================

/// One slice of the cascade set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowCascade {
    pub view: Mat4,
    pub projection: Mat4,
    pub depth: TargetId,
    /// Camera-space distance where the slice starts.
    pub near: f32,
    /// Camera-space distance where the slice ends.
    pub far: f32,
}

impl ShadowCascade {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Copy of the cascade state handed to bindings each frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowSnapshot {
    /// Per-cascade light view-projection.
    pub view_projections: Vec<Mat4>,
    /// Per-cascade world to shadow-map uv, i.e. bias * view-projection.
    pub matrices: Vec<Mat4>,
    pub textures: Vec<TargetView>,
    pub far_distances: Vec<f32>,
    pub resolution: u32,
}

impl ShadowSnapshot {
    pub fn texture_refs(&self) -> Vec<TextureRef> {
        self.textures.iter().copied().map(TextureRef::Target).collect()
    }

    /// `(1 / resolution, 1, 1, 1)`.
    pub fn texel_size(&self) -> Vec4 {
        let texel = if self.resolution > 0 {
            1.0 / self.resolution as f32
        } else {
            1.0
        };
        Vec4::new(texel, 1.0, 1.0, 1.0)
    }

    /// Cascade far distances packed in a vec4, unused lanes set to 1.
    pub fn cascade_distances(&self) -> Vec4 {
        let mut lanes = [1.0; MAX_CASCADES];
        for (lane, d) in lanes.iter_mut().zip(&self.far_distances) {
            *lane = *d;
        }
        Vec4::from_array(lanes)
    }
}

/// Derives, caches and renders the shadow cascades.
pub struct CascadedShadowPipeline {
    config: ShadowConfig,
    cascades: Vec<ShadowCascade>,
    dirty: Rc<Cell<bool>>,
    last_camera: Option<Camera>,
    recomputes: usize,
}

impl CascadedShadowPipeline {
    /// Name the pipeline's light listener is registered under.
    pub const LISTENER: &'static str = "shadow-cascades";

    /// Allocates one depth target per cascade.
    pub fn new(backend: &mut dyn RenderBackend, config: &ShadowConfig) -> Result<Self> {
        let mut cascades = Vec::with_capacity(config.cascade_count);
        for i in 0..config.cascade_count {
            let depth = backend.create_target(&TargetDesc::square(
                format!("shadow-cascade-{i}"),
                config.resolution,
                TargetFormat::Depth,
            ))?;
            cascades.push(ShadowCascade {
                view: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                depth,
                near: 0.0,
                far: 0.0,
            });
        }
        log::info!(
            "shadow pipeline: {} cascades at {}x{}",
            config.cascade_count,
            config.resolution,
            config.resolution
        );
        Ok(Self {
            config: config.clone(),
            cascades,
            dirty: Rc::new(Cell::new(true)),
            last_camera: None,
            recomputes: 0,
        })
    }

    /// Subscribes to direction changes of `light`.
    pub fn watch_light(&self, light: &mut DirectionalLight) {
        let dirty = self.dirty.clone();
        light.add_listener(Self::LISTENER, move |_| dirty.set(true));
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Re-derives cascade geometry if the light changed or the camera moved.
    ///
    /// Returns whether anything was recomputed. A camera whose clip range
    /// cannot be split keeps the cached cascades.
    pub fn update(&mut self, camera: &Camera, light: &LightSnapshot) -> bool {
        if !self.dirty.get() && self.last_camera.as_ref() == Some(camera) {
            return false;
        }

        let Some(splits) = cascade_splits(
            &self.config.split,
            self.cascades.len(),
            camera.near,
            camera.far,
        ) else {
            log::warn!(
                "cannot split clip range {}..{} into {} cascades, keeping previous cascades",
                camera.near,
                camera.far,
                self.cascades.len()
            );
            self.dirty.set(false);
            self.last_camera = Some(*camera);
            return false;
        };
        let view = light_view(light.direction);
        let mut near = camera.near;
        for (cascade, far) in self.cascades.iter_mut().zip(splits) {
            let corners = camera.frustum_slice_corners(near, far);
            cascade.view = view;
            cascade.projection = fit_cascade_projection(
                view,
                &corners,
                self.config.resolution,
                self.config.caster_distance,
            );
            cascade.near = near;
            cascade.far = far;
            near = far;
        }

        self.dirty.set(false);
        self.last_camera = Some(*camera);
        self.recomputes += 1;
        log::debug!("recomputed {} shadow cascades", self.cascades.len());
        true
    }

    /// Renders every cascade's depth map.
    ///
    /// The viewport is restored afterwards, also when a draw fails.
    pub fn render(
        &self,
        backend: &mut dyn RenderBackend,
        ctx: &PassContext<'_>,
        visible: &[ObjectId],
    ) -> Result<usize> {
        let saved = backend.viewport();
        let result = self.render_cascades(backend, ctx, visible);
        backend.set_viewport(saved);
        result
    }

    fn render_cascades(
        &self,
        backend: &mut dyn RenderBackend,
        ctx: &PassContext<'_>,
        visible: &[ObjectId],
    ) -> Result<usize> {
        let mut draws = 0;
        for (i, cascade) in self.cascades.iter().enumerate() {
            let pass = PassKey::shadow_cascade(i);
            draws += with_debug_group(backend, pass.as_str(), |backend| {
                backend.bind_targets(&[], Some(cascade.depth.view()));
                backend.set_viewport(Viewport::square(self.config.resolution));
                backend.clear_depth(1.0);

                let mut draws = 0;
                for object in visible.iter().filter_map(|id| ctx.scene.get(*id)) {
                    if object.casts_shadows {
                        draws += draw_object(backend, ctx, object, &pass, 0)?;
                    }
                }
                Ok(draws)
            })?;
        }
        Ok(draws)
    }

    pub fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    pub fn cascades(&self) -> &[ShadowCascade] {
        &self.cascades
    }

    pub fn cascade(&self, index: usize) -> Option<&ShadowCascade> {
        self.cascades.get(index)
    }

    pub fn view(&self, index: usize) -> Option<Mat4> {
        self.cascade(index).map(|c| c.view)
    }

    pub fn projection(&self, index: usize) -> Option<Mat4> {
        self.cascade(index).map(|c| c.projection)
    }

    pub fn view_projection(&self, index: usize) -> Option<Mat4> {
        self.cascade(index).map(ShadowCascade::view_projection)
    }

    pub fn texture(&self, index: usize) -> Option<TargetId> {
        self.cascade(index).map(|c| c.depth)
    }

    pub fn near_distance(&self, index: usize) -> Option<f32> {
        self.cascade(index).map(|c| c.near)
    }

    pub fn far_distance(&self, index: usize) -> Option<f32> {
        self.cascade(index).map(|c| c.far)
    }

    pub fn resolution(&self) -> u32 {
        self.config.resolution
    }

    /// How many times cascade geometry has been derived.
    pub fn recompute_count(&self) -> usize {
        self.recomputes
    }

    pub fn snapshot(&self) -> ShadowSnapshot {
        let bias = shadow_uv_bias();
        ShadowSnapshot {
            view_projections: self.cascades.iter().map(|c| c.view_projection()).collect(),
            matrices: self
                .cascades
                .iter()
                .map(|c| bias * c.view_projection())
                .collect(),
            textures: self.cascades.iter().map(|c| c.depth.view()).collect(),
            far_distances: self.cascades.iter().map(|c| c.far).collect(),
            resolution: self.config.resolution,
        }
    }
}

/// Level-lifetime binding for `shadow-cascade-<cascade>`.
pub fn cascade_binding(cascade: usize) -> impl Fn(&BindingContext<'_>, &mut ParameterBlock) {
    move |ctx, params| {
        params.set_mat4(names::WORLD, ctx.object.world_matrix());
        if let Some(vp) = ctx.frame.shadows.view_projections.get(cascade) {
            params.set_mat4(names::LIGHT_VIEW_PROJECTION, *vp);
        }
    }
}
