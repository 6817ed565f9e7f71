//! Renderer configuration loaded once at level init.
//!
//! ```json
//! {
//!   "shadows": { "cascade_count": 3, "resolution": 2048,
//!                "split": { "kind": "practical", "lambda": 0.6, "max_distance": 300.0 } },
//!   "probes": [{ "position": [0.0, 10.0, 35.0], "resolution": 256 }],
//!   "editor_mode": false
//! }
//! ```
//!
//! Every field has a default, so an empty object is a valid configuration.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::binding::MissingBindingPolicy;
use crate::error::{RenderError, Result};

/// Upper bound on shadow cascades; matches the size of the cascade-distance vec4.
pub const MAX_CASCADES: usize = 4;

/// How the camera depth range is partitioned between shadow cascades.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Blend of uniform and logarithmic splits. `lambda = 0` is uniform,
    /// `lambda = 1` fully logarithmic. Shadows end at `max_distance`.
    Practical { lambda: f32, max_distance: f32 },
    /// Explicit far distance of each cascade.
    Fixed { distances: Vec<f32> },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::Practical {
            lambda: 0.75,
            max_distance: 250.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub cascade_count: usize,
    /// Width and height of each cascade's depth map in texels.
    pub resolution: u32,
    pub split: SplitPolicy,
    /// How far behind each slice shadow casters are still captured.
    pub caster_distance: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            cascade_count: 3,
            resolution: 4096,
            split: SplitPolicy::default(),
            caster_distance: 200.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub position: Vec3,
    /// Cube face size in texels.
    pub resolution: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 10.0, 35.0),
            resolution: 256,
        }
    }
}

/// Editor-only knobs read by the debug overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugToggles {
    pub wireframe: bool,
    pub dynamic_tessellation: bool,
    pub tessellation_factor: f32,
    pub wind_strength: f32,
    pub wind_frequency: f32,
    pub gust_distance: f32,
}

impl Default for DebugToggles {
    fn default() -> Self {
        Self {
            wireframe: false,
            dynamic_tessellation: true,
            tessellation_factor: 1.0,
            wind_strength: 1.0,
            wind_frequency: 0.5,
            gust_distance: 40.0,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub shadows: ShadowConfig,
    /// Light probes to bake. Ignored when the scene disables probes.
    pub probes: Vec<ProbeConfig>,
    pub probe_near: f32,
    pub probe_far: f32,
    /// Far plane of the main camera.
    pub camera_far: f32,
    /// Enables the debug overlay pass.
    pub editor_mode: bool,
    /// Draw objects without parameters instead of aborting the pass when a
    /// binding is missing.
    pub allow_missing_bindings: bool,
    pub toggles: DebugToggles,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadows: ShadowConfig::default(),
            probes: vec![ProbeConfig::default()],
            probe_near: 0.1,
            probe_far: 100_000.0,
            camera_far: 1000.0,
            editor_mode: false,
            allow_missing_bindings: false,
            toggles: DebugToggles::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("loading renderer config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn missing_binding_policy(&self) -> MissingBindingPolicy {
        if self.allow_missing_bindings {
            MissingBindingPolicy::Ignore
        } else {
            MissingBindingPolicy::Error
        }
    }

    /// Checks the values serde cannot: ranges, ordering and sizes.
    pub fn validate(&self) -> Result<()> {
        let shadows = &self.shadows;
        if shadows.cascade_count == 0 || shadows.cascade_count > MAX_CASCADES {
            return Err(RenderError::Configuration(format!(
                "cascade_count must be in 1..={MAX_CASCADES}, got {}",
                shadows.cascade_count
            )));
        }
        if shadows.resolution == 0 {
            return Err(RenderError::Configuration(
                "shadow resolution must be non-zero".into(),
            ));
        }
        if shadows.caster_distance < 0.0 {
            return Err(RenderError::Configuration(
                "caster_distance must not be negative".into(),
            ));
        }

        match &shadows.split {
            SplitPolicy::Practical {
                lambda,
                max_distance,
            } => {
                if !(0.0..=1.0).contains(lambda) {
                    return Err(RenderError::Configuration(format!(
                        "split lambda must be in 0..=1, got {lambda}"
                    )));
                }
                if *max_distance <= 0.0 {
                    return Err(RenderError::Configuration(
                        "split max_distance must be positive".into(),
                    ));
                }
            }
            SplitPolicy::Fixed { distances } => {
                if distances.len() != shadows.cascade_count {
                    return Err(RenderError::Configuration(format!(
                        "{} fixed split distances for {} cascades",
                        distances.len(),
                        shadows.cascade_count
                    )));
                }
                let mut previous = 0.0;
                for &d in distances {
                    if d <= previous {
                        return Err(RenderError::Configuration(
                            "fixed split distances must be positive and strictly increasing"
                                .into(),
                        ));
                    }
                    previous = d;
                }
            }
        }

        if self.probes.iter().any(|p| p.resolution == 0) {
            return Err(RenderError::Configuration(
                "probe resolution must be non-zero".into(),
            ));
        }
        if self.probe_near <= 0.0 || self.probe_far <= self.probe_near {
            return Err(RenderError::Configuration(format!(
                "invalid probe clip range {}..{}",
                self.probe_near, self.probe_far
            )));
        }
        if self.camera_far <= 0.0 {
            return Err(RenderError::Configuration(
                "camera_far must be positive".into(),
            ));
        }
        Ok(())
    }
}
