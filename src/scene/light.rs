//! The scene's directional (sun) light.

use glam::Vec3;

/// Plain copy of the light state handed to passes and bindings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSnapshot {
    /// Normalized direction the light travels in.
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient: Vec3,
}

type DirectionListener = Box<dyn FnMut(&LightSnapshot)>;

/// A directional light whose direction changes are observable.
///
/// Dependents subscribe with [`add_listener`](Self::add_listener) and get
/// called every time the direction changes, so they can re-derive cached
/// geometry instead of polling the light each frame.
pub struct DirectionalLight {
    direction: Vec3,
    color: Vec3,
    ambient: Vec3,
    listeners: Vec<(String, DirectionListener)>,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, ambient: Vec3) -> Self {
        Self {
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
            color,
            ambient,
            listeners: Vec::new(),
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    /// Sets the light direction and notifies listeners if it changed.
    ///
    /// Zero-length directions are ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        let Some(direction) = direction.try_normalize() else {
            log::warn!("ignoring zero-length light direction");
            return;
        };
        if direction == self.direction {
            return;
        }
        self.direction = direction;
        self.notify();
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    /// Subscribes `callback` to direction changes under `name`.
    ///
    /// A listener registered under an existing name replaces the old one.
    pub fn add_listener<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnMut(&LightSnapshot) + 'static,
    {
        let name = name.into();
        self.listeners.retain(|(n, _)| *n != name);
        self.listeners.push((name, Box::new(callback)));
    }

    pub fn remove_listener(&mut self, name: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(n, _)| n != name);
        self.listeners.len() != before
    }

    pub fn has_listener(&self, name: &str) -> bool {
        self.listeners.iter().any(|(n, _)| n == name)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn snapshot(&self) -> LightSnapshot {
        LightSnapshot {
            direction: self.direction,
            color: self.color,
            ambient: self.ambient,
        }
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        for (_, listener) in &mut self.listeners {
            listener(&snapshot);
        }
    }
}

impl std::fmt::Debug for DirectionalLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionalLight")
            .field("direction", &self.direction)
            .field("color", &self.color)
            .field("ambient", &self.ambient)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
