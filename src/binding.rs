//! Per-object, per-pass parameter binding.
//!
//! Passes never write shader inputs themselves. Instead, whoever knows what a
//! pass needs registers a callback for an (object, pass key) pair in the
//! [`ParameterBindingRegistry`], and the pass invokes it immediately before
//! drawing each mesh of that object.
//!
//! ```text
//!  level init ──register──▶ ┌──────────────────────────────┐
//!  probe bake ──scope─────▶ │ (ObjectId, PassKey) → [fn..] │ ◀──invoke── passes
//!                           └──────────────────────────────┘
//! ```
//!
//! Transient passes (light-probe capture) register through a
//! [`BindingScope`], which removes everything it registered when it is
//! dropped. No capture callback can outlive the capture.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use crate::camera::Camera;
use crate::error::{RenderError, Result};
use crate::params::ParameterBlock;
use crate::passes::shadow::ShadowSnapshot;
use crate::scene::{LightSnapshot, ObjectId, RenderableObject};

/// Name of a render pass an object can be drawn in.
///
/// Keys are plain strings so the asset system can name materials after them,
/// e.g. `deferred-prepass`, `shadow-cascade-0`, `forward-probe-4`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassKey(String);

impl PassKey {
    /// Prefix shared by every light-probe capture pass.
    pub const PROBE_NAMESPACE: &'static str = "forward-probe-";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn deferred_prepass() -> Self {
        Self::new("deferred-prepass")
    }

    pub fn forward_lighting() -> Self {
        Self::new("forward-lighting")
    }

    pub fn shadow_cascade(index: usize) -> Self {
        Self(format!("shadow-cascade-{index}"))
    }

    pub fn probe_face(face: usize) -> Self {
        Self(format!("{}{face}", Self::PROBE_NAMESPACE))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key belongs to a light-probe capture.
    pub fn is_probe_scoped(&self) -> bool {
        self.0.starts_with(Self::PROBE_NAMESPACE)
    }
}

impl fmt::Display for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PassKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What happens when a pass draws an object nobody registered a binding for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingBindingPolicy {
    /// Abort the pass with [`RenderError::BindingNotFound`].
    #[default]
    Error,
    /// Draw with empty parameters.
    Ignore,
}

/// Per-frame values every binding may read.
#[derive(Clone, Debug)]
pub struct FrameData {
    pub camera: Camera,
    pub light: LightSnapshot,
    pub shadows: ShadowSnapshot,
}

/// Arguments handed to a binding callback.
pub struct BindingContext<'a> {
    pub object: &'a RenderableObject,
    pub mesh_index: usize,
    pub frame: &'a FrameData,
}

/// Opaque id of one registered binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

type BindingFn = Box<dyn Fn(&BindingContext<'_>, &mut ParameterBlock)>;

struct Entry {
    id: BindingId,
    callback: BindingFn,
}

/// Table of parameter callbacks keyed by pass and object.
///
/// Registration is additive: several callbacks may stack on the same
/// (object, pass) pair and [`invoke`](Self::invoke) calls the most recent
/// one. The registry owns no GPU resources.
#[derive(Default)]
pub struct ParameterBindingRegistry {
    table: HashMap<PassKey, HashMap<ObjectId, Vec<Entry>>>,
    next_id: u64,
    registrations: usize,
    removals: usize,
}

impl ParameterBindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `object` under `pass`.
    pub fn register<F>(&mut self, object: ObjectId, pass: PassKey, callback: F) -> BindingId
    where
        F: Fn(&BindingContext<'_>, &mut ParameterBlock) + 'static,
    {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.registrations += 1;
        log::trace!("binding {:?} registered for {:?} under '{}'", id, object, pass);
        self.table
            .entry(pass)
            .or_default()
            .entry(object)
            .or_default()
            .push(Entry {
                id,
                callback: Box::new(callback),
            });
        id
    }

    /// Calls the most recently registered callback for the context's object under `pass`.
    pub fn invoke(
        &self,
        ctx: &BindingContext<'_>,
        pass: &PassKey,
        params: &mut ParameterBlock,
    ) -> Result<()> {
        let entry = self
            .table
            .get(pass)
            .and_then(|objects| objects.get(&ctx.object.id()))
            .and_then(|entries| entries.last())
            .ok_or_else(|| RenderError::BindingNotFound {
                object: ctx.object.name().to_owned(),
                pass: pass.clone(),
            })?;
        (entry.callback)(ctx, params);
        Ok(())
    }

    pub fn contains(&self, object: ObjectId, pass: &PassKey) -> bool {
        self.table
            .get(pass)
            .and_then(|objects| objects.get(&object))
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Removes a single binding. Returns `false` if it was already gone.
    pub fn unregister(&mut self, id: BindingId) -> bool {
        let mut removed = false;
        for objects in self.table.values_mut() {
            for entries in objects.values_mut() {
                if let Some(pos) = entries.iter().position(|e| e.id == id) {
                    entries.remove(pos);
                    removed = true;
                }
            }
            objects.retain(|_, entries| !entries.is_empty());
        }
        self.table.retain(|_, objects| !objects.is_empty());
        if removed {
            self.removals += 1;
        }
        removed
    }

    /// Removes every binding registered under `pass`, for all objects.
    ///
    /// Returns how many bindings were removed.
    pub fn unregister_all(&mut self, pass: &PassKey) -> usize {
        let removed = self
            .table
            .remove(pass)
            .map(|objects| objects.values().map(Vec::len).sum())
            .unwrap_or(0);
        self.removals += removed;
        if removed > 0 {
            log::trace!("removed {} bindings under '{}'", removed, pass);
        }
        removed
    }

    /// Removes every binding owned by `object`, for all passes.
    pub fn unregister_object(&mut self, object: ObjectId) -> usize {
        let mut removed = 0;
        for objects in self.table.values_mut() {
            if let Some(entries) = objects.remove(&object) {
                removed += entries.len();
            }
        }
        self.table.retain(|_, objects| !objects.is_empty());
        self.removals += removed;
        removed
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.table
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of live bindings whose pass key starts with `prefix`.
    pub fn count_in_namespace(&self, prefix: &str) -> usize {
        self.table
            .iter()
            .filter(|(pass, _)| pass.as_str().starts_with(prefix))
            .flat_map(|(_, objects)| objects.values())
            .map(Vec::len)
            .sum()
    }

    /// Total `register` calls over the registry's lifetime.
    pub fn registrations(&self) -> usize {
        self.registrations
    }

    /// Total bindings removed over the registry's lifetime.
    pub fn removals(&self) -> usize {
        self.removals
    }

    /// Opens a scope whose registrations are removed when it ends.
    pub fn scope(&mut self) -> BindingScope<'_> {
        BindingScope {
            registry: self,
            keys: Vec::new(),
            registered: 0,
        }
    }
}

impl fmt::Debug for ParameterBindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBindingRegistry")
            .field("passes", &self.table.len())
            .field("bindings", &self.len())
            .field("registrations", &self.registrations)
            .field("removals", &self.removals)
            .finish()
    }
}

/// Registration guard for transient passes.
///
/// Every pass key registered through the scope is cleared with
/// [`ParameterBindingRegistry::unregister_all`] when the scope is closed or
/// dropped, including on early return. The scope dereferences to the
/// registry so the pass can invoke bindings while it is open.
pub struct BindingScope<'a> {
    registry: &'a mut ParameterBindingRegistry,
    keys: Vec<PassKey>,
    registered: usize,
}

impl BindingScope<'_> {
    pub fn register<F>(&mut self, object: ObjectId, pass: PassKey, callback: F) -> BindingId
    where
        F: Fn(&BindingContext<'_>, &mut ParameterBlock) + 'static,
    {
        if !self.keys.contains(&pass) {
            self.keys.push(pass.clone());
        }
        self.registered += 1;
        self.registry.register(object, pass, callback)
    }

    /// Number of bindings registered through this scope.
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Ends the scope now and returns how many bindings were removed.
    pub fn close(mut self) -> usize {
        self.release()
    }

    fn release(&mut self) -> usize {
        let mut removed = 0;
        for key in self.keys.drain(..) {
            removed += self.registry.unregister_all(&key);
        }
        removed
    }
}

impl Deref for BindingScope<'_> {
    type Target = ParameterBindingRegistry;

    fn deref(&self) -> &Self::Target {
        self.registry
    }
}

impl Drop for BindingScope<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
