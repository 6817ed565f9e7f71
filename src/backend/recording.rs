//! Headless backend that records commands instead of executing them.

use std::collections::BTreeMap;

use glam::Vec4;

use super::{
    DrawCommand, DrawRequest, FullscreenRequest, RenderBackend, TargetDesc, TargetId, TargetView,
    Viewport,
};
use crate::binding::PassKey;
use crate::error::{RenderError, Result};
use crate::params::ParameterBlock;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateTarget { id: TargetId, desc: TargetDesc },
    SetViewport(Viewport),
    BindTargets {
        color: Vec<TargetView>,
        depth: Option<TargetView>,
    },
    ClearColor(Vec4),
    ClearDepth(f32),
    Draw(DrawCommand),
    Fullscreen {
        label: String,
        params: ParameterBlock,
    },
    PushDebugGroup(String),
    PopDebugGroup,
    Submit,
}

/// A [`RenderBackend`] that logs every call.
///
/// Used by tests to assert on pass order, draw counts and bound parameters,
/// and by tooling that wants a dry run of a frame.
#[derive(Debug)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    targets: BTreeMap<TargetId, TargetDesc>,
    viewport: Viewport,
    next_target: u32,
    max_target_size: Option<u32>,
    draws: usize,
    submits: usize,
}

impl RecordingBackend {
    /// Creates a backend whose default viewport is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            targets: BTreeMap::new(),
            viewport: Viewport::new(width, height),
            next_target: 0,
            max_target_size: None,
            draws: 0,
            submits: 0,
        }
    }

    /// Makes `create_target` fail for targets larger than `size`.
    pub fn with_max_target_size(mut self, size: u32) -> Self {
        self.max_target_size = Some(size);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forgets recorded commands; targets and counters are kept.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn target(&self, id: TargetId) -> Option<&TargetDesc> {
        self.targets.get(&id)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Total mesh draws since creation.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    pub fn submit_count(&self) -> usize {
        self.submits
    }

    /// Recorded mesh draws, in issue order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draws_for_pass(&self, pass: &PassKey) -> usize {
        self.draws().filter(|d| d.pass == *pass).count()
    }

    pub fn draws_in_namespace(&self, prefix: &str) -> usize {
        self.draws()
            .filter(|d| d.pass.as_str().starts_with(prefix))
            .count()
    }

    /// Labels of the fullscreen passes, in issue order.
    pub fn fullscreen_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Fullscreen { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Parameters of the most recent fullscreen pass labelled `label`.
    pub fn fullscreen_params(&self, label: &str) -> Option<&ParameterBlock> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::Fullscreen { label: l, params } if l == label => Some(params),
            _ => None,
        })
    }

    /// Labels of the top-level debug groups, in issue order.
    pub fn debug_groups(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::PushDebugGroup(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TargetId> {
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(RenderError::ResourceCreation(format!(
                "target '{}' has zero extent",
                desc.label
            )));
        }
        if let Some(max) = self.max_target_size {
            if desc.width > max || desc.height > max {
                return Err(RenderError::ResourceCreation(format!(
                    "target '{}' ({}x{}) exceeds the {max} texel limit",
                    desc.label, desc.width, desc.height
                )));
            }
        }
        let id = TargetId::new(self.next_target);
        self.next_target += 1;
        self.targets.insert(id, desc.clone());
        self.commands.push(Command::CreateTarget {
            id,
            desc: desc.clone(),
        });
        Ok(id)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(Command::SetViewport(viewport));
    }

    fn bind_targets(&mut self, color: &[TargetView], depth: Option<TargetView>) {
        self.commands.push(Command::BindTargets {
            color: color.to_vec(),
            depth,
        });
    }

    fn clear_color(&mut self, color: Vec4) {
        self.commands.push(Command::ClearColor(color));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.commands.push(Command::ClearDepth(depth));
    }

    fn draw(&mut self, request: &DrawRequest<'_>) -> Result<()> {
        self.draws += 1;
        self.commands.push(Command::Draw(request.to_command()));
        Ok(())
    }

    fn draw_fullscreen(&mut self, request: &FullscreenRequest<'_>) -> Result<()> {
        self.commands.push(Command::Fullscreen {
            label: request.label.to_owned(),
            params: request.params.clone(),
        });
        Ok(())
    }

    fn push_debug_group(&mut self, label: &str) {
        self.commands.push(Command::PushDebugGroup(label.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.commands.push(Command::PopDebugGroup);
    }

    fn submit(&mut self) -> Result<()> {
        self.submits += 1;
        self.commands.push(Command::Submit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TargetFormat;

    #[test]
    fn oversized_targets_fail() {
        let mut backend = RecordingBackend::new(800, 600).with_max_target_size(2048);
        let err = backend
            .create_target(&TargetDesc::square("shadow", 4096, TargetFormat::Depth))
            .unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation(_)));
        assert!(
            backend
                .create_target(&TargetDesc::square("shadow", 2048, TargetFormat::Depth))
                .is_ok()
        );
    }

    #[test]
    fn viewport_changes_are_recorded() {
        let mut backend = RecordingBackend::new(800, 600);
        assert_eq!(backend.viewport(), Viewport::new(800, 600));
        backend.set_viewport(Viewport::square(256));
        assert_eq!(backend.viewport(), Viewport::square(256));
        assert_eq!(
            backend.commands(),
            &[Command::SetViewport(Viewport::square(256))]
        );
    }
}
