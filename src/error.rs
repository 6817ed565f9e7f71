//! Error types shared by every pass and by level initialization.
//!
//! Initialization failures ([`RenderError::Configuration`],
//! [`RenderError::MissingPassMaterial`], [`RenderError::ResourceCreation`])
//! are fatal and surface to whoever builds the
//! [`FrameOrchestrator`](crate::FrameOrchestrator). Errors raised while a
//! frame is running abort only the pass that produced them; the orchestrator
//! logs them and lists them in the [`FrameReport`](crate::FrameReport).

use thiserror::Error;

use crate::binding::PassKey;

/// Everything that can go wrong while setting up or running the frame pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The level or pipeline configuration is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An object is drawn under a pass it has no material for.
    #[error("object '{object}' has no material for pass '{pass}'")]
    MissingPassMaterial {
        /// Name of the offending object.
        object: String,
        /// Pass the object was expected to support.
        pass: PassKey,
    },

    /// The binding registry was asked for a callback nobody registered.
    #[error("no parameter binding for object '{object}' under pass '{pass}'")]
    BindingNotFound {
        /// Name of the object being drawn.
        object: String,
        /// Pass key that was looked up.
        pass: PassKey,
    },

    /// The GPU backend could not produce a target or texture.
    #[error("failed to create GPU resource: {0}")]
    ResourceCreation(String),

    /// A bake was requested for a probe that is already being captured.
    #[error("light probe {probe} is already being baked")]
    ProbeBakeInProgress {
        /// Index of the probe inside its manager.
        probe: usize,
    },

    /// The renderer configuration file could not be parsed.
    #[error("invalid renderer configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The renderer configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Whether this error must halt level initialization rather than a single pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Configuration(_)
                | RenderError::ResourceCreation(_)
                | RenderError::Config(_)
                | RenderError::Io(_)
        )
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
