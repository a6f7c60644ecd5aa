use thiserror::Error;

use crate::render::texture::TextureId;
use crate::scene::NodeId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TextureError {
    #[error("failed to load texture '{key}': {reason}")]
    LoadFailure { key: String, reason: String },

    #[error("invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error(
        "pixel data is {got_width}x{got_height} ({got_len} bytes) but texture \
         is {width}x{height}"
    )]
    DimensionMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
        got_len: usize,
    },

    #[error("texture {0:?} is not registered")]
    NotFound(TextureId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("node {0:?} is not part of the scene graph")]
    UnknownNode(NodeId),

    #[error("moving node {child:?} under {parent:?} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },

    #[error("the root node cannot be moved")]
    RootMove,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to create task: {0}")]
    CreationFailure(String),

    #[error("failed to start task '{name}': {reason}")]
    StartFailure { name: String, reason: String },

    #[error("failed to stop task '{name}': {reason}")]
    StopFailure { name: String, reason: String },

    #[error("task '{0}' must be stopped before it is destroyed")]
    NotStopped(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CascadeError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("missing <{0}>")]
    Missing(String),

    #[error("invalid <{element}>: {reason}")]
    Invalid { element: String, reason: String },

    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

/// Fatal startup problem. The message names the missing resource.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SetupError(pub String);

impl SetupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Setup(_) => 1,
            AppError::Scheduler(_) => 2,
        }
    }
}
