//! Error types for softframe.

use thiserror::Error;

/// Errors surfaced by the pipeline's public control API.
///
/// Only start-time failures cross this boundary; steady-state failures are
/// logged and absorbed by the stage that hit them.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("failed to create decode engine: {0}")]
    EngineCreate(String),

    #[error("failed to initialize decode engine: {0}")]
    EngineInit(String),

    #[error("failed to create render context: {0}")]
    RenderContext(String),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("display sink unavailable")]
    SinkUnavailable,

    #[error("engine rejected {command}: {reason}")]
    Command { command: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline control operations.
pub type Result<T> = std::result::Result<T, RendererError>;

/// Per-frame surface failures. Never fatal: the frame is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("zero-sized surface requested ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },

    #[error("row stride {stride} is smaller than {min_stride} for width {width}")]
    StrideTooSmall {
        stride: usize,
        min_stride: usize,
        width: u32,
    },

    #[error("backing buffer holds {len} bytes, {required} required")]
    BufferTooSmall { len: usize, required: usize },

    #[error("allocation of {width}x{height} surface failed: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("surface pool exhausted ({cap} live surfaces)")]
    PoolExhausted { cap: usize },
}
