//! Error types for the engine boundary.

use thiserror::Error;

/// Errors reported by a decode engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The engine returned a negative status code.
    #[error("{context} failed with status {code}")]
    Status { code: i32, context: String },

    /// The property does not exist or is not available yet.
    #[error("property unavailable: {0}")]
    PropertyUnavailable(String),

    /// The property exists but cannot be read in the requested format.
    #[error("property {name} cannot be read as {format}")]
    FormatMismatch { name: String, format: &'static str },

    /// The render target does not fit the requested layout.
    #[error("invalid render target: {0}")]
    InvalidTarget(String),

    /// The engine handle has already been destroyed.
    #[error("engine has been destroyed")]
    Destroyed,
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
