//! Softframe Engine - the decode engine boundary
//!
//! This crate handles:
//! - The narrow `DecodeEngine` / `RenderContext` traits the pipeline talks to
//! - The engine event union and typed property values
//! - A synthetic engine that renders test patterns, for demos and tests

pub mod engine;
pub mod error;
pub mod synthetic;

pub use engine::{
    props, DecodeEngine, EngineEvent, EngineFactory, PropertyFormat, PropertyValue,
    RenderContext, SoftwareTarget, UpdateCallback, UpdateFlags,
};
pub use error::{EngineError, EngineResult};
pub use synthetic::{SyntheticConfig, SyntheticEngine};
