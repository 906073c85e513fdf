//! Softframe Core - Foundation types for the software video pipeline
//!
//! This crate provides the fundamental types used throughout softframe:
//! - Pixel surfaces and the fixed BGRA pixel format
//! - Video dimensions
//! - Integer pixel geometry
//! - Error types shared by the pipeline stages

pub mod error;
pub mod frame;
pub mod geometry;

pub use error::{RendererError, Result, SurfaceError};
pub use frame::{PixelFormat, Surface, VideoDimensions};
pub use geometry::Rect;

/// Pipeline sizing constants.
pub mod limits {
    /// Upper bound on the presentation rate regardless of display capability.
    pub const DEFAULT_MAX_FPS: u32 = 60;

    /// Idle surfaces the pool tries to keep ready.
    pub const DEFAULT_WARM_TARGET: usize = 8;

    /// Allowed range for the warm target.
    pub const WARM_TARGET_MIN: usize = 6;
    pub const WARM_TARGET_MAX: usize = 12;

    /// Maximum live pooled surfaces for one target size.
    pub const DEFAULT_POOL_HARD_CAP: usize = 16;

    /// Idle count below which the renderer asks for a top-up.
    pub const DEFAULT_LOW_WATER: usize = 2;

    /// Row alignment for heap-allocated surfaces.
    pub const STRIDE_ALIGNMENT: usize = 64;

    /// Frames at or above either dimension count as 4K.
    pub const UHD_WIDTH: u32 = 3840;
    pub const UHD_HEIGHT: u32 = 2160;
}
