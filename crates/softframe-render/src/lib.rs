//! Softframe Render - the software frame pipeline
//!
//! This crate handles:
//! - Surface pooling sized to the current video
//! - Frame pacing against the display refresh rate
//! - Per-tick rendering, color attachment and subtitle burn-in
//! - Presentation through a display sink with flush-on-reconfig
//! - The engine event bridge and the public `VideoPipeline` control API

pub mod config;
pub mod events;
pub mod observer;
pub mod pipeline;
pub mod renderer;
pub mod scheduler;
pub mod sink;
pub mod state;
pub mod subtitle;
pub mod surface_pool;

pub use config::PipelineConfig;
pub use events::{EventBridge, EventHandler, Flow, OBSERVED_PROPERTIES};
pub use observer::{NoopObserver, PlaybackObserver};
pub use pipeline::{LoadPreset, SeekTarget, VideoPipeline};
pub use renderer::{FrameRenderer, RenderStats, RenderedFrame};
pub use scheduler::{FrameScheduler, Schedule};
pub use sink::{
    DisplaySink, FormatDescription, HostClock, MonotonicClock, PresentHandle,
    PresentationTimebase, Presenter, SampleError, SinkAdapter, SinkStats, SinkStatus,
    TimedSample, PRESENT_QUEUE_DEPTH,
};
pub use state::{PlaybackState, SharedState};
pub use subtitle::{GlyphBitmap, SubtitleCompositor, SubtitleStyle, SubtitleTrack};
pub use surface_pool::{
    HeapAllocator, PoolConfig, PoolStats, PooledSurface, SurfaceAllocator, SurfacePool,
};
