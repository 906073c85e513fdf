//! The decode engine boundary.
//!
//! A native media engine is an opaque handle with a string-keyed
//! option/property protocol, async commands, a blocking event queue and a
//! render context that can draw into caller-provided memory. These traits
//! are the only view of it the pipeline gets; any pointer or format-tag
//! marshalling lives in the type that implements them.

use crate::error::EngineResult;
use softframe_core::Surface;
use std::sync::Arc;
use std::time::Duration;

/// Property names the pipeline reads or observes.
pub mod props {
    pub const DWIDTH: &str = "dwidth";
    pub const DHEIGHT: &str = "dheight";
    pub const DURATION: &str = "duration";
    pub const TIME_POS: &str = "time-pos";
    pub const PAUSE: &str = "pause";
    pub const PAUSED_FOR_CACHE: &str = "paused-for-cache";
    pub const SEEKABLE: &str = "seekable";
    pub const SPEED: &str = "speed";
    pub const PRIMARIES: &str = "video-params/primaries";
    pub const GAMMA: &str = "video-params/gamma";
    pub const COLORMATRIX: &str = "video-params/colormatrix";
    pub const SIG_PEAK: &str = "video-params/sig-peak";
    pub const HTTP_HEADER_FIELDS: &str = "http-header-fields";
}

/// Format a property is requested or observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyFormat {
    Flag,
    Int64,
    Double,
    String,
}

impl PropertyFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::String => "string",
        }
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Property exists but is currently unset.
    None,
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::Double(v) if v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the requested format if the value allows it.
    pub fn convert(&self, format: PropertyFormat) -> Option<Self> {
        match format {
            PropertyFormat::Flag => self.as_bool().map(Self::Flag),
            PropertyFormat::Int64 => self.as_i64().map(Self::Int64),
            PropertyFormat::Double => self.as_f64().map(Self::Double),
            PropertyFormat::String => match self {
                Self::String(s) => Some(Self::String(s.clone())),
                Self::Flag(v) => Some(Self::String(if *v { "yes" } else { "no" }.to_string())),
                Self::Int64(v) => Some(Self::String(v.to_string())),
                Self::Double(v) => Some(Self::String(v.to_string())),
                Self::None => None,
            },
        }
    }
}

/// Events drained from the engine's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Spurious wakeup or wait timeout.
    None,
    /// Output video parameters changed; re-read dimensions.
    VideoReconfig,
    /// An observed property changed.
    PropertyChange { name: String, value: PropertyValue },
    /// Engine log line. `level` is a severity keyword ("error", "warn", ...).
    LogMessage {
        level: String,
        prefix: String,
        text: String,
    },
    /// A file finished loading and playback can start.
    FileLoaded,
    /// Playback of the current file ended.
    EndFile,
    /// The engine is shutting down; no more events follow.
    Shutdown,
}

/// Bitmask returned by [`RenderContext::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateFlags(pub u64);

impl UpdateFlags {
    pub const NONE: Self = Self(0);
    /// A new video frame is ready to be rendered.
    pub const FRAME: Self = Self(1);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Called by the engine, on any thread, when a new frame may be available.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Caller-owned memory the engine renders one frame into.
pub struct SoftwareTarget<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    /// Engine pixel-format tag, e.g. `"bgr0"`.
    pub format: &'static str,
    pub pixels: &'a mut [u8],
}

impl<'a> SoftwareTarget<'a> {
    /// Borrow a surface as a render target.
    pub fn for_surface(surface: &'a mut Surface) -> Self {
        Self {
            width: surface.width(),
            height: surface.height(),
            stride: surface.stride(),
            format: surface.format().engine_tag(),
            pixels: surface.data_mut(),
        }
    }
}

/// Software render context created from an engine handle.
pub trait RenderContext: Send {
    /// Install or clear the "update available" callback.
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>);

    /// Poll what work is pending.
    ///
    /// An engine may clear the flags it reports, so a caller that acts on a
    /// flag later must keep it rather than poll again.
    fn update(&mut self) -> UpdateFlags;

    /// Render the current frame into `target`.
    fn render_sw(&mut self, target: SoftwareTarget<'_>) -> EngineResult<()>;
}

/// An opaque decode engine handle.
pub trait DecodeEngine: Send + Sync {
    /// Set a startup option; only valid before [`DecodeEngine::initialize`].
    fn set_option(&self, name: &str, value: &str) -> EngineResult<()>;

    fn initialize(&self) -> EngineResult<()>;

    fn set_property(&self, name: &str, value: PropertyValue) -> EngineResult<()>;

    fn get_property(&self, name: &str, format: PropertyFormat) -> EngineResult<PropertyValue>;

    /// Ask for `PropertyChange` events for `name`.
    fn observe_property(&self, name: &str, format: PropertyFormat) -> EngineResult<()>;

    /// Dispatch a command such as `["loadfile", url, "replace"]`.
    fn command_async(&self, args: &[&str]) -> EngineResult<()>;

    fn create_render_context(&self) -> EngineResult<Box<dyn RenderContext>>;

    /// Block for at most `timeout` waiting for the next event.
    fn wait_event(&self, timeout: Duration) -> EngineEvent;

    /// Interrupt a pending [`DecodeEngine::wait_event`].
    fn wakeup(&self);

    /// Release the handle. Calls after this fail with `Destroyed`.
    fn destroy(&self);
}

/// Creates a fresh engine handle each time a pipeline starts.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> EngineResult<Arc<dyn DecodeEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> EngineResult<Arc<dyn DecodeEngine>> + Send + Sync,
{
    fn create(&self) -> EngineResult<Arc<dyn DecodeEngine>> {
        self()
    }
}
