//! Synthetic decode engine that renders moving color bars.
//!
//! Behaves like a real engine at the protocol level: options before
//! initialize, observed properties produce change events, `loadfile`
//! produces a file-loaded / reconfig sequence, and frames are signalled
//! through the render context's update callback. Useful for the headless
//! binary and for exercising the pipeline without native libraries.

use crate::engine::{
    props, DecodeEngine, EngineEvent, PropertyFormat, PropertyValue, RenderContext,
    SoftwareTarget, UpdateCallback, UpdateFlags,
};
use crate::error::{EngineError, EngineResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use softframe_core::VideoDimensions;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Behaviour of a synthetic engine.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Video size reported after `loadfile`.
    pub video_size: VideoDimensions,
    /// Duration reported after `loadfile`, in seconds.
    pub duration: f64,
    /// Color tags reported after `loadfile` (primaries, gamma, matrix).
    pub color_tags: Option<(String, String, String)>,
    /// Fail `initialize()`.
    pub fail_initialize: bool,
    /// Fail `create_render_context()`.
    pub fail_render_context: bool,
    /// `update()` reports a pending frame once and clears it.
    pub consuming_update: bool,
    /// `wait_event` sleeps its full timeout before looking at the queue,
    /// so neither `wakeup` nor new events cut a wait short.
    pub uninterruptible_wait: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            video_size: VideoDimensions::new(1920, 1080),
            duration: 60.0,
            color_tags: Some(("bt.709".into(), "bt.1886".into(), "bt.709".into())),
            fail_initialize: false,
            fail_render_context: false,
            consuming_update: false,
            uninterruptible_wait: false,
        }
    }
}

#[derive(Default)]
struct EngineState {
    options: HashMap<String, String>,
    properties: HashMap<String, PropertyValue>,
    observed: HashSet<String>,
    commands: Vec<Vec<String>>,
    initialized: bool,
}

struct Inner {
    config: SyntheticConfig,
    state: Mutex<EngineState>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    update_callback: Mutex<Option<UpdateCallback>>,
    pending_frames: AtomicU64,
    rendered_frames: AtomicU64,
    failing_renders: AtomicU32,
    signals_in_render: AtomicU32,
    destroyed: AtomicBool,
}

/// A decode engine that produces test patterns.
///
/// Cloning yields another handle to the same engine, so a test can keep
/// driving the engine after handing it to a pipeline.
#[derive(Clone)]
pub struct SyntheticEngine {
    inner: Arc<Inner>,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticConfig) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(EngineState::default()),
                events_tx,
                events_rx,
                update_callback: Mutex::new(None),
                pending_frames: AtomicU64::new(0),
                rendered_frames: AtomicU64::new(0),
                failing_renders: AtomicU32::new(0),
                signals_in_render: AtomicU32::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// A factory closure handing out this engine.
    pub fn factory(&self) -> impl Fn() -> EngineResult<Arc<dyn DecodeEngine>> + Send + Sync {
        let engine = self.clone();
        move || Ok(Arc::new(engine.clone()) as Arc<dyn DecodeEngine>)
    }

    /// Change the decoded size, as a stream switch or ABR step would.
    pub fn reconfigure(&self, width: u32, height: u32) {
        {
            let mut state = self.inner.state.lock();
            state
                .properties
                .insert(props::DWIDTH.into(), PropertyValue::Int64(width as i64));
            state
                .properties
                .insert(props::DHEIGHT.into(), PropertyValue::Int64(height as i64));
        }
        debug!(width, height, "synthetic engine reconfigured");
        self.emit(EngineEvent::VideoReconfig);
        self.signal_frame();
    }

    /// Report new color tags for the stream.
    pub fn set_color_tags(
        &self,
        primaries: &str,
        gamma: &str,
        matrix: &str,
        sig_peak: Option<f64>,
    ) {
        self.store_property(props::PRIMARIES, PropertyValue::String(primaries.into()));
        self.store_property(props::GAMMA, PropertyValue::String(gamma.into()));
        self.store_property(props::COLORMATRIX, PropertyValue::String(matrix.into()));
        let peak = sig_peak.map_or(PropertyValue::None, PropertyValue::Double);
        self.store_property(props::SIG_PEAK, peak);
    }

    /// Advance playback by `dt` seconds and signal a new frame.
    pub fn advance(&self, dt: f64) {
        let (paused, speed, pos, duration) = {
            let state = self.inner.state.lock();
            let get = |name: &str| state.properties.get(name).cloned();
            (
                get(props::PAUSE).and_then(|v| v.as_bool()).unwrap_or(false),
                get(props::SPEED).and_then(|v| v.as_f64()).unwrap_or(1.0),
                get(props::TIME_POS).and_then(|v| v.as_f64()),
                get(props::DURATION).and_then(|v| v.as_f64()),
            )
        };
        let Some(pos) = pos else {
            return;
        };
        if paused {
            return;
        }
        let mut next = pos + dt * speed;
        if let Some(duration) = duration {
            next = next.min(duration);
        }
        self.store_property(props::TIME_POS, PropertyValue::Double(next));
        self.signal_frame();
    }

    /// Mark a frame as pending and invoke the update callback.
    pub fn signal_frame(&self) {
        self.inner.pending_frames.fetch_add(1, Ordering::AcqRel);
        let callback = self.inner.update_callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Push an arbitrary event into the queue.
    pub fn push_event(&self, event: EngineEvent) {
        self.emit(event);
    }

    /// Emit an engine log line.
    pub fn log(&self, level: &str, text: &str) {
        self.emit(EngineEvent::LogMessage {
            level: level.into(),
            prefix: "synthetic".into(),
            text: text.into(),
        });
    }

    /// Signal another frame from inside each of the next `count` render
    /// calls, as a decoder finishing a frame mid-render would.
    pub fn signal_during_renders(&self, count: u32) {
        self.inner.signals_in_render.store(count, Ordering::Release);
    }

    /// Make the next `count` render calls fail.
    pub fn fail_next_renders(&self, count: u32) {
        self.inner.failing_renders.store(count, Ordering::Release);
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().commands.clone()
    }

    /// Value of a startup option.
    pub fn option(&self, name: &str) -> Option<String> {
        self.inner.state.lock().options.get(name).cloned()
    }

    /// Raw property value, bypassing format conversion.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.inner.state.lock().properties.get(name).cloned()
    }

    /// Whether an update callback is currently installed.
    pub fn has_update_callback(&self) -> bool {
        self.inner.update_callback.lock().is_some()
    }

    pub fn rendered_frames(&self) -> u64 {
        self.inner.rendered_frames.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    fn emit(&self, event: EngineEvent) {
        // The receiver lives as long as `inner`, so this cannot fail.
        let _ = self.inner.events_tx.send(event);
    }

    fn store_property(&self, name: &str, value: PropertyValue) {
        let observed = {
            let mut state = self.inner.state.lock();
            state.properties.insert(name.to_string(), value.clone());
            state.observed.contains(name)
        };
        if observed {
            self.emit(EngineEvent::PropertyChange {
                name: name.to_string(),
                value,
            });
        }
    }

    fn check_alive(&self) -> EngineResult<()> {
        if self.is_destroyed() {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn load_file(&self, url: &str) {
        info!(url, "synthetic engine loading");
        let size = self.inner.config.video_size;
        self.store_property(props::PAUSED_FOR_CACHE, PropertyValue::Flag(true));
        self.store_property(props::DURATION, PropertyValue::Double(self.inner.config.duration));
        self.store_property(props::TIME_POS, PropertyValue::Double(0.0));
        self.store_property(props::SEEKABLE, PropertyValue::Flag(true));
        if let Some((primaries, gamma, matrix)) = self.inner.config.color_tags.clone() {
            self.set_color_tags(&primaries, &gamma, &matrix, None);
        }
        self.emit(EngineEvent::FileLoaded);
        self.store_property(props::PAUSED_FOR_CACHE, PropertyValue::Flag(false));
        self.reconfigure(size.width, size.height);
    }

    fn seek(&self, target: f64, mode: &str) {
        let current = self
            .property(props::TIME_POS)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let duration = self
            .property(props::DURATION)
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::MAX);
        let next = if mode == "absolute" {
            target
        } else {
            current + target
        };
        self.store_property(props::TIME_POS, PropertyValue::Double(next.clamp(0.0, duration)));
        self.signal_frame();
    }
}

impl DecodeEngine for SyntheticEngine {
    fn set_option(&self, name: &str, value: &str) -> EngineResult<()> {
        self.check_alive()?;
        let mut state = self.inner.state.lock();
        if state.initialized {
            return Err(EngineError::Status {
                code: -1,
                context: format!("set_option({name}) after initialize"),
            });
        }
        state.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn initialize(&self) -> EngineResult<()> {
        self.check_alive()?;
        if self.inner.config.fail_initialize {
            return Err(EngineError::Status {
                code: -1,
                context: "initialize".into(),
            });
        }
        let mut state = self.inner.state.lock();
        state.initialized = true;
        state
            .properties
            .insert(props::PAUSE.into(), PropertyValue::Flag(false));
        state
            .properties
            .insert(props::SPEED.into(), PropertyValue::Double(1.0));
        Ok(())
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> EngineResult<()> {
        self.check_alive()?;
        self.store_property(name, value);
        Ok(())
    }

    fn get_property(&self, name: &str, format: PropertyFormat) -> EngineResult<PropertyValue> {
        self.check_alive()?;
        let value = self
            .property(name)
            .ok_or_else(|| EngineError::PropertyUnavailable(name.to_string()))?;
        value.convert(format).ok_or_else(|| EngineError::FormatMismatch {
            name: name.to_string(),
            format: format.name(),
        })
    }

    fn observe_property(&self, name: &str, _format: PropertyFormat) -> EngineResult<()> {
        self.check_alive()?;
        self.inner.state.lock().observed.insert(name.to_string());
        Ok(())
    }

    fn command_async(&self, args: &[&str]) -> EngineResult<()> {
        self.check_alive()?;
        self.inner
            .state
            .lock()
            .commands
            .push(args.iter().map(|s| s.to_string()).collect());

        match args {
            ["loadfile", url, ..] => self.load_file(url),
            ["seek", target, rest @ ..] => {
                let target: f64 = target.parse().map_err(|_| EngineError::Status {
                    code: -4,
                    context: format!("seek target {target}"),
                })?;
                let mode = rest.first().copied().unwrap_or("relative");
                self.seek(target, mode);
            }
            ["cycle", "pause"] => {
                let paused = self
                    .property(props::PAUSE)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.store_property(props::PAUSE, PropertyValue::Flag(!paused));
            }
            ["stop", ..] => self.emit(EngineEvent::EndFile),
            ["quit", ..] => self.emit(EngineEvent::Shutdown),
            _ => {}
        }
        Ok(())
    }

    fn create_render_context(&self) -> EngineResult<Box<dyn RenderContext>> {
        self.check_alive()?;
        if self.inner.config.fail_render_context {
            return Err(EngineError::Status {
                code: -12,
                context: "render context creation".into(),
            });
        }
        Ok(Box::new(SyntheticRenderContext {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn wait_event(&self, timeout: Duration) -> EngineEvent {
        if self.is_destroyed() {
            return EngineEvent::Shutdown;
        }
        if self.inner.config.uninterruptible_wait {
            std::thread::sleep(timeout);
            return match self.inner.events_rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => EngineEvent::None,
                Err(TryRecvError::Disconnected) => EngineEvent::Shutdown,
            };
        }
        match self.inner.events_rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => EngineEvent::None,
            Err(RecvTimeoutError::Disconnected) => EngineEvent::Shutdown,
        }
    }

    fn wakeup(&self) {
        self.emit(EngineEvent::None);
    }

    fn destroy(&self) {
        if !self.inner.destroyed.swap(true, Ordering::AcqRel) {
            *self.inner.update_callback.lock() = None;
            info!("synthetic engine destroyed");
        }
    }
}

struct SyntheticRenderContext {
    inner: Arc<Inner>,
}

impl RenderContext for SyntheticRenderContext {
    fn set_update_callback(&mut self, callback: Option<UpdateCallback>) {
        *self.inner.update_callback.lock() = callback;
    }

    fn update(&mut self) -> UpdateFlags {
        let pending = if self.inner.config.consuming_update {
            self.inner.pending_frames.swap(0, Ordering::AcqRel)
        } else {
            self.inner.pending_frames.load(Ordering::Acquire)
        };
        if pending > 0 {
            UpdateFlags::FRAME
        } else {
            UpdateFlags::NONE
        }
    }

    fn render_sw(&mut self, target: SoftwareTarget<'_>) -> EngineResult<()> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(EngineError::Destroyed);
        }
        if target.format != "bgr0" {
            return Err(EngineError::InvalidTarget(format!(
                "unsupported format {}",
                target.format
            )));
        }
        let row_bytes = target.width as usize * 4;
        if target.stride < row_bytes || target.pixels.len() < target.stride * target.height as usize
        {
            return Err(EngineError::InvalidTarget(format!(
                "{}x{} with stride {} over {} bytes",
                target.width,
                target.height,
                target.stride,
                target.pixels.len()
            )));
        }

        let failing = self.inner.failing_renders.load(Ordering::Acquire);
        if failing > 0 {
            self.inner.failing_renders.store(failing - 1, Ordering::Release);
            return Err(EngineError::Status {
                code: -1,
                context: "render".into(),
            });
        }

        // Consume one pending frame; saturate at zero.
        let _ = self
            .inner
            .pending_frames
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        let frame = self.inner.rendered_frames.fetch_add(1, Ordering::AcqRel);

        draw_bars(target, (frame * 4) as u32);
        let signal = self
            .inner
            .signals_in_render
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if signal {
            self.inner.pending_frames.fetch_add(1, Ordering::AcqRel);
            let callback = self.inner.update_callback.lock().clone();
            if let Some(callback) = callback {
                callback();
            }
        }
        Ok(())
    }
}

/// Moving color bars in BGRA.
fn draw_bars(mut target: SoftwareTarget<'_>, phase: u32) {
    const BARS: [[u8; 4]; 8] = [
        [255, 255, 255, 255],
        [0, 255, 255, 255],
        [255, 255, 0, 255],
        [0, 255, 0, 255],
        [255, 0, 255, 255],
        [0, 0, 255, 255],
        [255, 0, 0, 255],
        [0, 0, 0, 255],
    ];
    let width = target.width.max(1);
    let row_bytes = target.width as usize * 4;
    for y in 0..target.height as usize {
        let start = y * target.stride;
        let row: &mut [[u8; 4]] =
            bytemuck::cast_slice_mut(&mut target.pixels[start..start + row_bytes]);
        for (x, px) in row.iter_mut().enumerate() {
            let bar = (((x as u32).wrapping_add(phase) % width) * 8 / width) as usize;
            *px = BARS[bar];
        }
    }
}
