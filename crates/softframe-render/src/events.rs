//! Event bridge: drains the engine's event queue into shared state.

use crate::observer::PlaybackObserver;
use crate::state::SharedState;
use softframe_core::{RendererError, Result, VideoDimensions};
use softframe_engine::{props, DecodeEngine, EngineEvent, PropertyFormat, PropertyValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Properties observed at start, with the format each is delivered in.
pub const OBSERVED_PROPERTIES: &[(&str, PropertyFormat)] = &[
    (props::DURATION, PropertyFormat::Double),
    (props::TIME_POS, PropertyFormat::Double),
    (props::PAUSE, PropertyFormat::Flag),
    (props::PAUSED_FOR_CACHE, PropertyFormat::Flag),
    (props::SEEKABLE, PropertyFormat::Flag),
    (props::SPEED, PropertyFormat::Double),
    (props::PRIMARIES, PropertyFormat::String),
    (props::GAMMA, PropertyFormat::String),
    (props::COLORMATRIX, PropertyFormat::String),
    (props::SIG_PEAK, PropertyFormat::Double),
];

/// Whether the event loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Applies engine events to shared state and the observer.
pub struct EventHandler {
    engine: Arc<dyn DecodeEngine>,
    state: Arc<SharedState>,
    observer: Arc<dyn PlaybackObserver>,
}

impl EventHandler {
    pub fn new(
        engine: Arc<dyn DecodeEngine>,
        state: Arc<SharedState>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Self {
        Self {
            engine,
            state,
            observer,
        }
    }

    pub fn handle(&self, event: EngineEvent) -> Flow {
        match event {
            EngineEvent::None => {}
            EngineEvent::VideoReconfig => self.on_reconfig(),
            EngineEvent::PropertyChange { name, value } => self.on_property(&name, &value),
            EngineEvent::LogMessage {
                level,
                prefix,
                text,
            } => log_engine_message(&level, &prefix, &text),
            EngineEvent::FileLoaded => {
                info!("file loaded");
                self.set_loading(false);
                let seekable = self
                    .engine
                    .get_property(props::SEEKABLE, PropertyFormat::Flag)
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                self.observer.on_ready_to_seek(seekable);
            }
            EngineEvent::EndFile => {
                debug!("end of file");
                self.set_loading(false);
            }
            EngineEvent::Shutdown => {
                info!("engine shutting down");
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn on_reconfig(&self) {
        let read = |name: &str| -> Option<u32> {
            match self.engine.get_property(name, PropertyFormat::Int64) {
                Ok(value) => value.as_i64().and_then(|v| u32::try_from(v).ok()),
                Err(e) => {
                    warn!(property = name, error = %e, "cannot read video size");
                    None
                }
            }
        };
        let (Some(width), Some(height)) = (read(props::DWIDTH), read(props::DHEIGHT)) else {
            return;
        };
        let dims = VideoDimensions::new(width, height);
        if self.state.set_dimensions(dims) {
            info!(width, height, "video reconfigured");
            self.state.mark_reconfig();
        }
    }

    fn on_property(&self, name: &str, value: &PropertyValue) {
        match name {
            props::DURATION => {
                let playback = self.state.update_playback(|p| p.duration = value.as_f64());
                self.observer.on_position(playback.position, playback.duration);
            }
            props::TIME_POS => {
                let Some(position) = value.as_f64() else {
                    return;
                };
                let playback = self.state.update_playback(|p| p.position = position);
                self.observer.on_position(playback.position, playback.duration);
            }
            props::PAUSE => {
                if let Some(paused) = value.as_bool() {
                    self.state.update_playback(|p| p.paused = paused);
                    self.observer.on_pause_changed(paused);
                }
            }
            props::PAUSED_FOR_CACHE => {
                if let Some(loading) = value.as_bool() {
                    self.set_loading(loading);
                }
            }
            props::SEEKABLE => {
                if let Some(seekable) = value.as_bool() {
                    self.observer.on_ready_to_seek(seekable);
                }
            }
            props::SPEED => {
                if let Some(speed) = value.as_f64() {
                    self.state.update_playback(|p| p.speed = speed);
                }
            }
            props::PRIMARIES => self.update_color(|c| c.apply_primaries(value.as_str())),
            props::GAMMA => self.update_color(|c| c.apply_transfer(value.as_str())),
            props::COLORMATRIX => self.update_color(|c| c.apply_matrix(value.as_str())),
            props::SIG_PEAK => self.update_color(|c| c.apply_signal_peak(value.as_f64())),
            other => trace!(property = other, "unhandled property change"),
        }
    }

    fn update_color<F: FnOnce(&mut softframe_color::ColorState)>(&self, f: F) {
        let color = self.state.update_color(f);
        debug!(
            primaries = color.primaries.map_or("passthrough", |p| p.name()),
            transfer = color.transfer.map_or("passthrough", |t| t.name()),
            matrix = color.matrix.map_or("passthrough", |m| m.name()),
            peak = ?color.signal_peak,
            "color state updated"
        );
    }

    fn set_loading(&self, loading: bool) {
        let mut changed = false;
        self.state.update_playback(|p| {
            changed = p.loading != loading;
            p.loading = loading;
        });
        if changed {
            self.observer.on_loading_changed(loading);
        }
    }
}

fn log_engine_message(level: &str, prefix: &str, text: &str) {
    let text = text.trim_end();
    match level {
        "fatal" | "error" => error!(target: "softframe::engine", prefix, "{}", text),
        "warn" => warn!(target: "softframe::engine", prefix, "{}", text),
        _ => trace!(target: "softframe::engine", prefix, level, "{}", text),
    }
}

/// The event thread.
pub struct EventBridge {
    engine: Arc<dyn DecodeEngine>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventBridge {
    pub fn spawn(handler: EventHandler, wait_timeout: Duration) -> Result<Self> {
        let engine = Arc::clone(&handler.engine);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("softframe-events".into())
            .spawn(move || run(handler, thread_stop, wait_timeout))
            .map_err(|source| RendererError::Thread {
                name: "softframe-events",
                source,
            })?;
        Ok(Self {
            engine,
            stop,
            thread: Some(thread),
        })
    }

    /// Ask the loop to exit and interrupt its current wait.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.engine.wakeup();
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop and join. From the event thread itself the join is skipped and
    /// the loop exits once the current callback returns.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.request_stop();
        if thread.thread().id() == thread::current().id() {
            debug!("stop called from the event thread, not joining");
            return;
        }
        if thread.join().is_err() {
            error!("event thread panicked");
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(handler: EventHandler, stop: Arc<AtomicBool>, wait_timeout: Duration) {
    debug!("event thread started");
    while !stop.load(Ordering::Acquire) {
        let event = handler.engine.wait_event(wait_timeout);
        if handler.handle(event) == Flow::Exit {
            break;
        }
    }
    debug!("event thread stopped");
}
