//! The public pipeline: lifecycle and playback control.
//!
//! A running session owns three threads. The render thread paces ticks and
//! renders, the event thread applies engine events to shared state, and
//! the presentation thread hands samples to the display sink.

use crate::config::PipelineConfig;
use crate::events::{EventBridge, EventHandler, OBSERVED_PROPERTIES};
use crate::observer::PlaybackObserver;
use crate::renderer::{FrameRenderer, RenderStats};
use crate::scheduler::{FrameScheduler, Schedule};
use crate::sink::{
    DisplaySink, HostClock, MonotonicClock, PresentHandle, Presenter, SinkAdapter, SinkStats,
};
use crate::state::{PlaybackState, SharedState};
use crate::surface_pool::{PoolConfig, SurfacePool};
use crossbeam_channel::{Receiver, RecvError, Sender};
use parking_lot::Mutex;
use softframe_color::ColorState;
use softframe_core::{RendererError, Result, VideoDimensions};
use softframe_engine::{
    props, DecodeEngine, EngineFactory, PropertyValue, RenderContext, UpdateFlags,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

/// Engine tuning applied before a file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPreset {
    #[default]
    Standard,
    /// Remote streams: deep cache and readahead.
    Streaming,
    /// Live sources: no cache, minimal buffering.
    LowLatency,
}

impl LoadPreset {
    /// Engine properties for this preset.
    pub fn properties(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Standard => &[("cache", "auto"), ("demuxer-readahead-secs", "10")],
            Self::Streaming => &[
                ("cache", "yes"),
                ("cache-secs", "30"),
                ("demuxer-readahead-secs", "20"),
                ("demuxer-max-bytes", "150MiB"),
            ],
            Self::LowLatency => &[
                ("profile", "low-latency"),
                ("cache", "no"),
                ("demuxer-readahead-secs", "0"),
            ],
        }
    }
}

/// Where to seek to, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Absolute(f64),
    Relative(f64),
}

enum RenderCommand {
    Quit,
}

struct RenderThread {
    control: Sender<RenderCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RenderThread {
    fn stop(&mut self) {
        let _ = self.control.send(RenderCommand::Quit);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            debug!("stop called from the render thread, not joining");
            return;
        }
        if thread.join().is_err() {
            error!("render thread panicked");
        }
    }
}

struct Session {
    id: Uuid,
    span: Span,
    engine: Arc<dyn DecodeEngine>,
    render: RenderThread,
    events: EventBridge,
    presenter: Presenter,
    present: PresentHandle,
}

/// Software video pipeline.
///
/// Control methods take `&self` and may be called from any thread,
/// including from inside observer callbacks.
pub struct VideoPipeline {
    config: PipelineConfig,
    factory: Arc<dyn EngineFactory>,
    observer: Arc<dyn PlaybackObserver>,
    clock: Arc<dyn HostClock>,
    state: Arc<SharedState>,
    pool: SurfacePool,
    render_stats: Arc<Mutex<RenderStats>>,
    session: Mutex<Option<Session>>,
    sink: Mutex<Option<Box<dyn DisplaySink>>>,
}

impl VideoPipeline {
    pub fn new(
        config: PipelineConfig,
        factory: Arc<dyn EngineFactory>,
        sink: Box<dyn DisplaySink>,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Self {
        let config = config.validated();
        let pool = SurfacePool::new(PoolConfig {
            warm_target: config.warm_target,
            hard_cap: config.pool_hard_cap,
            low_water: config.low_water,
            warm_in_background: true,
        });
        Self {
            config,
            factory,
            observer,
            clock: Arc::new(MonotonicClock::new()),
            state: Arc::new(SharedState::new()),
            pool,
            render_stats: Arc::new(Mutex::new(RenderStats::default())),
            session: Mutex::new(None),
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Use a specific host clock for presentation timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn HostClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create and initialize the engine and start the pipeline threads.
    ///
    /// On failure everything created so far is torn down again.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.session.lock();
        if guard.is_some() {
            return Err(RendererError::AlreadyRunning);
        }

        let id = Uuid::new_v4();
        let span = info_span!("session", %id);
        let entered = span.enter();
        info!("starting pipeline");

        self.state.reset();
        *self.render_stats.lock() = RenderStats::default();

        let engine = self
            .factory
            .create()
            .map_err(|e| RendererError::EngineCreate(e.to_string()))?;

        let mut ctx = match prepare_engine(&engine, &self.config) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "engine setup failed");
                engine.destroy();
                return Err(e);
            }
        };

        let Some(sink) = self.sink.lock().take() else {
            engine.destroy();
            return Err(RendererError::SinkUnavailable);
        };
        let scheduler = FrameScheduler::from_refresh(sink.max_refresh_rate(), self.config.max_fps);
        debug!(min_interval = ?scheduler.min_interval(), "frame pacing configured");

        let presenter = match Presenter::spawn(SinkAdapter::new(sink, Arc::clone(&self.clock))) {
            Ok(presenter) => presenter,
            Err(e) => {
                engine.destroy();
                return Err(e);
            }
        };
        let present = presenter.handle();

        let handler = EventHandler::new(
            Arc::clone(&engine),
            Arc::clone(&self.state),
            Arc::clone(&self.observer),
        );
        let mut events = match EventBridge::spawn(handler, self.config.event_wait_timeout()) {
            Ok(events) => events,
            Err(e) => {
                self.rollback(presenter, None, &engine);
                return Err(e);
            }
        };

        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let callback_wake = wake_tx.clone();
        ctx.set_update_callback(Some(Arc::new(move || {
            let _ = callback_wake.try_send(());
        })));

        let renderer = FrameRenderer::new(
            Arc::clone(&self.state),
            self.pool.clone(),
            Arc::clone(&self.observer),
            self.config.subtitle_safe_width,
        );
        let worker = RenderWorker {
            ctx,
            renderer,
            scheduler,
            present: present.clone(),
            wake: wake_rx,
            control: control_rx,
            stats: Arc::clone(&self.render_stats),
            frame_pending: false,
        };
        let thread_span = span.clone();
        let spawned = thread::Builder::new()
            .name("softframe-render".into())
            .spawn(move || {
                let _enter = thread_span.enter();
                worker.run();
            });
        let render_thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                self.rollback(presenter, Some(&mut events), &engine);
                return Err(RendererError::Thread {
                    name: "softframe-render",
                    source,
                });
            }
        };

        // Pick up any frame the engine already has.
        let _ = wake_tx.try_send(());

        drop(entered);
        *guard = Some(Session {
            id,
            span,
            engine,
            render: RenderThread {
                control: control_tx,
                thread: Some(render_thread),
            },
            events,
            presenter,
            present,
        });
        info!(session = %id, "pipeline started");
        Ok(())
    }

    fn rollback(
        &self,
        presenter: Presenter,
        events: Option<&mut EventBridge>,
        engine: &Arc<dyn DecodeEngine>,
    ) {
        warn!("rolling back partial start");
        if let Some(events) = events {
            events.stop();
        }
        if let Some(sink) = presenter.shutdown() {
            *self.sink.lock() = Some(sink);
        }
        self.pool.clear();
        engine.destroy();
    }

    /// Tear the session down. Safe to call repeatedly and from any thread,
    /// including observer callbacks.
    pub fn stop(&self) {
        let Some(mut session) = self.session.lock().take() else {
            return;
        };
        let span = session.span.clone();
        let _enter = span.enter();
        info!("stopping pipeline");

        session.render.stop();
        if let Err(e) = session.engine.command_async(&["quit"]) {
            warn!(error = %e, "quit command failed");
        }
        session.events.stop();
        if let Some(sink) = session.presenter.shutdown() {
            *self.sink.lock() = Some(sink);
        }
        self.pool.clear();
        session.engine.destroy();
        info!(session = %session.id, "pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    /// Open `url`, replacing whatever is playing.
    pub fn load(&self, url: &str, preset: LoadPreset, headers: &[(String, String)]) -> Result<()> {
        let (engine, present) = self.running()?;
        for (name, value) in preset.properties() {
            if let Err(e) = engine.set_property(name, PropertyValue::String((*value).to_string())) {
                warn!(property = name, error = %e, "preset property rejected");
            }
        }
        let header_fields = headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        if let Err(e) =
            engine.set_property(props::HTTP_HEADER_FIELDS, PropertyValue::String(header_fields))
        {
            warn!(error = %e, "http headers rejected");
        }

        self.state.request_clear();
        present.request_flush();
        info!(url, ?preset, headers = headers.len(), "loading");
        command(&engine, &["loadfile", url, "replace"])
    }

    pub fn play(&self) -> Result<()> {
        self.set_pause(false)
    }

    pub fn pause(&self) -> Result<()> {
        self.set_pause(true)
    }

    pub fn toggle_pause(&self) -> Result<()> {
        let (engine, _) = self.running()?;
        command(&engine, &["cycle", "pause"])
    }

    pub fn seek(&self, target: SeekTarget) -> Result<()> {
        let (seconds, mode) = match target {
            SeekTarget::Absolute(t) => (t, "absolute"),
            SeekTarget::Relative(t) => (t, "relative"),
        };
        if !seconds.is_finite() {
            return Err(RendererError::InvalidArgument(format!("seek target {}", seconds)));
        }
        let (engine, _) = self.running()?;
        command(&engine, &["seek", &seconds.to_string(), mode])
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(RendererError::InvalidArgument(format!("speed {}", speed)));
        }
        let (engine, _) = self.running()?;
        engine
            .set_property(props::SPEED, PropertyValue::Double(speed))
            .map_err(|e| RendererError::Command {
                command: "set speed".into(),
                reason: e.to_string(),
            })
    }

    pub fn playback(&self) -> PlaybackState {
        self.state.playback()
    }

    pub fn dimensions(&self) -> VideoDimensions {
        self.state.dimensions()
    }

    pub fn color(&self) -> ColorState {
        self.state.color()
    }

    pub fn render_stats(&self) -> RenderStats {
        *self.render_stats.lock()
    }

    /// Counters of the running session's sink adapter.
    pub fn sink_stats(&self) -> Option<SinkStats> {
        self.session.lock().as_ref().map(|s| s.present.stats())
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn set_pause(&self, paused: bool) -> Result<()> {
        let (engine, _) = self.running()?;
        engine
            .set_property(props::PAUSE, PropertyValue::Flag(paused))
            .map_err(|e| RendererError::Command {
                command: if paused { "pause" } else { "play" }.into(),
                reason: e.to_string(),
            })
    }

    fn running(&self) -> Result<(Arc<dyn DecodeEngine>, PresentHandle)> {
        self.session
            .lock()
            .as_ref()
            .map(|s| (Arc::clone(&s.engine), s.present.clone()))
            .ok_or(RendererError::NotRunning)
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply options, initialize, observe properties and create the render
/// context.
fn prepare_engine(
    engine: &Arc<dyn DecodeEngine>,
    config: &PipelineConfig,
) -> Result<Box<dyn RenderContext>> {
    for (name, value) in &config.engine_options {
        engine
            .set_option(name, value)
            .map_err(|e| RendererError::EngineInit(format!("option {}={}: {}", name, value, e)))?;
    }
    engine
        .initialize()
        .map_err(|e| RendererError::EngineInit(e.to_string()))?;
    for (name, format) in OBSERVED_PROPERTIES {
        if let Err(e) = engine.observe_property(name, *format) {
            warn!(property = name, error = %e, "cannot observe property");
        }
    }
    engine
        .create_render_context()
        .map_err(|e| RendererError::RenderContext(e.to_string()))
}

fn command(engine: &Arc<dyn DecodeEngine>, args: &[&str]) -> Result<()> {
    engine
        .command_async(args)
        .map_err(|e| RendererError::Command {
            command: args.join(" "),
            reason: e.to_string(),
        })
}

/// State owned by the render thread.
struct RenderWorker {
    ctx: Box<dyn RenderContext>,
    renderer: FrameRenderer,
    scheduler: FrameScheduler,
    present: PresentHandle,
    wake: Receiver<()>,
    control: Receiver<RenderCommand>,
    stats: Arc<Mutex<RenderStats>>,
    /// A frame flag read from the engine but not yet rendered.
    frame_pending: bool,
}

enum Wake {
    Signal,
    Deadline,
    Quit,
}

impl Wake {
    /// A closed wake channel means the update callback is gone.
    fn from_signal(msg: std::result::Result<(), RecvError>) -> Self {
        match msg {
            Ok(()) => Self::Signal,
            Err(_) => Self::Quit,
        }
    }
}

impl RenderWorker {
    fn run(mut self) {
        debug!("render thread started");
        loop {
            let wake = match self.scheduler.deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    crossbeam_channel::select! {
                        recv(self.control) -> _ => Wake::Quit,
                        recv(self.wake) -> msg => Wake::from_signal(msg),
                        default(timeout) => Wake::Deadline,
                    }
                }
                None => crossbeam_channel::select! {
                    recv(self.control) -> _ => Wake::Quit,
                    recv(self.wake) -> msg => Wake::from_signal(msg),
                },
            };

            let now = Instant::now();
            let due = match wake {
                Wake::Quit => break,
                Wake::Signal => self.scheduler.on_update_signal(now) == Schedule::Immediate,
                Wake::Deadline => self.scheduler.poll(now),
            };
            if due {
                self.tick();
            }
        }

        self.scheduler.disable();
        self.ctx.set_update_callback(None);
        self.renderer.reset();
        debug!(stats = ?self.renderer.stats(), "render thread stopped");
    }

    /// Render while the scheduler allows; otherwise leave a deferred tick
    /// armed for the pending frame.
    fn tick(&mut self) {
        let mut flags = self.ctx.update();
        if std::mem::take(&mut self.frame_pending) {
            flags = UpdateFlags(flags.0 | UpdateFlags::FRAME.0);
        }
        while flags.contains(UpdateFlags::FRAME) {
            if let Some(frame) = self.renderer.render_tick(self.ctx.as_mut()) {
                self.present.submit(frame);
            }
            *self.stats.lock() = self.renderer.stats();

            flags = self.ctx.update();
            if flags.contains(UpdateFlags::FRAME)
                && self.scheduler.on_update_signal(Instant::now()) != Schedule::Immediate
            {
                // Already read from the engine; the deferred tick renders it.
                self.frame_pending = true;
                break;
            }
        }
    }
}
