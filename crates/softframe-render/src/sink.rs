//! Presentation sink adapter.
//!
//! Wraps rendered frames as timed samples and feeds them to a display sink,
//! flushing whenever the stream's format changes or a reload asks for it.
//! The adapter lives on its own presentation thread and receives work over
//! a FIFO channel, so samples reach the display in render order.

use crate::renderer::RenderedFrame;
use crate::surface_pool::PooledSurface;
use crossbeam_channel::{Receiver, Sender};
use softframe_color::ColorAttachments;
use softframe_core::{PixelFormat, RendererError, Result, Surface, SurfaceError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Frames allowed to wait for the presentation thread before new ones drop.
pub const PRESENT_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("cannot describe {width}x{height} surface: {source}")]
    InvalidSurface {
        width: u32,
        height: u32,
        #[source]
        source: SurfaceError,
    },
}

/// Monotonic host time source.
pub trait HostClock: Send + Sync {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// [`HostClock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock shared by the adapter and the display for one session.
pub struct PresentationTimebase {
    clock: Arc<dyn HostClock>,
    origin: Duration,
}

impl PresentationTimebase {
    pub fn new(clock: Arc<dyn HostClock>) -> Self {
        let origin = clock.now();
        Self { clock, origin }
    }

    /// Host time at which the timebase was created.
    pub fn origin(&self) -> Duration {
        self.origin
    }

    /// Current host time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Time elapsed since the timebase was created.
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_sub(self.origin)
    }
}

impl std::fmt::Debug for PresentationTimebase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationTimebase")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Identity of a sample's pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescription {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl FormatDescription {
    /// Describe a surface, rejecting one whose layout is unusable.
    pub fn for_surface(surface: &Surface) -> std::result::Result<Self, SampleError> {
        surface
            .validate()
            .map_err(|source| SampleError::InvalidSurface {
                width: surface.width(),
                height: surface.height(),
                source,
            })?;
        Ok(Self {
            pixel_format: surface.format(),
            width: surface.width(),
            height: surface.height(),
        })
    }
}

/// A frame ready for display.
#[derive(Debug)]
pub struct TimedSample {
    pub surface: PooledSurface,
    pub format: FormatDescription,
    /// Presentation time on the host clock.
    pub pts: Duration,
    /// Always `None`: display until replaced.
    pub duration: Option<Duration>,
    pub attachments: ColorAttachments,
}

impl TimedSample {
    pub fn new(
        surface: PooledSurface,
        pts: Duration,
        attachments: ColorAttachments,
    ) -> std::result::Result<Self, SampleError> {
        let format = FormatDescription::for_surface(&surface)?;
        Ok(Self {
            surface,
            format,
            pts,
            duration: None,
            attachments,
        })
    }
}

/// Health reported by a display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Ok,
    Failed,
}

/// The display layer samples are handed to.
pub trait DisplaySink: Send {
    fn status(&self) -> SinkStatus;

    /// Drop queued samples. `discard` also drops the one on screen.
    fn flush(&mut self, discard: bool);

    fn enqueue(&mut self, sample: TimedSample);

    /// Install or remove the session timebase.
    fn set_timebase(&mut self, timebase: Option<Arc<PresentationTimebase>>);

    /// Display refresh limit in Hz, if known.
    fn max_refresh_rate(&self) -> Option<u32> {
        None
    }
}

/// Adapter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub delivered: u64,
    pub dropped: u64,
    pub flushes: u64,
    pub discard_flushes: u64,
}

#[derive(Debug, Default)]
struct SinkMetrics {
    delivered: AtomicU64,
    dropped: AtomicU64,
    flushes: AtomicU64,
    discard_flushes: AtomicU64,
}

impl SinkMetrics {
    fn snapshot(&self) -> SinkStats {
        SinkStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            discard_flushes: self.discard_flushes.load(Ordering::Relaxed),
        }
    }
}

/// Turns rendered frames into enqueued samples.
pub struct SinkAdapter {
    sink: Box<dyn DisplaySink>,
    clock: Arc<dyn HostClock>,
    timebase: Option<Arc<PresentationTimebase>>,
    last_format: Option<FormatDescription>,
    flush_pending: bool,
    metrics: Arc<SinkMetrics>,
}

impl SinkAdapter {
    pub fn new(sink: Box<dyn DisplaySink>, clock: Arc<dyn HostClock>) -> Self {
        Self {
            sink,
            clock,
            timebase: None,
            last_format: None,
            flush_pending: false,
            metrics: Arc::new(SinkMetrics::default()),
        }
    }

    /// Deliver one frame. Returns true if it was enqueued.
    pub fn deliver(&mut self, frame: RenderedFrame) -> bool {
        let RenderedFrame {
            surface,
            attachments,
            reconfigured,
        } = frame;
        if reconfigured {
            self.flush_pending = true;
        }

        let pts = self.clock.now();
        let sample = match TimedSample::new(surface, pts, attachments) {
            Ok(sample) => sample,
            Err(e) => {
                error!(error = %e, "failed to build sample, frame dropped");
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        let needs_flush = self
            .last_format
            .is_some_and(|last| last != sample.format);

        if self.timebase.is_none() {
            let timebase = Arc::new(PresentationTimebase::new(Arc::clone(&self.clock)));
            debug!(origin = ?timebase.origin(), "presentation timebase created");
            self.sink.set_timebase(Some(Arc::clone(&timebase)));
            self.timebase = Some(timebase);
        }

        if self.last_format.is_none() {
            // First delivery of a session never flushes.
            self.flush_pending = false;
        } else if needs_flush {
            info!(
                width = sample.format.width,
                height = sample.format.height,
                "format changed, flushing display"
            );
            self.flush(true);
        } else if self.flush_pending {
            self.flush(false);
        }
        self.flush_pending = false;

        if self.sink.status() == SinkStatus::Failed {
            warn!("display sink failed, discarding before enqueue");
            self.flush(true);
        }

        self.last_format = Some(sample.format);
        self.sink.enqueue(sample);
        self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Flush (non-discarding) before the next sample.
    pub fn request_flush(&mut self) {
        self.flush_pending = true;
    }

    /// End the session: forget the timebase and format, discard the display.
    pub fn reset(&mut self) {
        self.timebase = None;
        self.last_format = None;
        self.flush_pending = false;
        self.sink.set_timebase(None);
        self.flush(true);
    }

    pub fn has_timebase(&self) -> bool {
        self.timebase.is_some()
    }

    pub fn last_format(&self) -> Option<FormatDescription> {
        self.last_format
    }

    pub fn stats(&self) -> SinkStats {
        self.metrics.snapshot()
    }

    /// Give the display sink back.
    pub fn into_sink(self) -> Box<dyn DisplaySink> {
        self.sink
    }

    fn flush(&mut self, discard: bool) {
        self.sink.flush(discard);
        if discard {
            self.metrics.discard_flushes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.flushes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

enum PresentCommand {
    Deliver(RenderedFrame),
    RequestFlush,
    Reset,
    Stop,
}

/// Sender side of the presentation queue.
#[derive(Clone)]
pub struct PresentHandle {
    tx: Sender<PresentCommand>,
    queued: Arc<AtomicUsize>,
    metrics: Arc<SinkMetrics>,
}

impl PresentHandle {
    /// Queue a frame behind everything already sent. When
    /// [`PRESENT_QUEUE_DEPTH`] frames are already waiting the frame is
    /// dropped; returns false if it was not queued.
    pub fn submit(&self, frame: RenderedFrame) -> bool {
        if self.queued.fetch_add(1, Ordering::AcqRel) >= PRESENT_QUEUE_DEPTH {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            warn!("presentation queue full, frame dropped");
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.tx.send(PresentCommand::Deliver(frame)).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    pub fn request_flush(&self) {
        let _ = self.tx.send(PresentCommand::RequestFlush);
    }

    pub fn reset(&self) {
        let _ = self.tx.send(PresentCommand::Reset);
    }

    pub fn stats(&self) -> SinkStats {
        self.metrics.snapshot()
    }
}

/// The presentation thread.
pub struct Presenter {
    handle: PresentHandle,
    thread: Option<JoinHandle<Box<dyn DisplaySink>>>,
}

impl Presenter {
    pub fn spawn(adapter: SinkAdapter) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let queued = Arc::new(AtomicUsize::new(0));
        let handle = PresentHandle {
            tx,
            queued: Arc::clone(&queued),
            metrics: Arc::clone(&adapter.metrics),
        };
        let thread = thread::Builder::new()
            .name("softframe-present".into())
            .spawn(move || present_loop(adapter, rx, queued))
            .map_err(|source| RendererError::Thread {
                name: "softframe-present",
                source,
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> PresentHandle {
        self.handle.clone()
    }

    /// Drain queued work, reset the adapter, stop the thread and return
    /// the display sink.
    pub fn shutdown(mut self) -> Option<Box<dyn DisplaySink>> {
        let _ = self.handle.tx.send(PresentCommand::Stop);
        let thread = self.thread.take()?;
        if thread.thread().id() == thread::current().id() {
            return None;
        }
        match thread.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                error!("presentation thread panicked");
                None
            }
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.tx.send(PresentCommand::Stop);
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn present_loop(
    mut adapter: SinkAdapter,
    rx: Receiver<PresentCommand>,
    queued: Arc<AtomicUsize>,
) -> Box<dyn DisplaySink> {
    debug!("presentation thread started");
    // A closed channel means every handle is gone; treat it as Stop.
    while let Ok(command) = rx.recv() {
        match command {
            PresentCommand::Deliver(frame) => {
                queued.fetch_sub(1, Ordering::AcqRel);
                adapter.deliver(frame);
            }
            PresentCommand::RequestFlush => adapter.request_flush(),
            PresentCommand::Reset => adapter.reset(),
            PresentCommand::Stop => break,
        }
    }
    adapter.reset();
    debug!(stats = ?adapter.stats(), "presentation thread stopped");
    adapter.into_sink()
}
