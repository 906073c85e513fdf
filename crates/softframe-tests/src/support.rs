//! Shared fixtures: a recording display sink, a recording observer and an
//! engine factory that hands out a fresh synthetic engine per start.

use parking_lot::Mutex;
use softframe_engine::{DecodeEngine, EngineFactory, EngineResult, SyntheticConfig, SyntheticEngine};
use softframe_render::{
    DisplaySink, PipelineConfig, PlaybackObserver, PresentationTimebase, SinkStatus,
    SubtitleStyle, TimedSample, VideoPipeline,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What the display sink saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Timebase(bool),
    Flush { discard: bool },
    Enqueue(Sample),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub width: u32,
    pub height: u32,
    pub edr: bool,
    pub pts: Duration,
    /// Pixels matching [`RecordingSink::marker`], if one is set.
    pub marked: usize,
}

#[derive(Default)]
struct SinkLog {
    events: Vec<SinkEvent>,
    failed: bool,
}

/// Display sink that records every call.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    marker: Option<[u8; 4]>,
}

impl RecordingSink {
    /// Count pixels equal to `bgra` in every enqueued sample.
    pub fn with_marker(bgra: [u8; 4]) -> Self {
        Self {
            marker: Some(bgra),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log.lock().events.clone()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Enqueue(sample) => Some(sample.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn set_failed(&self, failed: bool) {
        self.log.lock().failed = failed;
    }
}

impl DisplaySink for RecordingSink {
    fn status(&self) -> SinkStatus {
        if self.log.lock().failed {
            SinkStatus::Failed
        } else {
            SinkStatus::Ok
        }
    }

    fn flush(&mut self, discard: bool) {
        let mut log = self.log.lock();
        log.events.push(SinkEvent::Flush { discard });
        log.failed = false;
    }

    fn enqueue(&mut self, sample: TimedSample) {
        let marked = match self.marker {
            Some(marker) => {
                let surface = &*sample.surface;
                (0..surface.height())
                    .flat_map(|y| (0..surface.width()).map(move |x| (x, y)))
                    .filter(|&(x, y)| surface.pixel(x, y) == marker)
                    .count()
            }
            None => 0,
        };
        self.log.lock().events.push(SinkEvent::Enqueue(Sample {
            width: sample.format.width,
            height: sample.format.height,
            edr: sample.attachments.edr,
            pts: sample.pts,
            marked,
        }));
    }

    fn set_timebase(&mut self, timebase: Option<Arc<PresentationTimebase>>) {
        self.log
            .lock()
            .events
            .push(SinkEvent::Timebase(timebase.is_some()));
    }

    fn max_refresh_rate(&self) -> Option<u32> {
        Some(120)
    }
}

/// Observer that records callbacks and serves a fixed subtitle line.
#[derive(Default)]
pub struct RecordingObserver {
    pub pauses: Mutex<Vec<bool>>,
    pub loading: Mutex<Vec<bool>>,
    pub seekable: Mutex<Vec<bool>>,
    pub positions: Mutex<Vec<f64>>,
    pub subtitle: Mutex<Option<String>>,
    pub style: Mutex<SubtitleStyle>,
}

impl PlaybackObserver for RecordingObserver {
    fn on_position(&self, position: f64, _duration: Option<f64>) {
        self.positions.lock().push(position);
    }

    fn on_pause_changed(&self, paused: bool) {
        self.pauses.lock().push(paused);
    }

    fn on_loading_changed(&self, loading: bool) {
        self.loading.lock().push(loading);
    }

    fn on_ready_to_seek(&self, seekable: bool) {
        self.seekable.lock().push(seekable);
    }

    fn subtitle_text(&self, _position: f64) -> Option<String> {
        self.subtitle.lock().clone()
    }

    fn subtitle_style(&self) -> SubtitleStyle {
        *self.style.lock()
    }
}

/// Hands out a new synthetic engine per `create`, keeping a handle to each.
#[derive(Default)]
pub struct EngineSource {
    pub config: Mutex<SyntheticConfig>,
    created: Mutex<Vec<SyntheticEngine>>,
    pub fail_create: Mutex<bool>,
}

impl EngineSource {
    pub fn new(config: SyntheticConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            ..Default::default()
        })
    }

    /// The most recently created engine.
    pub fn latest(&self) -> Option<SyntheticEngine> {
        self.created.lock().last().cloned()
    }

    pub fn created(&self) -> Vec<SyntheticEngine> {
        self.created.lock().clone()
    }
}

impl EngineFactory for EngineSource {
    fn create(&self) -> EngineResult<Arc<dyn DecodeEngine>> {
        if *self.fail_create.lock() {
            return Err(softframe_engine::EngineError::Status {
                code: -1,
                context: "create".into(),
            });
        }
        let engine = SyntheticEngine::new(self.config.lock().clone());
        self.created.lock().push(engine.clone());
        Ok(Arc::new(engine))
    }
}

pub fn pipeline_with(
    source: &Arc<EngineSource>,
    sink: RecordingSink,
    observer: Arc<dyn PlaybackObserver>,
) -> VideoPipeline {
    VideoPipeline::new(
        PipelineConfig::default(),
        Arc::clone(source) as Arc<dyn EngineFactory>,
        Box::new(sink),
        observer,
    )
}

/// Poll `f` for up to two seconds.
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Keep producing frames until `f` holds.
pub fn pump_until(engine: &SyntheticEngine, mut f: impl FnMut() -> bool) -> bool {
    wait_until(|| {
        if f() {
            return true;
        }
        engine.signal_frame();
        false
    })
}
