//! Softframe - headless pipeline runner
//!
//! Drives the pipeline against the synthetic engine and a counting display
//! sink, then logs what was delivered.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use softframe_core::VideoDimensions;
use softframe_engine::{SyntheticConfig, SyntheticEngine};
use softframe_render::{
    DisplaySink, LoadPreset, PipelineConfig, PlaybackObserver, PresentationTimebase, SinkStatus,
    SubtitleStyle, SubtitleTrack, TimedSample, VideoPipeline,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const TICK: Duration = Duration::from_millis(33);

#[derive(Debug)]
struct Options {
    url: String,
    config: Option<PathBuf>,
    subtitles: Option<PathBuf>,
    seconds: f64,
    size: VideoDimensions,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        url: "synthetic://bars".to_string(),
        config: None,
        subtitles: None,
        seconds: 5.0,
        size: VideoDimensions::new(1920, 1080),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                options.config = Some(args.next().context("--config needs a path")?.into())
            }
            "--subtitles" => {
                options.subtitles = Some(args.next().context("--subtitles needs a path")?.into())
            }
            "--seconds" => {
                let value = args.next().context("--seconds needs a value")?;
                options.seconds = value
                    .parse()
                    .with_context(|| format!("bad --seconds {}", value))?;
            }
            "--size" => {
                let value = args.next().context("--size needs WxH")?;
                options.size = parse_size(&value)?;
            }
            other if other.starts_with("--") => bail!("unknown option {}", other),
            url => options.url = url.to_string(),
        }
    }
    Ok(options)
}

fn parse_size(value: &str) -> Result<VideoDimensions> {
    let (w, h) = value
        .split_once(|c: char| c.eq_ignore_ascii_case(&'x'))
        .with_context(|| format!("size {} is not WxH", value))?;
    let size = VideoDimensions::new(w.trim().parse()?, h.trim().parse()?);
    if size.is_empty() {
        bail!("size {} has a zero dimension", value);
    }
    Ok(size)
}

fn run_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .with_context(|| format!("--seconds {} is out of range", seconds))
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    if let Some(path) = path {
        return PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    let default = dirs::config_dir().map(|dir| dir.join("softframe").join("config.json"));
    match default {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "using config");
            PipelineConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
        _ => Ok(PipelineConfig::default()),
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SinkCounts {
    enqueued: u64,
    flushes: u64,
    discard_flushes: u64,
    last_size: Option<(u32, u32)>,
    hdr_frames: u64,
}

/// Display sink that only counts.
struct CountingSink {
    counts: Arc<Mutex<SinkCounts>>,
}

impl DisplaySink for CountingSink {
    fn status(&self) -> SinkStatus {
        SinkStatus::Ok
    }

    fn flush(&mut self, discard: bool) {
        let mut counts = self.counts.lock();
        if discard {
            counts.discard_flushes += 1;
        } else {
            counts.flushes += 1;
        }
    }

    fn enqueue(&mut self, sample: TimedSample) {
        let mut counts = self.counts.lock();
        counts.enqueued += 1;
        counts.last_size = Some((sample.format.width, sample.format.height));
        if sample.attachments.edr {
            counts.hdr_frames += 1;
        }
    }

    fn set_timebase(&mut self, timebase: Option<Arc<PresentationTimebase>>) {
        debug!(installed = timebase.is_some(), "timebase");
    }

    fn max_refresh_rate(&self) -> Option<u32> {
        Some(60)
    }
}

/// Serves subtitles from an SRT track and logs playback changes.
struct ConsoleObserver {
    track: Option<SubtitleTrack>,
}

impl PlaybackObserver for ConsoleObserver {
    fn on_pause_changed(&self, paused: bool) {
        info!(paused, "pause changed");
    }

    fn on_loading_changed(&self, loading: bool) {
        debug!(loading, "loading changed");
    }

    fn on_ready_to_seek(&self, seekable: bool) {
        debug!(seekable, "ready to seek");
    }

    fn subtitle_text(&self, position: f64) -> Option<String> {
        self.track
            .as_ref()?
            .active_text_at_secs(position)
            .map(str::to_string)
    }

    fn subtitle_style(&self) -> SubtitleStyle {
        SubtitleStyle {
            enabled: self.track.is_some(),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = parse_args()?;
    let config = load_config(options.config.as_ref())?;

    let track = match &options.subtitles {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let track = SubtitleTrack::from_srt(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!(cues = track.len(), "subtitles loaded");
            Some(track)
        }
        None => None,
    };

    info!(
        url = %options.url,
        size = %options.size,
        seconds = options.seconds,
        "softframe starting"
    );

    let engine = SyntheticEngine::new(SyntheticConfig {
        video_size: options.size,
        ..Default::default()
    });
    let counts = Arc::new(Mutex::new(SinkCounts::default()));
    let pipeline = VideoPipeline::new(
        config,
        Arc::new(engine.factory()),
        Box::new(CountingSink {
            counts: Arc::clone(&counts),
        }),
        Arc::new(ConsoleObserver { track }),
    );

    pipeline.start()?;
    pipeline.load(&options.url, LoadPreset::Standard, &[])?;

    let started = Instant::now();
    let run_for = run_duration(options.seconds)?;
    while started.elapsed() < run_for {
        std::thread::sleep(TICK);
        engine.advance(TICK.as_secs_f64());
    }

    let playback = pipeline.playback();
    let render = pipeline.render_stats();
    pipeline.stop();

    let counts = *counts.lock();
    if counts.enqueued == 0 {
        warn!("no frames were delivered");
    }
    info!(
        position = playback.position,
        rendered = render.rendered,
        dropped = render.dropped,
        enqueued = counts.enqueued,
        flushes = counts.flushes,
        discard_flushes = counts.discard_flushes,
        hdr_frames = counts.hdr_frames,
        last_size = ?counts.last_size,
        "softframe finished"
    );
    Ok(())
}
