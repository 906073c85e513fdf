//! Start, stop and control-surface integration tests.

use crate::support::{
    pipeline_with, wait_until, EngineSource, RecordingObserver, RecordingSink, SinkEvent,
};
use softframe_core::RendererError;
use softframe_engine::{props, PropertyValue, SyntheticConfig};
use softframe_render::{LoadPreset, NoopObserver, PlaybackObserver, SeekTarget, VideoPipeline};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

fn small() -> SyntheticConfig {
    SyntheticConfig {
        video_size: softframe_core::VideoDimensions::new(160, 90),
        ..Default::default()
    }
}

#[test]
fn initialize_failure_rolls_back_and_allows_retry() {
    let source = EngineSource::new(SyntheticConfig {
        fail_initialize: true,
        ..small()
    });
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));

    assert!(matches!(pipeline.start(), Err(RendererError::EngineInit(_))));
    assert!(!pipeline.is_running());
    assert!(source.latest().unwrap().is_destroyed());
    assert_eq!(sink.event_count(), 0);

    source.config.lock().fail_initialize = false;
    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    pipeline.stop();
}

#[test]
fn render_context_failure_destroys_engine() {
    let source = EngineSource::new(SyntheticConfig {
        fail_render_context: true,
        ..small()
    });
    let pipeline = pipeline_with(&source, RecordingSink::default(), Arc::new(NoopObserver));

    assert!(matches!(pipeline.start(), Err(RendererError::RenderContext(_))));
    assert!(!pipeline.is_running());
    let engine = source.latest().unwrap();
    assert!(engine.is_destroyed());
    assert!(!engine.has_update_callback());
}

#[test]
fn engine_creation_failure_is_reported() {
    let source = EngineSource::new(small());
    *source.fail_create.lock() = true;
    let pipeline = pipeline_with(&source, RecordingSink::default(), Arc::new(NoopObserver));

    assert!(matches!(pipeline.start(), Err(RendererError::EngineCreate(_))));
    assert!(source.created().is_empty());
    assert!(pipeline.session_id().is_none());
}

#[test]
fn stop_is_idempotent_and_releases_everything() {
    let source = EngineSource::new(small());
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));

    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    assert!(wait_until(|| !sink.samples().is_empty()));

    pipeline.stop();
    pipeline.stop();

    let engine = source.latest().unwrap();
    assert!(!pipeline.is_running());
    assert!(engine.is_destroyed());
    assert!(!engine.has_update_callback());
    assert!(engine.commands().iter().any(|c| c[0] == "quit"));
    assert_eq!(pipeline.pool().idle_count(), 0);
    assert!(pipeline.sink_stats().is_none());

    let events = sink.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[SinkEvent::Timebase(false), SinkEvent::Flush { discard: true }]
    );
    assert!(matches!(pipeline.play(), Err(RendererError::NotRunning)));
}

#[test]
fn concurrent_stops_return_while_the_event_thread_waits() {
    let source = EngineSource::new(SyntheticConfig {
        uninterruptible_wait: true,
        ..small()
    });
    let sink = RecordingSink::default();
    let pipeline = Arc::new(pipeline_with(&source, sink.clone(), Arc::new(NoopObserver)));
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    assert!(wait_until(|| !sink.samples().is_empty()));

    let started = Instant::now();
    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || pipeline.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    let engine = source.latest().unwrap();
    assert!(!pipeline.is_running());
    assert!(engine.is_destroyed());
    assert_eq!(
        engine.commands().iter().filter(|c| c[0] == "quit").count(),
        1
    );
    assert_eq!(
        sink.events()
            .iter()
            .filter(|e| **e == SinkEvent::Timebase(false))
            .count(),
        1
    );
}

#[test]
fn restart_creates_a_fresh_session() {
    let source = EngineSource::new(small());
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));

    pipeline.start().unwrap();
    let first = pipeline.session_id().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    assert!(wait_until(|| !sink.samples().is_empty()));
    pipeline.stop();

    let delivered = sink.samples().len();
    pipeline.start().unwrap();
    let second = pipeline.session_id().unwrap();
    assert_ne!(first, second);
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    assert!(wait_until(|| sink.samples().len() > delivered));
    pipeline.stop();

    assert_eq!(source.created().len(), 2);
    let timebases = sink
        .events()
        .iter()
        .filter(|e| **e == SinkEvent::Timebase(true))
        .count();
    assert_eq!(timebases, 2);
}

#[test]
fn controls_reach_the_engine() {
    let source = EngineSource::new(small());
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = pipeline_with(&source, RecordingSink::default(), observer.clone());
    pipeline.start().unwrap();

    let headers = vec![
        ("Referer".to_string(), "https://example.com".to_string()),
        ("User-Agent".to_string(), "softframe".to_string()),
    ];
    pipeline
        .load("https://example.com/live.m3u8", LoadPreset::Streaming, &headers)
        .unwrap();

    let engine = source.latest().unwrap();
    assert_eq!(
        engine.property(props::HTTP_HEADER_FIELDS),
        Some(PropertyValue::String(
            "Referer: https://example.com,User-Agent: softframe".into()
        ))
    );
    assert_eq!(engine.property("cache"), Some(PropertyValue::String("yes".into())));

    pipeline.seek(SeekTarget::Absolute(10.0)).unwrap();
    assert!(engine
        .commands()
        .contains(&vec!["seek".to_string(), "10".to_string(), "absolute".to_string()]));
    assert!(wait_until(|| pipeline.playback().position == 10.0));

    pipeline.set_speed(2.0).unwrap();
    assert!(wait_until(|| pipeline.playback().speed == 2.0));

    pipeline.toggle_pause().unwrap();
    assert!(wait_until(|| observer.pauses.lock().as_slice() == [true]));
    pipeline.play().unwrap();
    assert!(wait_until(|| observer.pauses.lock().as_slice() == [true, false]));
    assert!(!pipeline.playback().paused);

    pipeline.stop();
}

#[test]
fn observer_sees_loading_seekable_and_position() {
    let source = EngineSource::new(small());
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = pipeline_with(&source, RecordingSink::default(), observer.clone());
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();

    assert!(wait_until(|| observer.loading.lock().as_slice() == [true, false]));
    assert!(wait_until(|| observer.seekable.lock().contains(&true)));

    source.latest().unwrap().advance(0.5);
    assert!(wait_until(|| observer.positions.lock().contains(&0.5)));
    assert_eq!(pipeline.playback().duration, Some(60.0));

    pipeline.stop();
}

/// Stops its own pipeline as soon as playback pauses.
#[derive(Default)]
struct StopOnPause {
    pipeline: OnceLock<Weak<VideoPipeline>>,
}

impl PlaybackObserver for StopOnPause {
    fn on_pause_changed(&self, paused: bool) {
        if !paused {
            return;
        }
        if let Some(pipeline) = self.pipeline.get().and_then(Weak::upgrade) {
            pipeline.stop();
        }
    }
}

#[test]
fn stop_from_an_observer_callback() {
    let source = EngineSource::new(small());
    let observer = Arc::new(StopOnPause::default());
    let pipeline = Arc::new(pipeline_with(
        &source,
        RecordingSink::default(),
        observer.clone(),
    ));
    let _ = observer.pipeline.set(Arc::downgrade(&pipeline));

    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    pipeline.pause().unwrap();

    assert!(wait_until(|| !pipeline.is_running()));
    let engine = source.latest().unwrap();
    assert!(wait_until(|| engine.is_destroyed()));
    assert!(!engine.has_update_callback());

    pipeline.stop();
    pipeline.start().unwrap();
    pipeline.stop();
}
