//! Frames from engine to display sink: reconfig flushes, color and
//! subtitles.

use crate::support::{
    pipeline_with, pump_until, wait_until, EngineSource, RecordingObserver, RecordingSink,
    Sample, SinkEvent,
};
use softframe_color::{Primaries, Transfer};
use softframe_core::VideoDimensions;
use softframe_engine::SyntheticConfig;
use softframe_render::{LoadPreset, NoopObserver, SubtitleStyle};
use std::sync::Arc;

fn sized(width: u32, height: u32) -> SyntheticConfig {
    SyntheticConfig {
        video_size: VideoDimensions::new(width, height),
        ..Default::default()
    }
}

fn has_size(sample: &Sample, width: u32, height: u32) -> bool {
    sample.width == width && sample.height == height
}

#[test]
fn reconfig_discards_display_before_new_size() {
    let source = EngineSource::new(sized(1920, 1080));
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();

    assert!(pump_until(&engine, || sink
        .samples()
        .iter()
        .any(|s| has_size(s, 1920, 1080))));

    let events = sink.events();
    assert_eq!(events[0], SinkEvent::Timebase(true));
    assert!(matches!(&events[1], SinkEvent::Enqueue(s) if has_size(s, 1920, 1080)));

    engine.reconfigure(1280, 720);
    assert!(pump_until(&engine, || sink
        .samples()
        .iter()
        .any(|s| has_size(s, 1280, 720))));

    let events = sink.events();
    let first_small = events
        .iter()
        .position(|e| matches!(e, SinkEvent::Enqueue(s) if has_size(s, 1280, 720)))
        .unwrap();
    assert_eq!(events[first_small - 1], SinkEvent::Flush { discard: true });
    assert!(events[first_small..].iter().all(|e| match e {
        SinkEvent::Enqueue(s) => has_size(s, 1280, 720),
        _ => true,
    }));
    assert_eq!(
        events.iter().filter(|e| **e == SinkEvent::Timebase(true)).count(),
        1
    );

    assert_eq!(pipeline.dimensions(), VideoDimensions::new(1280, 720));
    assert_eq!(pipeline.pool().target(), VideoDimensions::new(1280, 720));
    assert!(pipeline
        .pool()
        .idle_dimensions()
        .iter()
        .all(|d| *d == VideoDimensions::new(1280, 720)));
    assert!(pipeline.render_stats().resizes >= 2);

    let samples = sink.samples();
    assert!(samples.windows(2).all(|w| w[0].pts <= w[1].pts));
    pipeline.stop();
}

#[test]
fn reload_flushes_before_the_next_frame() {
    let source = EngineSource::new(sized(320, 180));
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://one", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();
    assert!(pump_until(&engine, || !sink.samples().is_empty()));

    let mark = sink.event_count();
    pipeline.load("synthetic://two", LoadPreset::Standard, &[]).unwrap();
    assert!(pump_until(&engine, || {
        let events = sink.events();
        let tail = &events[mark..];
        tail.iter()
            .position(|e| *e == SinkEvent::Flush { discard: false })
            .is_some_and(|flush| {
                tail[flush..]
                    .iter()
                    .any(|e| matches!(e, SinkEvent::Enqueue(_)))
            })
    }));

    let stats = pipeline.sink_stats().unwrap();
    assert!(stats.flushes >= 1);
    assert!(stats.delivered >= 2);
    pipeline.stop();
}

#[test]
fn hdr_tags_reach_delivered_frames() {
    let source = EngineSource::new(SyntheticConfig {
        color_tags: Some(("bt.2020".into(), "pq".into(), "bt.2020-ncl".into())),
        ..sized(320, 180)
    });
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://hdr", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();

    assert!(pump_until(&engine, || sink.samples().iter().any(|s| s.edr)));
    let color = pipeline.color();
    assert_eq!(color.primaries, Some(Primaries::Bt2020));
    assert_eq!(color.transfer, Some(Transfer::Pq));

    engine.set_color_tags("bt.709", "bt.1886", "bt.709", None);
    assert!(pump_until(&engine, || sink
        .samples()
        .last()
        .is_some_and(|s| !s.edr)));
    assert_eq!(pipeline.color().transfer, Some(Transfer::Bt709));
    pipeline.stop();
}

#[test]
fn subtitles_are_burned_into_frames() {
    let text_color = [10, 200, 90, 255];
    let source = EngineSource::new(sized(320, 180));
    let sink = RecordingSink::with_marker([90, 200, 10, 255]);
    let observer = Arc::new(RecordingObserver::default());
    *observer.style.lock() = SubtitleStyle {
        text_color,
        ..Default::default()
    };
    *observer.subtitle.lock() = Some("HI".into());

    let pipeline = pipeline_with(&source, sink.clone(), observer.clone());
    pipeline.start().unwrap();
    pipeline.load("synthetic://subs", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();

    assert!(pump_until(&engine, || sink.samples().iter().any(|s| s.marked > 0)));

    *observer.subtitle.lock() = None;
    assert!(pump_until(&engine, || sink
        .samples()
        .last()
        .is_some_and(|s| s.marked == 0)));

    *observer.subtitle.lock() = Some("HI".into());
    observer.style.lock().enabled = false;
    let mark = sink.samples().len();
    assert!(pump_until(&engine, || {
        let samples = sink.samples();
        samples.len() > mark && samples.last().is_some_and(|s| s.marked == 0)
    }));
    pipeline.stop();
}

#[test]
fn failed_sink_is_discarded_and_recovers() {
    let source = EngineSource::new(sized(160, 90));
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();
    assert!(pump_until(&engine, || !sink.samples().is_empty()));

    let mark = sink.event_count();
    sink.set_failed(true);
    assert!(pump_until(&engine, || {
        let events = sink.events();
        events[mark..]
            .windows(2)
            .any(|w| {
                w[0] == SinkEvent::Flush { discard: true }
                    && matches!(w[1], SinkEvent::Enqueue(_))
            })
    }));
    assert!(pipeline.sink_stats().unwrap().discard_flushes >= 1);
    pipeline.stop();
}

#[test]
fn render_failures_drop_frames_without_stopping() {
    let source = EngineSource::new(sized(160, 90));
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();
    assert!(pump_until(&engine, || !sink.samples().is_empty()));

    engine.fail_next_renders(3);
    assert!(pump_until(&engine, || pipeline.render_stats().dropped >= 3));
    let delivered = sink.samples().len();
    assert!(pump_until(&engine, || sink.samples().len() > delivered));
    assert!(pipeline.is_running());
    pipeline.stop();
}

#[test]
fn frames_wait_for_the_first_reconfig() {
    let source = EngineSource::new(sized(160, 90));
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    let engine = source.latest().unwrap();

    engine.signal_frame();
    assert!(wait_until(|| pipeline.render_stats().skipped >= 1));
    assert!(sink.samples().is_empty());
    assert_eq!(engine.rendered_frames(), 0);
    pipeline.stop();
}

#[test]
fn frame_signalled_during_render_is_still_rendered() {
    let source = EngineSource::new(SyntheticConfig {
        consuming_update: true,
        ..sized(160, 90)
    });
    let sink = RecordingSink::default();
    let pipeline = pipeline_with(&source, sink.clone(), Arc::new(NoopObserver));
    pipeline.start().unwrap();
    pipeline.load("synthetic://bars", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();
    assert!(pump_until(&engine, || !sink.samples().is_empty()));

    let mut settled = engine.rendered_frames();
    assert!(wait_until(|| {
        std::thread::sleep(std::time::Duration::from_millis(50));
        let now = engine.rendered_frames();
        std::mem::replace(&mut settled, now) == now
    }));

    let delivered = sink.samples().len();

    engine.signal_during_renders(1);
    engine.signal_frame();
    assert!(wait_until(|| engine.rendered_frames() >= settled + 2));
    assert!(wait_until(|| sink.samples().len() >= delivered + 2));
    pipeline.stop();
}
