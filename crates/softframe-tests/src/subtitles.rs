//! SRT tracks served through an observer into the pipeline.

use crate::support::{pipeline_with, pump_until, EngineSource, RecordingSink};
use proptest::prelude::*;
use softframe_core::VideoDimensions;
use softframe_engine::SyntheticConfig;
use softframe_render::{LoadPreset, PlaybackObserver, SeekTarget, SubtitleStyle, SubtitleTrack};
use std::sync::Arc;
use std::time::Duration;

const SRT: &str = "\u{feff}1\r\n00:00:01,000 --> 00:00:03,500\r\n<i>Hello</i>\r\n\r\n\
2\r\n00:00:05,000 --> 00:00:07,000 X1:10 X2:20\r\nTwo\r\nlines\r\n\r\n";

struct TrackObserver {
    track: SubtitleTrack,
    style: SubtitleStyle,
}

impl PlaybackObserver for TrackObserver {
    fn subtitle_text(&self, position: f64) -> Option<String> {
        self.track.active_text_at_secs(position).map(str::to_string)
    }

    fn subtitle_style(&self) -> SubtitleStyle {
        self.style
    }
}

#[test]
fn srt_with_bom_crlf_and_markup() {
    let track = SubtitleTrack::from_srt(SRT).unwrap();
    assert_eq!(track.len(), 2);
    assert_eq!(track.active_text_at_secs(0.5), None);
    assert_eq!(track.active_text_at_secs(1.0), Some("Hello"));
    assert_eq!(track.active_text_at_secs(3.5), None);
    assert_eq!(track.active_text_at_secs(6.0), Some("Two\nlines"));
    assert_eq!(track.active_text_at_secs(f64::NAN), None);
    assert_eq!(track.cues()[1].start, Duration::from_secs(5));
}

#[test]
fn track_text_follows_playback_position() {
    let source = EngineSource::new(SyntheticConfig {
        video_size: VideoDimensions::new(320, 180),
        ..Default::default()
    });
    let sink = RecordingSink::with_marker([90, 200, 10, 255]);
    let observer = Arc::new(TrackObserver {
        track: SubtitleTrack::from_srt(SRT).unwrap(),
        style: SubtitleStyle {
            text_color: [10, 200, 90, 255],
            ..Default::default()
        },
    });
    let pipeline = pipeline_with(&source, sink.clone(), observer);
    pipeline.start().unwrap();
    pipeline.load("synthetic://subs", LoadPreset::Standard, &[]).unwrap();
    let engine = source.latest().unwrap();

    assert!(pump_until(&engine, || sink
        .samples()
        .last()
        .is_some_and(|s| s.marked == 0)));

    pipeline.seek(SeekTarget::Absolute(2.0)).unwrap();
    assert!(pump_until(&engine, || sink
        .samples()
        .last()
        .is_some_and(|s| s.marked > 0)));

    pipeline.seek(SeekTarget::Absolute(4.0)).unwrap();
    assert!(pump_until(&engine, || sink
        .samples()
        .last()
        .is_some_and(|s| s.marked == 0)));
    pipeline.stop();
}

fn cue_block(index: usize, start_ms: u64, end_ms: u64, text: &str) -> String {
    let ts = |ms: u64| {
        format!(
            "{:02}:{:02}:{:02},{:03}",
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1000 % 60,
            ms % 1000
        )
    };
    format!("{}\n{} --> {}\n{}\n\n", index, ts(start_ms), ts(end_ms), text)
}

proptest! {
    #[test]
    fn disjoint_cues_resolve_at_their_midpoints(
        spans in prop::collection::vec((1u64..5_000, 1u64..5_000), 1..20)
    ) {
        let mut srt = String::new();
        let mut cursor = 0u64;
        let mut expected = Vec::new();
        for (i, (gap, len)) in spans.iter().enumerate() {
            let start = cursor + gap;
            let end = start + len;
            let text = format!("cue {}", i);
            srt.push_str(&cue_block(i + 1, start, end, &text));
            expected.push((start, end, text));
            cursor = end;
        }

        let track = SubtitleTrack::from_srt(&srt).unwrap();
        prop_assert_eq!(track.len(), expected.len());
        for (start, end, text) in &expected {
            let mid = Duration::from_millis((start + end) / 2);
            prop_assert_eq!(track.active_text(mid), Some(text.as_str()));
            prop_assert_eq!(track.active_text(Duration::from_millis(*end)), None);
        }
    }
}
