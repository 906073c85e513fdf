//! Host callbacks.

use crate::subtitle::SubtitleStyle;

/// Receives playback notifications and supplies subtitle content.
///
/// Notifications arrive on the event thread; the subtitle lookups are made
/// from the render thread once per tick. Every method has a no-op default.
pub trait PlaybackObserver: Send + Sync {
    /// Position or duration changed. Times are in seconds.
    fn on_position(&self, _position: f64, _duration: Option<f64>) {}

    fn on_pause_changed(&self, _paused: bool) {}

    /// Buffering started or finished.
    fn on_loading_changed(&self, _loading: bool) {}

    /// The stream can (or can no longer) be seeked.
    fn on_ready_to_seek(&self, _seekable: bool) {}

    /// Subtitle text to show at `position` seconds.
    fn subtitle_text(&self, _position: f64) -> Option<String> {
        None
    }

    fn subtitle_style(&self) -> SubtitleStyle {
        SubtitleStyle::default()
    }
}

/// Observer that ignores everything and never shows subtitles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PlaybackObserver for NoopObserver {}
