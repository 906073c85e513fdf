//! State shared between the event thread, the render thread and callers.
//!
//! Each value sits behind its own reader/writer lock: the event thread takes
//! short write locks, the render thread takes read locks and copies out a
//! snapshot, so a tick never observes a half-applied update.

use parking_lot::RwLock;
use softframe_color::ColorState;
use softframe_core::VideoDimensions;
use std::sync::atomic::{AtomicBool, Ordering};

/// Playback progress as last reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    /// Current position in seconds.
    pub position: f64,
    /// Known duration in seconds, if any.
    pub duration: Option<f64>,
    pub paused: bool,
    /// Buffering or loading a file.
    pub loading: bool,
    pub speed: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: None,
            paused: false,
            loading: false,
            speed: 1.0,
        }
    }
}

/// Cross-thread state cell.
#[derive(Debug, Default)]
pub struct SharedState {
    dimensions: RwLock<VideoDimensions>,
    color: RwLock<ColorState>,
    playback: RwLock<PlaybackState>,
    /// Set by a reconfig, consumed by the next rendered frame.
    reconfig_pending: AtomicBool,
    /// Set by a reload, consumed by the next render tick.
    clear_pending: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> VideoDimensions {
        *self.dimensions.read()
    }

    /// Store new dimensions; returns true when they changed.
    pub fn set_dimensions(&self, dims: VideoDimensions) -> bool {
        let mut current = self.dimensions.write();
        if *current == dims {
            return false;
        }
        *current = dims;
        true
    }

    /// Atomic copy of the color state.
    pub fn color(&self) -> ColorState {
        *self.color.read()
    }

    /// Mutate the color state under the write lock.
    pub fn update_color<F: FnOnce(&mut ColorState)>(&self, f: F) -> ColorState {
        let mut color = self.color.write();
        f(&mut color);
        *color
    }

    pub fn playback(&self) -> PlaybackState {
        *self.playback.read()
    }

    /// Mutate playback state under the write lock, returning the result.
    pub fn update_playback<F: FnOnce(&mut PlaybackState)>(&self, f: F) -> PlaybackState {
        let mut playback = self.playback.write();
        f(&mut playback);
        *playback
    }

    pub fn mark_reconfig(&self) {
        self.reconfig_pending.store(true, Ordering::Release);
    }

    pub fn take_reconfig(&self) -> bool {
        self.reconfig_pending.swap(false, Ordering::AcqRel)
    }

    pub fn request_clear(&self) {
        self.clear_pending.store(true, Ordering::Release);
    }

    pub fn take_clear(&self) -> bool {
        self.clear_pending.swap(false, Ordering::AcqRel)
    }

    /// Forget everything learned from the previous session.
    pub fn reset(&self) {
        *self.dimensions.write() = VideoDimensions::ZERO;
        *self.color.write() = ColorState::default();
        *self.playback.write() = PlaybackState::default();
        self.reconfig_pending.store(false, Ordering::Release);
        self.clear_pending.store(false, Ordering::Release);
    }
}
