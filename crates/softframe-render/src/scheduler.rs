//! Frame pacing.
//!
//! The engine can signal "new frame" far faster than the display refreshes.
//! The scheduler turns that burst into at most one tick per minimum
//! interval: an early signal defers a single tick to the end of the
//! interval, and any signal that arrives while one is deferred is absorbed.

use std::time::{Duration, Instant};
use tracing::trace;

/// What the render loop should do with an update signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Render now.
    Immediate,
    /// Render once `poll` reaches this instant.
    Deferred(Instant),
    /// A deferred tick already covers this signal.
    Coalesced,
    /// Scheduling is disabled.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    PendingDeferred { deadline: Instant },
}

/// Two-state debounce machine.
#[derive(Debug)]
pub struct FrameScheduler {
    state: State,
    min_interval: Duration,
    last_tick: Option<Instant>,
    enabled: bool,
    ticks: u64,
}

impl FrameScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: State::Idle,
            min_interval,
            last_tick: None,
            enabled: true,
            ticks: 0,
        }
    }

    /// Pace to the slower of the display refresh and `max_fps`.
    pub fn from_refresh(display_hz: Option<u32>, max_fps: u32) -> Self {
        let cap = max_fps.max(1);
        let hz = match display_hz {
            Some(hz) if hz > 0 => hz.min(cap),
            _ => cap,
        };
        Self::new(Duration::from_secs_f64(1.0 / hz as f64))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Handle an "update available" signal.
    pub fn on_update_signal(&mut self, now: Instant) -> Schedule {
        if !self.enabled {
            return Schedule::Ignored;
        }
        match self.state {
            State::PendingDeferred { .. } => Schedule::Coalesced,
            State::Idle => match self.last_tick {
                Some(last) if now.saturating_duration_since(last) < self.min_interval => {
                    let deadline = last + self.min_interval;
                    self.state = State::PendingDeferred { deadline };
                    trace!(?deadline, "tick deferred");
                    Schedule::Deferred(deadline)
                }
                _ => {
                    self.record_tick(now);
                    Schedule::Immediate
                }
            },
        }
    }

    /// Fire the deferred tick if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            State::PendingDeferred { deadline } if self.enabled && now >= deadline => {
                self.state = State::Idle;
                self.record_tick(now);
                true
            }
            _ => false,
        }
    }

    /// Deadline of the pending deferred tick, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::PendingDeferred { deadline } if self.enabled => Some(deadline),
            _ => None,
        }
    }

    /// Stop scheduling; pending work is dropped.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.state = State::Idle;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ticks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn record_tick(&mut self, now: Instant) {
        self.last_tick = Some(now);
        self.ticks += 1;
    }
}
