use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::ResumeAnchor;

/// Cumulative paused time subtracted from every sample timestamp.
///
/// Only grows, and only at a pause→resume transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetTracker {
    offset: Duration,
    cycles: u32,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_offset(&self) -> Duration {
        self.offset
    }

    /// Number of completed pause/resume cycles.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn on_pause_resume_cycle(&mut self, elapsed_since_pause: Duration) {
        self.offset += elapsed_since_pause;
        self.cycles += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What a producer callback needs to decide about one sample, read in a
/// single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub paused: bool,
    pub offset: Duration,
}

#[derive(Debug)]
struct TimelineState {
    tracker: OffsetTracker,
    paused: bool,
    started_at: Option<Duration>,
    paused_at: Option<Duration>,
    resumed_at: Option<Duration>,
    anchor: ResumeAnchor,
}

/// Shared pause/offset state of one recording.
///
/// Written by the session's control thread, read by every producer
/// callback. The paused flag and the offset sit behind the same lock so a
/// reader never sees one updated without the other.
#[derive(Debug)]
pub struct Timeline {
    state: Mutex<TimelineState>,
}

impl Timeline {
    pub fn new(anchor: ResumeAnchor) -> Self {
        Self {
            state: Mutex::new(TimelineState {
                tracker: OffsetTracker::new(),
                paused: false,
                started_at: None,
                paused_at: None,
                resumed_at: None,
                anchor,
            }),
        }
    }

    pub fn set_anchor(&self, anchor: ResumeAnchor) {
        self.state.lock().anchor = anchor;
    }

    /// Start a new recording timeline at `now` with a zero offset.
    pub fn begin(&self, now: Duration) {
        let mut s = self.state.lock();
        s.tracker.reset();
        s.paused = false;
        s.started_at = Some(now);
        s.paused_at = None;
        s.resumed_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().started_at.is_some()
    }

    /// Returns `false` if the timeline is not running or already paused.
    pub fn pause(&self, now: Duration) -> bool {
        let mut s = self.state.lock();
        if s.started_at.is_none() || s.paused {
            return false;
        }
        s.paused = true;
        s.paused_at = Some(now);
        true
    }

    /// Close the current pause. Returns the paused interval, or `None` if
    /// the timeline was not paused.
    pub fn resume(&self, now: Duration) -> Option<Duration> {
        let mut s = self.state.lock();
        if !s.paused {
            log::warn!("resume without a preceding pause ignored");
            return None;
        }
        let paused_at = s.paused_at.take()?;
        let elapsed = now.saturating_sub(paused_at);

        s.tracker.on_pause_resume_cycle(elapsed);
        let shift = elapsed.saturating_sub(s.anchor.correction);
        if let Some(start) = s.started_at.as_mut() {
            *start += shift;
        }
        s.paused = false;
        s.resumed_at = Some(now);
        Some(elapsed)
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        let s = self.state.lock();
        TimingSnapshot {
            paused: s.paused,
            offset: s.tracker.current_offset(),
        }
    }

    pub fn current_offset(&self) -> Duration {
        self.state.lock().tracker.current_offset()
    }

    pub fn pause_count(&self) -> u32 {
        let s = self.state.lock();
        s.tracker.cycles() + u32::from(s.paused)
    }

    pub fn resumed_at(&self) -> Option<Duration> {
        self.state.lock().resumed_at
    }

    /// Time spent recording, excluding pauses. Frozen while paused.
    pub fn recorded_duration(&self, now: Duration) -> Duration {
        let s = self.state.lock();
        let Some(start) = s.started_at else {
            return Duration::ZERO;
        };
        let end = if s.paused { s.paused_at.unwrap_or(now) } else { now };
        end.saturating_sub(start)
    }

    /// Total paused time, counting an open pause up to `now`.
    pub fn paused_duration(&self, now: Duration) -> Duration {
        let s = self.state.lock();
        let open = match (s.paused, s.paused_at) {
            (true, Some(at)) => now.saturating_sub(at),
            _ => Duration::ZERO,
        };
        s.tracker.current_offset() + open
    }

    pub fn reset(&self) {
        let mut s = self.state.lock();
        s.tracker.reset();
        s.paused = false;
        s.started_at = None;
        s.paused_at = None;
        s.resumed_at = None;
    }
}
