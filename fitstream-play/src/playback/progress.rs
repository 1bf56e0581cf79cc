//! Forward-progress ledger
//!
//! Fuses health signals and playhead-clock deltas into one "last forward
//! progress" token. Clock advance and frame advance are independent
//! progress channels: either alone counts as progress, and only when both
//! are silent past the stall window does stall detection engage. The
//! token is the sole liveness test — never raw clock polling, which can
//! free-run during a frozen decode.

use tokio::time::{Duration, Instant};

/// Which channel verified the progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    /// Playhead clock moved past the comparison epsilon
    Clock,
    /// An element lifecycle event implied progress (seek completed,
    /// metadata arrived)
    Event,
    /// Decoded-frame count advanced between polls
    Frame,
}

/// The most recent verified forward progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressMark {
    /// Monotonic; never decreases, bumps on every verified progress
    pub token: u64,
    pub source: ProgressSource,
    pub at: Instant,
    /// Playhead position at the mark, when the channel knows one
    pub seconds: Option<f64>,
}

/// Monotonic progress bookkeeping for one element attachment
pub struct ProgressLedger {
    epsilon: f64,
    mark: ProgressMark,
    last_clock_seconds: Option<f64>,
}

impl ProgressLedger {
    /// `epsilon` is the clock-comparison threshold, seconds (see
    /// `EngineConfig::progress_epsilon`).
    pub fn new(epsilon: f64, now: Instant) -> Self {
        Self {
            epsilon,
            mark: ProgressMark {
                token: 0,
                source: ProgressSource::Event,
                at: now,
                seconds: None,
            },
            last_clock_seconds: None,
        }
    }

    /// Record verified progress from any channel. Returns the new token.
    pub fn record(&mut self, source: ProgressSource, seconds: Option<f64>, now: Instant) -> u64 {
        self.mark = ProgressMark {
            token: self.mark.token + 1,
            source,
            at: now,
            seconds,
        };
        if seconds.is_some() {
            self.last_clock_seconds = seconds;
        }
        self.mark.token
    }

    /// Clock channel: compare the live position against the last recorded
    /// one. Records progress only on a forward move past epsilon; backward
    /// jumps re-baseline without counting as progress.
    pub fn observe_clock(&mut self, seconds: f64, now: Instant) -> bool {
        if !seconds.is_finite() {
            return false;
        }
        match self.last_clock_seconds {
            None => {
                // First observation establishes the baseline only
                self.last_clock_seconds = Some(seconds);
                false
            }
            Some(prev) if seconds - prev > self.epsilon => {
                self.record(ProgressSource::Clock, Some(seconds), now);
                true
            }
            Some(prev) if seconds < prev => {
                self.last_clock_seconds = Some(seconds);
                false
            }
            Some(_) => false,
        }
    }

    /// Move the clock baseline without counting progress. Used after the
    /// engine repositions the playhead itself: the jump proves nothing
    /// about decode liveness, and measuring the next clock delta against
    /// the stale position would.
    pub fn rebaseline(&mut self, seconds: f64) {
        if seconds.is_finite() {
            self.last_clock_seconds = Some(seconds);
        }
    }

    pub fn token(&self) -> u64 {
        self.mark.token
    }

    pub fn last_mark(&self) -> ProgressMark {
        self.mark
    }

    /// How long both channels have been silent
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.duration_since(self.mark.at)
    }
}
