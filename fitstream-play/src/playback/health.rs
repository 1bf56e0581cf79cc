//! Media element health sampling
//!
//! Observes the underlying element and derives normalized signals:
//! wait/stall/play/pause/end flags, readiness and network state, optional
//! frame-decode metrics, and buffered "runway" ahead of the playhead.
//! Pure observation — this module never calls play, pause, or seek. If
//! the element disappears mid-sample, signals reset to baseline rather
//! than erroring.

use std::sync::Arc;

use tokio::time::Instant;

use crate::media::{
    BufferedRange, ElementProvider, FrameStats, MediaEvent, NetworkState, ReadyState,
};

/// Normalized element flags, reset to baseline on element change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSignals {
    pub waiting: bool,
    pub stalled: bool,
    pub playing: bool,
    pub paused: bool,
    pub ended: bool,
    pub buffering: bool,
    pub ready_state: ReadyState,
    pub network_state: NetworkState,
}

impl Default for PlaybackSignals {
    fn default() -> Self {
        Self {
            waiting: false,
            stalled: false,
            playing: false,
            paused: false,
            ended: false,
            buffering: false,
            ready_state: ReadyState::HaveNothing,
            network_state: NetworkState::Empty,
        }
    }
}

/// Frame-decode health, gated on runtime capability
///
/// Runtimes without decode counters collapse to `Unsupported`; downstream
/// logic pattern-matches instead of null-checking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameHealth {
    Unsupported,
    Supported {
        /// Frames were actually presented during the last polling interval
        advancing: bool,
        total: u64,
        dropped: u64,
        corrupted: u64,
        last_sample_at: Instant,
    },
}

impl FrameHealth {
    pub fn is_supported(&self) -> bool {
        matches!(self, FrameHealth::Supported { .. })
    }
}

/// One poll's worth of derived observations
#[derive(Debug, Clone, Copy)]
pub struct HealthSample {
    /// Playhead position, seconds
    pub position: f64,
    /// Duration as reported right now; NaN/0 while unknown
    pub duration: f64,
    /// Buffered seconds ahead of the playhead
    pub runway_secs: f64,
    pub signals: PlaybackSignals,
    pub frame: FrameHealth,
    /// Decoded-frame count advanced since the previous poll
    pub frame_advanced: bool,
    /// Dropped fraction of frames processed this interval, when computable
    pub dropped_fraction: Option<f64>,
}

/// Samples the current element into normalized health observations
pub struct HealthSampler {
    provider: Arc<dyn ElementProvider>,
    signals: PlaybackSignals,
    frame: FrameHealth,
    last_stats: Option<FrameStats>,
    last_runway_secs: f64,
}

impl HealthSampler {
    pub fn new(provider: Arc<dyn ElementProvider>) -> Self {
        Self {
            provider,
            signals: PlaybackSignals::default(),
            frame: FrameHealth::Unsupported,
            last_stats: None,
            last_runway_secs: 0.0,
        }
    }

    /// Fold a forwarded element lifecycle event into the signal flags
    pub fn apply_event(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::Playing => {
                self.signals.playing = true;
                self.signals.paused = false;
                self.signals.waiting = false;
                self.signals.stalled = false;
                self.signals.buffering = false;
            }
            MediaEvent::Paused => {
                self.signals.paused = true;
                self.signals.playing = false;
            }
            MediaEvent::Waiting => {
                self.signals.waiting = true;
                self.signals.buffering = true;
                self.signals.playing = false;
            }
            MediaEvent::Stalled => {
                self.signals.stalled = true;
            }
            MediaEvent::Ended => {
                self.signals.ended = true;
                self.signals.playing = false;
            }
            MediaEvent::LoadedMetadata => {
                // Fresh attach: end flag from a previous source no longer applies
                self.signals.ended = false;
            }
            MediaEvent::TimeUpdate
            | MediaEvent::Seeking
            | MediaEvent::Seeked
            | MediaEvent::Error { .. } => {}
        }
    }

    /// Reset every derived signal to baseline (element changed or vanished)
    pub fn reset(&mut self) {
        self.signals = PlaybackSignals::default();
        self.frame = FrameHealth::Unsupported;
        self.last_stats = None;
        self.last_runway_secs = 0.0;
    }

    /// Poll the element. Returns None (after resetting to baseline) when no
    /// element is mounted.
    pub fn sample(&mut self, now: Instant) -> Option<HealthSample> {
        let Some(element) = self.provider.element() else {
            self.reset();
            return None;
        };

        let position = element.current_time();
        let duration = element.duration();

        self.signals.ready_state = element.ready_state();
        self.signals.network_state = element.network_state();
        self.signals.paused = element.paused();
        self.signals.ended = self.signals.ended || element.ended();
        self.signals.buffering =
            self.signals.waiting || self.signals.ready_state <= ReadyState::HaveCurrentData;

        let runway_secs = runway(&element.buffered(), position);
        self.last_runway_secs = runway_secs;

        let (frame_advanced, dropped_fraction) = match element.frame_stats() {
            None => {
                self.frame = FrameHealth::Unsupported;
                self.last_stats = None;
                (false, None)
            }
            Some(stats) => {
                let previous = self.last_stats.replace(stats);
                let (advanced, fraction) = match previous {
                    None => (false, None),
                    Some(prev) => {
                        let total_delta = stats.total.saturating_sub(prev.total);
                        let dropped_delta = stats.dropped.saturating_sub(prev.dropped);
                        let presented = total_delta.saturating_sub(dropped_delta);
                        let fraction = if total_delta > 0 {
                            Some(dropped_delta as f64 / total_delta as f64)
                        } else {
                            None
                        };
                        (presented > 0, fraction)
                    }
                };
                self.frame = FrameHealth::Supported {
                    advancing: advanced,
                    total: stats.total,
                    dropped: stats.dropped,
                    corrupted: stats.corrupted,
                    last_sample_at: now,
                };
                (advanced, fraction)
            }
        };

        Some(HealthSample {
            position,
            duration,
            runway_secs,
            signals: self.signals,
            frame: self.frame,
            frame_advanced,
            dropped_fraction,
        })
    }

    pub fn signals(&self) -> PlaybackSignals {
        self.signals
    }

    pub fn frame_health(&self) -> FrameHealth {
        self.frame
    }

    pub fn runway_secs(&self) -> f64 {
        self.last_runway_secs
    }
}

/// Buffered seconds ahead of the playhead
///
/// Zero when the playhead sits outside every buffered span. The small
/// slack absorbs range bookkeeping that trails the playhead by a frame.
fn runway(ranges: &[BufferedRange], position: f64) -> f64 {
    const SLACK: f64 = 0.1;
    ranges
        .iter()
        .find(|r| position >= r.start - SLACK && position <= r.end)
        .map(|r| (r.end - position).max(0.0))
        .unwrap_or(0.0)
}
