//! Event types for the FitStream station
//!
//! # Architecture
//!
//! FitStream components use hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many telemetry broadcasting
//! - **Direct method calls**: host UI → player command surface
//! - **Shared state** (Arc<RwLock<T>>): read-heavy published playback state
//!
//! The playback engine publishes structured telemetry over the EventBus;
//! the observability layer and the station UI subscribe. Events are plain
//! data tagged with the media identity they concern, serde-ready for the
//! host's diagnostic transport. They are not a wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ident::MediaId;

/// Published playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Ended,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Stall escalation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StallPhase {
    Soft,
    Hard,
}

/// Recovery strategy identifier
///
/// Ordered by invasiveness. `Nudge` touches only the decoder, `SeekBack`
/// moves the playhead within downloaded media, `Reload` detaches and
/// reattaches the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Nudge,
    SeekBack,
    Reload,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Nudge => write!(f, "nudge"),
            StrategyKind::SeekBack => write!(f, "seekback"),
            StrategyKind::Reload => write!(f, "reload"),
        }
    }
}

/// Which rule of the start-position cascade produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeRule {
    /// Caller-declared start applied on effective first load
    DeclaredStart,
    /// Short clip: declared start ignored, begin at zero
    ShortClip,
    /// Session-local seek intent (most recent user request)
    SeekIntent,
    /// Cached seek intent for the identity
    CachedSeekIntent,
    /// Last observed position this session
    SessionPosition,
    /// Cached last position for the identity
    CachedPosition,
    /// Candidate landed in the final seconds/percent: restart from zero
    RestartNearEnd,
    /// Caller explicitly requested a restart from the beginning
    ForcedRestart,
    /// Nothing usable: begin at zero
    Default,
}

/// Why the adaptive-bitrate controller changed the cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbrReason {
    /// Dropped-frame fraction exceeded the allowance
    Downscale,
    /// Sustained healthy decode: cap doubled
    RampUp,
    /// Cap held at the ceiling long enough: cap removed
    ResetToUnlimited,
}

/// FitStream telemetry event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StationEvent {
    /// A player engine attached to an element for this identity
    EngineMounted {
        media_id: MediaId,
        mount_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Playback state changed
    PlaybackStateChanged {
        media_id: MediaId,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// Playback progress update (periodic while playing)
    PlaybackProgress {
        media_id: MediaId,
        position_secs: f64,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Forward progress went silent past a stall window
    StallDetected {
        media_id: MediaId,
        phase: StallPhase,
        silent_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A recovery strategy is being applied
    RecoveryAttempted {
        media_id: MediaId,
        strategy: StrategyKind,
        attempt_index: u32,
        timestamp: DateTime<Utc>,
    },

    /// A recovery attempt concluded
    RecoveryOutcome {
        media_id: MediaId,
        strategy: StrategyKind,
        attempt_index: u32,
        recovered: bool,
        timestamp: DateTime<Utc>,
    },

    /// All recovery strategies exhausted; stall is terminal-for-now
    RecoveryExhausted {
        media_id: MediaId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Start-position decision made at a metadata-ready event
    ResumeDecision {
        media_id: MediaId,
        start_seconds: f64,
        rule: ResumeRule,
        timestamp: DateTime<Utc>,
    },

    /// Bitrate cap changed by the adaptive controller
    BitrateAdaptation {
        media_id: MediaId,
        cap_kbps: Option<u32>,
        reason: AbrReason,
        timestamp: DateTime<Utc>,
    },

    /// The media element reported a load/decode error
    ///
    /// Not auto-retried; the host decides whether to swap media.
    ElementError {
        media_id: MediaId,
        code: Option<u32>,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

// ========================================
// EventBus
// ========================================

/// One-to-many event broadcaster for StationEvents
///
/// Thin wrapper around `tokio::sync::broadcast`. Subscribers that fall
/// behind lose the oldest buffered events, which is acceptable for
/// telemetry.
pub struct EventBus {
    tx: broadcast::Sender<StationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    pub fn emit(
        &self,
        event: StationEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<StationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring delivery failures
    ///
    /// Telemetry must never take the playback loop down with it; use this
    /// from engine internals.
    pub fn emit_lossy(&self, event: StationEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn progress_event() -> StationEvent {
        StationEvent::PlaybackProgress {
            media_id: MediaId::new("ride-1"),
            position_secs: 42.0,
            duration_secs: 1800.0,
            timestamp: crate::time::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        assert!(bus.emit(progress_event()).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        bus.emit(StationEvent::StallDetected {
            media_id: MediaId::new("ride-1"),
            phase: StallPhase::Soft,
            silent_ms: 2500,
            timestamp: crate::time::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            StationEvent::StallDetected {
                media_id, phase, ..
            } => {
                assert_eq!(media_id, MediaId::new("ride-1"));
                assert_eq!(phase, StallPhase::Soft);
            }
            other => panic!("Wrong event type received: {other:?}"),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy_does_not_panic() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe(); // subscribe but never receive

        for _ in 0..10 {
            bus.emit_lossy(progress_event());
        }
    }

    #[test]
    fn test_station_event_serializes_with_type_tag() {
        let json = serde_json::to_string(&progress_event()).unwrap();
        assert!(json.contains("\"type\":\"PlaybackProgress\""));
        assert!(json.contains("\"media_id\":\"ride-1\""));
    }

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::Nudge.to_string(), "nudge");
        assert_eq!(StrategyKind::SeekBack.to_string(), "seekback");
        assert_eq!(StrategyKind::Reload.to_string(), "reload");
    }
}
