//! Shared published playback state
//!
//! Thread-safe state the host UI reads (seek bar, pause button, stall
//! badge) and the engine writes. Uses RwLock for concurrent read access
//! with rare writes; telemetry goes out over the shared EventBus.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use fitstream_common::{EventBus, StationEvent};

use crate::playback::resilience::ResilienceStatus;

/// Everything `playback_state()` reports, in one read
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlaybackSnapshot {
    pub is_paused: bool,
    pub is_seeking: bool,
    /// Playhead position, seconds
    pub seconds: f64,
    /// Duration, seconds. 0 while unknown.
    pub duration: f64,
    pub resilience: ResilienceStatus,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            is_paused: false,
            is_seeking: false,
            seconds: 0.0,
            duration: 0.0,
            resilience: ResilienceStatus::Healthy,
        }
    }
}

/// Shared state accessible by the engine and the host
pub struct SharedState {
    snapshot: RwLock<PlaybackSnapshot>,
    bus: Arc<EventBus>,
}

impl SharedState {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::default()),
            bus,
        }
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        *self.snapshot.read().await
    }

    pub async fn update(&self, apply: impl FnOnce(&mut PlaybackSnapshot)) {
        apply(&mut *self.snapshot.write().await);
    }

    /// Broadcast a telemetry event; delivery failures are ignored
    pub fn emit(&self, event: StationEvent) {
        self.bus.emit_lossy(event);
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
