//! Media element abstraction
//!
//! The engine never owns the decoder. The host hands it an accessor for
//! whatever element is currently mounted (or none, mid-remount) and
//! forwards that element's lifecycle events. Everything here is the
//! vocabulary of that boundary: the element trait, its coarse readiness
//! states, buffered ranges, frame-decode counters, and the forwarded
//! event type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How much of the current media the element can render right now
///
/// Ordered: later variants imply every earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Element network activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Empty,
    Idle,
    Loading,
    NoSource,
}

/// One contiguous buffered span, seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

/// Decode counters, cumulative since the element attached
///
/// Runtimes that expose no decode telemetry return `None` from
/// [`MediaElement::frame_stats`]; frame-gated logic (ABR, the frame
/// progress channel) stays dormant for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub total: u64,
    pub dropped: u64,
    pub corrupted: u64,
}

/// The underlying media element the engine observes and nudges
///
/// Commands are best-effort and must not block: a wrapper around a real
/// decoder queues the request and reports failures through a forwarded
/// [`MediaEvent::Error`] rather than a return value.
pub trait MediaElement: Send + Sync {
    /// Current playhead position, seconds
    fn current_time(&self) -> f64;

    /// Move the playhead. Completion is signaled by a `Seeked` event.
    fn set_current_time(&self, seconds: f64);

    /// Total duration, seconds. NaN or 0 while unknown.
    fn duration(&self) -> f64;

    fn paused(&self) -> bool;

    fn ended(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn network_state(&self) -> NetworkState;

    /// Buffered spans, seconds. May be empty while loading.
    fn buffered(&self) -> Vec<BufferedRange>;

    /// True for video surfaces; audio-only elements return false
    fn is_video(&self) -> bool;

    /// Cumulative decode counters, or None when the runtime exposes none
    fn frame_stats(&self) -> Option<FrameStats>;

    /// Request playback start
    fn request_play(&self);

    /// Request playback pause
    fn request_pause(&self);

    /// Detach and reattach the source. Ends with a fresh metadata-ready
    /// event on success.
    fn reload(&self);
}

/// Accessor for the currently mounted element
///
/// Returns None whenever the host is between mounts. The engine treats
/// that as "reset signals to baseline", never as an error.
pub trait ElementProvider: Send + Sync {
    fn element(&self) -> Option<Arc<dyn MediaElement>>;
}

impl<F> ElementProvider for F
where
    F: Fn() -> Option<Arc<dyn MediaElement>> + Send + Sync,
{
    fn element(&self) -> Option<Arc<dyn MediaElement>> {
        self()
    }
}

/// Element lifecycle events the host forwards into the engine
///
/// Mirrors the element's own event vocabulary one-to-one so host glue
/// stays a dumb relay.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Playback began or resumed after buffering
    Playing,
    /// Element paused (including pauses the engine itself requested)
    Paused,
    /// Rendering stopped waiting for data
    Waiting,
    /// Network fetch stalled
    Stalled,
    /// Playhead position advanced
    TimeUpdate,
    /// A seek began
    Seeking,
    /// A seek completed
    Seeked,
    /// Duration and dimensions are known; safe to position the playhead
    LoadedMetadata,
    /// Playback reached the end of the media
    Ended,
    /// Load or decode failure. Surfaced to the host, never auto-retried.
    Error { code: Option<u32>, message: String },
}
