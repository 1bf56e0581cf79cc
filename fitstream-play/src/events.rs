//! Event surface for the playback engine
//!
//! Re-exports the shared telemetry vocabulary from fitstream-common so
//! engine internals and hosts import from one place.

pub use fitstream_common::events::{
    AbrReason, EventBus, PlaybackState, ResumeRule, StallPhase, StationEvent, StrategyKind,
};
