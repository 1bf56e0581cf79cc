//! # FitStream Playback Resilience Engine (fitstream-play)
//!
//! Keeps one active audio/video stream playing smoothly despite unreliable
//! origin servers, transient network stalls, codec/demuxer stutters, and
//! loss of in-memory state across UI remounts — without losing the viewer's
//! position or forcing a full reload of the host.
//!
//! **Architecture:** four layers, leaves first:
//! 1. Health sampler — observes the media element, derives normalized signals
//! 2. Progress ledger — fuses signals and clock deltas into one progress token
//! 3. Resilience state machine — stall detection and escalating recovery
//! 4. Transport façade + resume ledger — command surface and sticky resume
//!
//! The host UI talks only to [`PlayerEngine`] and reads its published state;
//! telemetry flows over the shared `EventBus`.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod playback;
pub mod resume;
pub mod session;
pub mod state;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::{HardResetOptions, PlayerEngine, PlayerOptions};
pub use session::SessionStore;
pub use state::{PlaybackSnapshot, SharedState};
