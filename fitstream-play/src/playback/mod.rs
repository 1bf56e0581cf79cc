//! Playback resilience pipeline
//!
//! **Module structure:**
//! - `health`: element observation, normalized signals, frame metrics
//! - `progress`: forward-progress ledger (clock + frame channels)
//! - `resilience`: stall detection and recovery escalation state machine
//! - `recovery`: strategy planning (what each strategy does to the element)
//! - `abr`: adaptive bitrate cap controller
//! - `engine`: the driver wiring it all together plus the transport façade

pub mod abr;
pub mod engine;
pub mod health;
pub mod progress;
pub mod recovery;
pub mod resilience;

pub use engine::{HardResetOptions, PlayerEngine, PlayerOptions};
