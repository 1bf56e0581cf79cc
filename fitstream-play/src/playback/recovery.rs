//! Recovery strategy planning
//!
//! Translates an abstract strategy into the concrete element operations
//! the engine performs. Kept separate from execution so the choice of
//! target position — in particular, preferring the most recent seek
//! *intent* over the last observed time on reload — is testable without
//! an element.

use fitstream_common::events::StrategyKind;

use crate::config::EngineConfig;

/// Rewind applied by the nudge strategy. Enough to force many decoders to
/// re-evaluate their buffers without a network round trip.
pub const NUDGE_REWIND_SECS: f64 = 0.001;

/// State consulted when planning a strategy
#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext {
    /// Last observed playhead position, seconds. May be a frozen clock
    /// value during a stall.
    pub position: f64,
    /// Most recent seek the user requested, honored or not
    pub seek_intent: Option<f64>,
}

/// Concrete element operations for one recovery attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Pause, rewind a hair, resume
    Nudge { target_secs: f64 },
    /// Jump backward into already-downloaded media and keep playing
    SeekBack { target_secs: f64 },
    /// Detach and reattach the source; on metadata-ready the resume
    /// cascade seeks to the hint
    Reload { resume_hint_secs: f64 },
}

pub fn plan(strategy: StrategyKind, cfg: &EngineConfig, ctx: &RecoveryContext) -> RecoveryAction {
    match strategy {
        StrategyKind::Nudge => RecoveryAction::Nudge {
            target_secs: (ctx.position - NUDGE_REWIND_SECS).max(0.0),
        },
        StrategyKind::SeekBack => RecoveryAction::SeekBack {
            target_secs: (ctx.position - cfg.seekback_secs).max(0.0),
        },
        StrategyKind::Reload => {
            // A user may have requested a seek the stalled decoder never
            // honored; replaying the stale observed time would silently
            // discard that intent.
            let prior = ctx.seek_intent.unwrap_or(ctx.position);
            RecoveryAction::Reload {
                resume_hint_secs: (prior - cfg.seek_back_on_reload_secs).max(0.0),
            }
        }
    }
}
