//! Start-position decision cascade
//!
//! Runs on every metadata-ready event — the true first load and every
//! later reattachment alike — and picks where the playhead starts. The
//! cascade prefers what the user most recently asked for over what was
//! merely observed, restarts from zero when the candidate lands in the
//! final seconds of an item (almost always a stale artifact of the
//! previous session ending, not a genuine pause point), and shaves a
//! small cushion off sticky candidates to compensate for staleness.
//!
//! Pure decision logic: no element access, no store access. The engine
//! assembles a [`ResumeContext`] from its own state plus the session
//! store and applies the returned [`ResumeDecision`].

use fitstream_common::events::ResumeRule;

use crate::config::ResumeConfig;

/// Everything the cascade consults, gathered at one metadata event
///
/// `duration` must be the value the element reports *now*, never a cached
/// one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeContext {
    /// Duration reported at this metadata event, seconds. NaN/0 while unknown.
    pub duration: f64,
    pub is_video: bool,
    /// Start position the host declared at mount
    pub declared_start: Option<f64>,
    /// Most recent explicit seek request this session
    pub fresh_seek_intent: Option<f64>,
    /// Seek intent cached for the identity by a previous mount
    pub cached_seek_intent: Option<f64>,
    /// Last position observed this session
    pub session_position: Option<f64>,
    /// Position cached for the identity by a previous mount
    pub cached_position: Option<f64>,
    /// Declared start was already applied for this identity
    pub start_applied: bool,
    /// Caller explicitly requested restart-from-beginning
    pub forced_restart: bool,
}

/// Outcome of the cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumeDecision {
    pub start_seconds: f64,
    pub rule: ResumeRule,
    /// Cached resume state for the identity must be dropped
    pub clear_cache: bool,
}

pub fn decide_start(cfg: &ResumeConfig, ctx: &ResumeContext) -> ResumeDecision {
    let duration_known = ctx.duration.is_finite() && ctx.duration > 0.0;

    if ctx.forced_restart {
        return ResumeDecision {
            start_seconds: 0.0,
            rule: ResumeRule::ForcedRestart,
            clear_cache: true,
        };
    }

    // Sticky candidates get the staleness cushion; declared starts do not.
    let (candidate, rule, sticky) = if !ctx.start_applied {
        // Effective first load for the identity. Unknown duration errs
        // toward honoring the requested start.
        let long_enough =
            ctx.is_video || !duration_known || ctx.duration > cfg.long_clip_secs;
        match ctx.declared_start.filter(|s| *s > 0.0) {
            Some(s) if long_enough => (s, ResumeRule::DeclaredStart, false),
            Some(_) => (0.0, ResumeRule::ShortClip, false),
            None => (0.0, ResumeRule::Default, false),
        }
    } else if let Some(s) = ctx.fresh_seek_intent {
        (s, ResumeRule::SeekIntent, true)
    } else if let Some(s) = ctx.cached_seek_intent {
        (s, ResumeRule::CachedSeekIntent, true)
    } else if let Some(s) = ctx.session_position {
        (s, ResumeRule::SessionPosition, true)
    } else if let Some(s) = ctx.cached_position {
        (s, ResumeRule::CachedPosition, true)
    } else {
        (0.0, ResumeRule::Default, false)
    };

    let candidate = candidate.max(0.0);

    // Restart-from-beginning override. Zero/NaN duration short-circuits to
    // "no restart".
    if duration_known
        && candidate > 0.0
        && (ctx.duration - candidate < cfg.restart_tail_secs
            || candidate / ctx.duration > cfg.restart_fraction)
    {
        return ResumeDecision {
            start_seconds: 0.0,
            rule: ResumeRule::RestartNearEnd,
            clear_cache: true,
        };
    }

    let start_seconds = if sticky && candidate > cfg.near_start_secs {
        (candidate - cfg.cushion_secs).max(0.0)
    } else {
        candidate
    };

    ResumeDecision {
        start_seconds,
        rule,
        clear_cache: false,
    }
}
