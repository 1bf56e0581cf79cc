//! Engine tuning configuration
//!
//! Every tunable the engine consults lives here with a conservative
//! default. Hosts typically run with `EngineConfig::default()`; stations
//! with unusual network characteristics load overrides from a TOML
//! fragment of their settings file.

use serde::Deserialize;
use tokio::time::Duration;

use fitstream_common::events::StrategyKind;

use crate::error::{Error, Result};

/// Stall detection, recovery, resume, sampling, and ABR tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Frame-metric and health sampling interval, milliseconds (350-500 sensible)
    pub sample_interval_ms: u64,

    /// Clock-progress tolerance, seconds. The comparison epsilon is derived
    /// as `max(0.01, min(0.05, tolerance / 2))`.
    pub progress_tolerance_secs: f64,

    /// Silence before entering soft stall, milliseconds
    pub soft_stall_ms: u64,

    /// Silence before entering hard stall, milliseconds (must exceed soft)
    pub hard_stall_ms: u64,

    /// Grace period after a recovery strategy before escalating, milliseconds
    pub recovery_grace_ms: u64,

    /// Ordered recovery strategies, least invasive first
    pub strategies: Vec<StrategyKind>,

    /// How far the SeekBack strategy jumps, seconds
    pub seekback_secs: f64,

    /// Rewind applied to the prior position when the Reload strategy
    /// reattaches, seconds
    pub seek_back_on_reload_secs: f64,

    /// Playhead within this many seconds of duration counts as ended
    pub end_epsilon_secs: f64,

    /// Interval between PlaybackProgress telemetry events, milliseconds
    pub progress_event_interval_ms: u64,

    /// EventBus channel capacity when the engine creates its own bus
    pub event_capacity: usize,

    pub resume: ResumeConfig,
    pub abr: AbrConfig,
}

/// Start-position cascade tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResumeConfig {
    /// Clips at or under this duration ignore the declared start unless the
    /// element is video, seconds
    pub long_clip_secs: f64,

    /// Candidate within this many seconds of the end forces a restart
    pub restart_tail_secs: f64,

    /// Candidate past this fraction of duration forces a restart
    pub restart_fraction: f64,

    /// Candidates at or under this are "near start" and get no cushion
    pub near_start_secs: f64,

    /// Staleness cushion subtracted from sticky candidates, seconds
    pub cushion_secs: f64,
}

/// Adaptive bitrate (multiplicative-decrease/ramp-up) tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AbrConfig {
    /// Rolling window length, in samples, for the dropped-frame fraction
    pub window: usize,

    /// Rolling fraction above this triggers a downscale
    pub allowance: f64,

    /// Rolling fraction at or below this counts as healthy decode
    pub low_threshold: f64,

    /// Minimum interval between adaptations, milliseconds
    pub min_interval_ms: u64,

    /// Healthy-decode duration required before a ramp-up, milliseconds
    pub rampup_stable_ms: u64,

    /// Cap-at-ceiling duration before removing the cap entirely,
    /// milliseconds. None disables reset-to-unlimited.
    pub reset_stable_ms: Option<u64>,

    /// Cap seeded when degradation hits with no cap in place, kbps
    pub initial_cap_kbps: u32,

    /// Caps never go below this, kbps
    pub floor_kbps: u32,

    /// Caps never go above this, kbps. None means uncapped ramp-up.
    pub ceiling_kbps: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 450,
            progress_tolerance_secs: 0.1,
            soft_stall_ms: 2_000,
            hard_stall_ms: 6_000,
            recovery_grace_ms: 2_500,
            strategies: vec![
                StrategyKind::Nudge,
                StrategyKind::SeekBack,
                StrategyKind::Reload,
            ],
            seekback_secs: 5.0,
            seek_back_on_reload_secs: 2.0,
            end_epsilon_secs: 0.5,
            progress_event_interval_ms: 5_000,
            event_capacity: 100,
            resume: ResumeConfig::default(),
            abr: AbrConfig::default(),
        }
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            long_clip_secs: 720.0,
            restart_tail_secs: 30.0,
            restart_fraction: 0.95,
            near_start_secs: 1.0,
            cushion_secs: 1.0,
        }
    }
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            window: 10,
            allowance: 0.5,
            low_threshold: 0.05,
            min_interval_ms: 10_000,
            rampup_stable_ms: 30_000,
            reset_stable_ms: Some(60_000),
            initial_cap_kbps: 3_000,
            floor_kbps: 400,
            ceiling_kbps: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML fragment, validating the result
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the state machine cannot run on
    pub fn validate(&self) -> Result<()> {
        if self.hard_stall_ms <= self.soft_stall_ms {
            return Err(Error::Config(format!(
                "hard_stall_ms ({}) must exceed soft_stall_ms ({})",
                self.hard_stall_ms, self.soft_stall_ms
            )));
        }
        if self.sample_interval_ms == 0 {
            return Err(Error::Config("sample_interval_ms must be non-zero".into()));
        }
        if self.strategies.is_empty() {
            return Err(Error::Config("strategies must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.abr.allowance)
            || !(0.0..=1.0).contains(&self.abr.low_threshold)
        {
            return Err(Error::Config(
                "abr allowance and low_threshold must be fractions in [0, 1]".into(),
            ));
        }
        if self.abr.window == 0 {
            return Err(Error::Config("abr window must be non-zero".into()));
        }
        if self.abr.floor_kbps == 0 {
            return Err(Error::Config("abr floor_kbps must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.resume.restart_fraction) {
            return Err(Error::Config(
                "resume restart_fraction must be a fraction in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn soft_stall(&self) -> Duration {
        Duration::from_millis(self.soft_stall_ms)
    }

    pub fn hard_stall(&self) -> Duration {
        Duration::from_millis(self.hard_stall_ms)
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_millis(self.recovery_grace_ms)
    }

    pub fn progress_event_interval(&self) -> Duration {
        Duration::from_millis(self.progress_event_interval_ms)
    }

    /// Clock-progress comparison epsilon, seconds.
    ///
    /// Too tight flags decode jitter as progress; too loose misses real
    /// short stalls.
    pub fn progress_epsilon(&self) -> f64 {
        (self.progress_tolerance_secs / 2.0).clamp(0.01, 0.05)
    }
}
