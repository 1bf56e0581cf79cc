//! Adaptive bitrate cap controller
//!
//! Multiplicative-decrease/ramp-up control over a bitrate ceiling: halve
//! the cap when the rolling dropped-frame fraction exceeds the allowance,
//! double it after sustained healthy decode, optionally remove it after a
//! long stretch pinned at the ceiling. Every transition is gated by a
//! minimum inter-adaptation interval to prevent oscillation.
//!
//! The controller never touches decoder internals; its only output is an
//! [`AbrDecision`] the engine forwards to the host's cap callback. It
//! runs only when the element exposes frame-drop telemetry and a
//! callback is installed.

use std::collections::VecDeque;

use tokio::time::{Duration, Instant};
use tracing::debug;

use fitstream_common::events::AbrReason;

use crate::config::AbrConfig;

/// One cap change, forwarded to the host callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbrDecision {
    /// New ceiling, or None for unlimited
    pub cap_kbps: Option<u32>,
    pub reason: AbrReason,
}

/// Current cap bookkeeping, exposed for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct CapState {
    pub current_kbps: Option<u32>,
    pub last_adapted_at: Option<Instant>,
    /// Start of the current healthy-decode streak
    pub stable_since: Option<Instant>,
}

pub struct BitrateController {
    cfg: AbrConfig,
    min_interval: Duration,
    rampup_stable: Duration,
    reset_stable: Option<Duration>,
    samples: VecDeque<f64>,
    cap_kbps: Option<u32>,
    last_adapted_at: Option<Instant>,
    healthy_since: Option<Instant>,
}

impl BitrateController {
    pub fn new(cfg: AbrConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(cfg.min_interval_ms),
            rampup_stable: Duration::from_millis(cfg.rampup_stable_ms),
            reset_stable: cfg.reset_stable_ms.map(Duration::from_millis),
            samples: VecDeque::with_capacity(cfg.window),
            cap_kbps: None,
            last_adapted_at: None,
            healthy_since: None,
            cfg,
        }
    }

    pub fn cap_state(&self) -> CapState {
        CapState {
            current_kbps: self.cap_kbps,
            last_adapted_at: self.last_adapted_at,
            stable_since: self.healthy_since,
        }
    }

    /// Feed one polling interval's dropped-frame fraction. Returns a
    /// decision when the cap changes.
    pub fn push_sample(&mut self, fraction: f64, now: Instant) -> Option<AbrDecision> {
        self.samples.push_back(fraction.clamp(0.0, 1.0));
        while self.samples.len() > self.cfg.window {
            self.samples.pop_front();
        }
        let rolling = self.samples.iter().sum::<f64>() / self.samples.len() as f64;

        // Streak tracking runs regardless of the adaptation gate so a
        // stability window can span the gap between adaptations.
        if rolling <= self.cfg.low_threshold {
            self.healthy_since.get_or_insert(now);
        } else {
            self.healthy_since = None;
        }

        if let Some(t) = self.last_adapted_at {
            if now.duration_since(t) < self.min_interval {
                return None;
            }
        }

        if rolling > self.cfg.allowance {
            return self.downscale(rolling, now);
        }

        if rolling <= self.cfg.low_threshold {
            return self.try_recover(now);
        }

        None
    }

    fn downscale(&mut self, rolling: f64, now: Instant) -> Option<AbrDecision> {
        let new_cap = match self.cap_kbps {
            None => self.cfg.initial_cap_kbps,
            Some(cap) => (cap / 2).max(self.cfg.floor_kbps),
        };
        if Some(new_cap) == self.cap_kbps {
            // Pinned at the floor; nothing left to shed
            return None;
        }
        debug!(
            "ABR downscale: rolling drop fraction {:.2} over allowance, cap {:?} -> {} kbps",
            rolling, self.cap_kbps, new_cap
        );
        self.adopt(Some(new_cap), now);
        Some(AbrDecision {
            cap_kbps: Some(new_cap),
            reason: AbrReason::Downscale,
        })
    }

    fn try_recover(&mut self, now: Instant) -> Option<AbrDecision> {
        let cap = self.cap_kbps?;
        let streak = now.duration_since(self.healthy_since?);

        // Remove the cap entirely after a long stretch pinned at the ceiling
        if let (Some(reset_stable), Some(ceiling)) = (self.reset_stable, self.cfg.ceiling_kbps) {
            if cap >= ceiling && streak >= reset_stable {
                debug!("ABR reset: cap {} kbps held at ceiling, removing", cap);
                self.adopt(None, now);
                return Some(AbrDecision {
                    cap_kbps: None,
                    reason: AbrReason::ResetToUnlimited,
                });
            }
        }

        if streak >= self.rampup_stable {
            let mut new_cap = cap.saturating_mul(2);
            if let Some(ceiling) = self.cfg.ceiling_kbps {
                new_cap = new_cap.min(ceiling);
            }
            if new_cap != cap {
                debug!("ABR ramp-up: cap {} -> {} kbps", cap, new_cap);
                self.adopt(Some(new_cap), now);
                return Some(AbrDecision {
                    cap_kbps: Some(new_cap),
                    reason: AbrReason::RampUp,
                });
            }
        }

        None
    }

    fn adopt(&mut self, cap: Option<u32>, now: Instant) {
        self.cap_kbps = cap;
        self.last_adapted_at = Some(now);
        // Each adaptation restarts the stability clock
        self.healthy_since = None;
    }
}
