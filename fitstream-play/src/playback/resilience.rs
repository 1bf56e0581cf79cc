//! Stall detection and recovery escalation
//!
//! An explicit state machine with a single transition function
//! `(state, event) -> effects`, driven by the engine's polling ticks and
//! forwarded progress/pause/end inputs. All timing arrives as explicit
//! timestamps, so tests feed synthetic event sequences against a virtual
//! clock instead of real timers.
//!
//! States: `Healthy -> SoftStalled -> HardStalled -> Recovering ->
//! Healthy`, or `Ended` (absorbing). A stall is the absence of forward
//! progress while not explicitly paused; recovery escalates through an
//! ordered strategy list and stops when the list exhausts, surfacing a
//! terminal-for-now hard stall.

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use fitstream_common::events::StrategyKind;

/// Published resilience status, part of the host-visible playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResilienceStatus {
    Healthy,
    SoftStalled,
    HardStalled,
    Recovering,
    Ended,
}

impl std::fmt::Display for ResilienceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResilienceStatus::Healthy => write!(f, "healthy"),
            ResilienceStatus::SoftStalled => write!(f, "soft-stalled"),
            ResilienceStatus::HardStalled => write!(f, "hard-stalled"),
            ResilienceStatus::Recovering => write!(f, "recovering"),
            ResilienceStatus::Ended => write!(f, "ended"),
        }
    }
}

/// Inputs to the transition function
#[derive(Debug, Clone, Copy)]
pub enum SmEvent {
    /// The progress token advanced
    Progress { now: Instant },
    /// Polling tick; evaluates stall windows and grace deadlines
    Tick { now: Instant },
    /// Caller-declared pause (suspends stall timers)
    PauseDeclared,
    /// Caller-declared resume (re-arms stall timers)
    ResumeDeclared { now: Instant },
    /// End event or playhead within the end epsilon of duration
    EndReached,
}

/// What the driver must do in response to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SoftStall {
        silent: Duration,
    },
    HardStall {
        silent: Duration,
    },
    /// Execute a recovery strategy now
    Run {
        strategy: StrategyKind,
        attempt_index: u32,
    },
    /// The running strategy brought progress back
    Succeeded {
        strategy: StrategyKind,
        attempt_index: u32,
    },
    /// Grace expired without progress
    Failed {
        strategy: StrategyKind,
        attempt_index: u32,
    },
    /// Every strategy failed; stall is terminal-for-now
    Exhausted {
        attempts: u32,
    },
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Healthy,
    SoftStalled,
    /// Reached only after the strategy list exhausts; the pre-recovery
    /// hard stall transitions straight into Recovering
    HardStalled,
    Recovering {
        strategy: StrategyKind,
        attempt_index: u32,
        grace_until: Instant,
    },
    Ended,
}

/// Stall detector and recovery escalator for one element attachment
pub struct ResilienceMachine {
    soft: Duration,
    hard: Duration,
    grace: Duration,
    strategies: Vec<StrategyKind>,
    phase: Phase,
    last_progress_at: Instant,
    paused: bool,
    /// Index of the next strategy to run; doubles as attempts-used count
    next_strategy: usize,
}

impl ResilienceMachine {
    pub fn new(
        soft: Duration,
        hard: Duration,
        grace: Duration,
        strategies: Vec<StrategyKind>,
        now: Instant,
    ) -> Self {
        Self {
            soft,
            hard,
            grace,
            strategies,
            phase: Phase::Healthy,
            last_progress_at: now,
            paused: false,
            next_strategy: 0,
        }
    }

    pub fn status(&self) -> ResilienceStatus {
        match self.phase {
            Phase::Healthy => ResilienceStatus::Healthy,
            Phase::SoftStalled => ResilienceStatus::SoftStalled,
            Phase::HardStalled => ResilienceStatus::HardStalled,
            Phase::Recovering { .. } => ResilienceStatus::Recovering,
            Phase::Ended => ResilienceStatus::Ended,
        }
    }

    /// Attempts consumed in the current stall episode
    pub fn attempts_used(&self) -> u32 {
        self.next_strategy as u32
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, Phase::Ended)
    }

    /// The single transition function
    pub fn handle(&mut self, event: SmEvent) -> Vec<Effect> {
        match event {
            SmEvent::Progress { now } => self.on_progress(now),
            SmEvent::Tick { now } => self.on_tick(now),
            SmEvent::PauseDeclared => {
                self.paused = true;
                if !matches!(self.phase, Phase::Ended) {
                    // A stall is only a stall while not explicitly paused;
                    // the episode is abandoned, not suspended.
                    self.phase = Phase::Healthy;
                    self.next_strategy = 0;
                }
                Vec::new()
            }
            SmEvent::ResumeDeclared { now } => {
                self.paused = false;
                self.last_progress_at = now;
                Vec::new()
            }
            SmEvent::EndReached => {
                if matches!(self.phase, Phase::Ended) {
                    Vec::new()
                } else {
                    self.phase = Phase::Ended;
                    vec![Effect::Ended]
                }
            }
        }
    }

    fn on_progress(&mut self, now: Instant) -> Vec<Effect> {
        self.last_progress_at = now;
        match self.phase {
            Phase::Ended | Phase::Healthy => Vec::new(),
            Phase::Recovering {
                strategy,
                attempt_index,
                ..
            } => {
                self.phase = Phase::Healthy;
                self.next_strategy = 0;
                vec![Effect::Succeeded {
                    strategy,
                    attempt_index,
                }]
            }
            Phase::SoftStalled | Phase::HardStalled => {
                self.phase = Phase::Healthy;
                self.next_strategy = 0;
                Vec::new()
            }
        }
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.paused || matches!(self.phase, Phase::Ended) {
            return Vec::new();
        }

        let silent = now.duration_since(self.last_progress_at);
        let mut effects = Vec::new();

        if matches!(self.phase, Phase::Healthy) && silent >= self.soft {
            self.phase = Phase::SoftStalled;
            effects.push(Effect::SoftStall { silent });
        }

        if matches!(self.phase, Phase::SoftStalled) && silent >= self.hard {
            effects.push(Effect::HardStall { silent });
            effects.push(self.start_next_strategy(now));
        }

        if let Phase::Recovering {
            strategy,
            attempt_index,
            grace_until,
        } = self.phase
        {
            if now >= grace_until {
                effects.push(Effect::Failed {
                    strategy,
                    attempt_index,
                });
                effects.push(self.start_next_strategy(now));
            }
        }

        effects
    }

    fn start_next_strategy(&mut self, now: Instant) -> Effect {
        match self.strategies.get(self.next_strategy) {
            Some(&strategy) => {
                let attempt_index = self.next_strategy as u32;
                self.next_strategy += 1;
                self.phase = Phase::Recovering {
                    strategy,
                    attempt_index,
                    grace_until: now + self.grace,
                };
                Effect::Run {
                    strategy,
                    attempt_index,
                }
            }
            None => {
                self.phase = Phase::HardStalled;
                Effect::Exhausted {
                    attempts: self.next_strategy as u32,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOFT: Duration = Duration::from_millis(2_000);
    const HARD: Duration = Duration::from_millis(6_000);
    const GRACE: Duration = Duration::from_millis(2_500);

    fn machine(strategies: Vec<StrategyKind>) -> (ResilienceMachine, Instant) {
        let t0 = Instant::now();
        (
            ResilienceMachine::new(SOFT, HARD, GRACE, strategies, t0),
            t0,
        )
    }

    fn default_machine() -> (ResilienceMachine, Instant) {
        machine(vec![
            StrategyKind::Nudge,
            StrategyKind::SeekBack,
            StrategyKind::Reload,
        ])
    }

    #[test]
    fn test_healthy_until_soft_window() {
        let (mut sm, t0) = default_machine();

        assert!(sm.handle(SmEvent::Tick { now: t0 + SOFT / 2 }).is_empty());
        assert_eq!(sm.status(), ResilienceStatus::Healthy);

        let effects = sm.handle(SmEvent::Tick { now: t0 + SOFT });
        assert_eq!(effects, vec![Effect::SoftStall { silent: SOFT }]);
        assert_eq!(sm.status(), ResilienceStatus::SoftStalled);
    }

    #[test]
    fn test_soft_escalates_to_hard_and_runs_first_strategy() {
        let (mut sm, t0) = default_machine();
        sm.handle(SmEvent::Tick { now: t0 + SOFT });

        let effects = sm.handle(SmEvent::Tick { now: t0 + HARD });
        assert_eq!(
            effects,
            vec![
                Effect::HardStall { silent: HARD },
                Effect::Run {
                    strategy: StrategyKind::Nudge,
                    attempt_index: 0
                },
            ]
        );
        assert_eq!(sm.status(), ResilienceStatus::Recovering);
        assert_eq!(sm.attempts_used(), 1);
    }

    #[test]
    fn test_late_tick_escalates_straight_through() {
        let (mut sm, t0) = default_machine();

        // A single tick arriving after the hard window runs soft and hard
        // in one evaluation; no intermediate tick is required.
        let effects = sm.handle(SmEvent::Tick {
            now: t0 + HARD + Duration::from_millis(100),
        });
        assert!(matches!(effects[0], Effect::SoftStall { .. }));
        assert!(matches!(effects[1], Effect::HardStall { .. }));
        assert!(matches!(
            effects[2],
            Effect::Run {
                strategy: StrategyKind::Nudge,
                attempt_index: 0
            }
        ));
    }

    #[test]
    fn test_progress_during_recovery_succeeds_and_resets_attempts() {
        let (mut sm, t0) = default_machine();
        sm.handle(SmEvent::Tick { now: t0 + SOFT });
        sm.handle(SmEvent::Tick { now: t0 + HARD });

        let effects = sm.handle(SmEvent::Progress {
            now: t0 + HARD + Duration::from_millis(500),
        });
        assert_eq!(
            effects,
            vec![Effect::Succeeded {
                strategy: StrategyKind::Nudge,
                attempt_index: 0
            }]
        );
        assert_eq!(sm.status(), ResilienceStatus::Healthy);
        assert_eq!(sm.attempts_used(), 0);
    }

    #[test]
    fn test_attempt_index_strictly_increases_until_exhaustion() {
        let (mut sm, t0) = machine(vec![StrategyKind::Nudge, StrategyKind::Reload]);
        sm.handle(SmEvent::Tick { now: t0 + SOFT });
        let effects = sm.handle(SmEvent::Tick { now: t0 + HARD });
        assert!(effects.contains(&Effect::Run {
            strategy: StrategyKind::Nudge,
            attempt_index: 0
        }));

        // Grace expires silently: nudge failed, reload runs
        let t_fail1 = t0 + HARD + GRACE;
        let effects = sm.handle(SmEvent::Tick { now: t_fail1 });
        assert_eq!(
            effects,
            vec![
                Effect::Failed {
                    strategy: StrategyKind::Nudge,
                    attempt_index: 0
                },
                Effect::Run {
                    strategy: StrategyKind::Reload,
                    attempt_index: 1
                },
            ]
        );

        // Second grace expires: list exhausted, terminal-for-now
        let t_fail2 = t_fail1 + GRACE;
        let effects = sm.handle(SmEvent::Tick { now: t_fail2 });
        assert_eq!(
            effects,
            vec![
                Effect::Failed {
                    strategy: StrategyKind::Reload,
                    attempt_index: 1
                },
                Effect::Exhausted { attempts: 2 },
            ]
        );
        assert_eq!(sm.status(), ResilienceStatus::HardStalled);

        // No further effects once exhausted; the counter stops
        let effects = sm.handle(SmEvent::Tick {
            now: t_fail2 + Duration::from_secs(60),
        });
        assert!(effects.is_empty());
        assert_eq!(sm.attempts_used(), 2);
    }

    #[test]
    fn test_progress_after_exhaustion_still_heals() {
        let (mut sm, t0) = machine(vec![StrategyKind::Nudge]);
        sm.handle(SmEvent::Tick { now: t0 + SOFT });
        sm.handle(SmEvent::Tick { now: t0 + HARD });
        sm.handle(SmEvent::Tick { now: t0 + HARD + GRACE });
        assert_eq!(sm.status(), ResilienceStatus::HardStalled);

        sm.handle(SmEvent::Progress {
            now: t0 + HARD + GRACE + Duration::from_secs(1),
        });
        assert_eq!(sm.status(), ResilienceStatus::Healthy);
        assert_eq!(sm.attempts_used(), 0);
    }

    #[test]
    fn test_pause_suspends_and_resume_rearms() {
        let (mut sm, t0) = default_machine();
        sm.handle(SmEvent::PauseDeclared);

        // Silence while paused never stalls
        let effects = sm.handle(SmEvent::Tick {
            now: t0 + Duration::from_secs(120),
        });
        assert!(effects.is_empty());
        assert_eq!(sm.status(), ResilienceStatus::Healthy);

        // Resume re-arms the window from the resume instant
        let t_resume = t0 + Duration::from_secs(120);
        sm.handle(SmEvent::ResumeDeclared { now: t_resume });
        assert!(sm.handle(SmEvent::Tick { now: t_resume + SOFT / 2 }).is_empty());
        let effects = sm.handle(SmEvent::Tick { now: t_resume + SOFT });
        assert_eq!(effects, vec![Effect::SoftStall { silent: SOFT }]);
    }

    #[test]
    fn test_pause_abandons_active_episode() {
        let (mut sm, t0) = default_machine();
        sm.handle(SmEvent::Tick { now: t0 + SOFT });
        sm.handle(SmEvent::Tick { now: t0 + HARD });
        assert_eq!(sm.attempts_used(), 1);

        sm.handle(SmEvent::PauseDeclared);
        assert_eq!(sm.status(), ResilienceStatus::Healthy);
        assert_eq!(sm.attempts_used(), 0);
    }

    #[test]
    fn test_ended_is_absorbing() {
        let (mut sm, t0) = default_machine();
        let effects = sm.handle(SmEvent::EndReached);
        assert_eq!(effects, vec![Effect::Ended]);
        assert_eq!(sm.status(), ResilienceStatus::Ended);

        // A stray waiting-induced silent window after the end must not
        // re-enter stall states
        let effects = sm.handle(SmEvent::Tick {
            now: t0 + Duration::from_secs(600),
        });
        assert!(effects.is_empty());
        assert_eq!(sm.status(), ResilienceStatus::Ended);

        // And the latch fires its effect only once
        assert!(sm.handle(SmEvent::EndReached).is_empty());
    }

    #[test]
    fn test_soft_stall_clears_quietly_on_progress() {
        let (mut sm, t0) = default_machine();
        sm.handle(SmEvent::Tick { now: t0 + SOFT });
        assert_eq!(sm.status(), ResilienceStatus::SoftStalled);

        let effects = sm.handle(SmEvent::Progress {
            now: t0 + SOFT + Duration::from_millis(300),
        });
        assert!(effects.is_empty());
        assert_eq!(sm.status(), ResilienceStatus::Healthy);
    }
}
