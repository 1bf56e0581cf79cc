//! Player engine - driver and transport façade
//!
//! **Responsibilities:**
//! - Owns the health sampler, progress ledger, resilience machine, and
//!   ABR controller for one element attachment
//! - Runs the sampling tick on the tokio runtime and serializes every
//!   transition through one internal lock (element events, polling
//!   ticks, and commands never race)
//! - Executes recovery strategies against the element
//! - Exposes the command surface the host UI drives: play, pause,
//!   toggle, seek, seek_relative, current_time, duration,
//!   playback_state, hard_reset
//!
//! Nothing on the command surface returns playback-health errors;
//! operations are best-effort and report outcomes through the published
//! state and the EventBus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fitstream_common::events::{AbrReason, PlaybackState, StallPhase, StationEvent, StrategyKind};
use fitstream_common::{EventBus, MediaId};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::media::{ElementProvider, MediaEvent};
use crate::resume::{decide_start, ResumeContext};
use crate::session::SessionStore;
use crate::state::{PlaybackSnapshot, SharedState};

use super::abr::BitrateController;
use super::health::{FrameHealth, HealthSampler, PlaybackSignals};
use super::progress::{ProgressLedger, ProgressSource};
use super::recovery::{plan, RecoveryAction, RecoveryContext};
use super::resilience::{Effect, ResilienceMachine, ResilienceStatus, SmEvent};

/// Host callback invoked when the ABR controller changes the bitrate cap
pub type BitrateCapFn = Arc<dyn Fn(Option<u32>, AbrReason) + Send + Sync>;

/// Everything the host supplies at mount
pub struct PlayerOptions {
    pub media_id: MediaId,
    /// Accessor for whatever element is currently mounted (or none)
    pub provider: Arc<dyn ElementProvider>,
    /// Start position the host declares for a first load, seconds
    pub declared_start: Option<f64>,
    /// Cross-remount resume store, usually `SessionStore::process_wide()`
    pub session: Arc<SessionStore>,
    /// Shared bus; the engine creates a private one when absent
    pub bus: Option<Arc<EventBus>>,
    /// Cap callback; ABR stays dormant without one
    pub cap_callback: Option<BitrateCapFn>,
    /// Initial "treat as stalled" override
    pub treat_as_stalled: bool,
    pub config: EngineConfig,
}

/// Options for a full detach/reattach
#[derive(Debug, Clone, Copy, Default)]
pub struct HardResetOptions {
    /// Position to resume at after the reattach, seconds
    pub seek_to_seconds: Option<f64>,
}

/// Engine internals snapshot for the host's debug overlay
#[derive(Debug, Clone)]
pub struct EngineDiagnostics {
    pub media_id: MediaId,
    pub mount_id: Uuid,
    pub resilience: ResilienceStatus,
    pub attempts_used: u32,
    pub progress_token: u64,
    pub signals: PlaybackSignals,
    pub frame: FrameHealth,
    pub runway_secs: f64,
    pub bitrate_cap_kbps: Option<u32>,
}

/// Mutable engine state, serialized behind one lock
struct Core {
    sampler: HealthSampler,
    ledger: ProgressLedger,
    machine: ResilienceMachine,
    abr: BitrateController,
    /// Caller-declared pause intent (element pauses during recovery are
    /// not user pauses)
    user_paused: bool,
    is_seeking: bool,
    stall_override: bool,
    /// Outstanding seek target; cleared when the element reports seeked
    pending_seek: Option<f64>,
    /// Most recent seek the user requested this session, honored or not
    fresh_seek_intent: Option<f64>,
    /// Last position observed after the start decision was applied
    last_observed_secs: Option<f64>,
    /// Raw playhead position from the latest observation
    last_position: f64,
    /// Duration from the latest trustworthy report
    last_duration: f64,
    declared_start: Option<f64>,
    forced_restart: bool,
    /// The start cascade ran for the current attachment; positions
    /// observed before it are not resume candidates
    start_applied_this_mount: bool,
    last_fed_token: u64,
    last_progress_emit: Option<Instant>,
    published_state: PlaybackState,
}

struct Inner {
    cfg: EngineConfig,
    media_id: MediaId,
    mount_id: Uuid,
    provider: Arc<dyn ElementProvider>,
    session: Arc<SessionStore>,
    state: Arc<SharedState>,
    cap_callback: Option<BitrateCapFn>,
    core: Mutex<Core>,
    shutdown: AtomicBool,
}

/// Playback resilience engine for one media identity
///
/// Cheap to clone; all clones drive the same attachment. Must be created
/// on a tokio runtime (the sampling task spawns at mount). Call
/// [`detach`](PlayerEngine::detach) when the host unmounts.
#[derive(Clone)]
pub struct PlayerEngine {
    inner: Arc<Inner>,
}

impl PlayerEngine {
    /// Attach to an element and start sampling
    pub fn mount(opts: PlayerOptions) -> Result<Self> {
        opts.config.validate()?;
        let cfg = opts.config;

        let bus = opts
            .bus
            .unwrap_or_else(|| Arc::new(EventBus::new(cfg.event_capacity)));
        let state = Arc::new(SharedState::new(bus));
        let now = Instant::now();

        let core = Core {
            sampler: HealthSampler::new(Arc::clone(&opts.provider)),
            ledger: ProgressLedger::new(cfg.progress_epsilon(), now),
            machine: new_machine(&cfg, now),
            abr: BitrateController::new(cfg.abr.clone()),
            user_paused: false,
            is_seeking: false,
            stall_override: opts.treat_as_stalled,
            pending_seek: None,
            fresh_seek_intent: None,
            last_observed_secs: None,
            last_position: 0.0,
            last_duration: f64::NAN,
            declared_start: opts.declared_start,
            forced_restart: false,
            start_applied_this_mount: false,
            last_fed_token: 0,
            last_progress_emit: None,
            published_state: PlaybackState::Playing,
        };

        let inner = Arc::new(Inner {
            cfg,
            media_id: opts.media_id,
            mount_id: Uuid::new_v4(),
            provider: opts.provider,
            session: opts.session,
            state,
            cap_callback: opts.cap_callback,
            core: Mutex::new(core),
            shutdown: AtomicBool::new(false),
        });

        info!(
            "Player engine mounted for {} (mount {})",
            inner.media_id, inner.mount_id
        );
        inner.state.emit(StationEvent::EngineMounted {
            media_id: inner.media_id.clone(),
            mount_id: inner.mount_id,
            timestamp: chrono::Utc::now(),
        });

        let engine = Self { inner };
        engine.spawn_sampler();
        Ok(engine)
    }

    fn spawn_sampler(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval(inner.cfg.sample_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(
                "Sampling task started ({}ms interval)",
                inner.cfg.sample_interval_ms
            );
            loop {
                ticker.tick().await;
                if inner.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                inner.tick().await;
            }
            debug!("Sampling task stopped for {}", inner.media_id);
        });
    }

    // ========================================
    // Transport façade
    // ========================================

    pub async fn play(&self) {
        let inner = &self.inner;
        let now = Instant::now();
        let mut core = inner.core.lock().await;
        core.user_paused = false;
        match inner.provider.element() {
            Some(el) => el.request_play(),
            None => debug!("play requested with no element mounted"),
        }
        let effects = core.machine.handle(SmEvent::ResumeDeclared { now });
        inner.apply_effects(&mut core, effects);
        inner.publish(&mut core).await;
    }

    pub async fn pause(&self) {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        core.user_paused = true;
        match inner.provider.element() {
            Some(el) => el.request_pause(),
            None => debug!("pause requested with no element mounted"),
        }
        let effects = core.machine.handle(SmEvent::PauseDeclared);
        inner.apply_effects(&mut core, effects);
        inner.publish(&mut core).await;
    }

    pub async fn toggle(&self) {
        let paused = self.inner.core.lock().await.user_paused;
        if paused {
            self.play().await;
        } else {
            self.pause().await;
        }
    }

    /// Seek to an absolute position, seconds
    ///
    /// Records seek intent before touching the element so a decoder that
    /// never honors the request still resumes at the intended position.
    /// A repeated seek to the same outstanding target is a no-op.
    pub async fn seek(&self, seconds: f64) {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        inner.seek_locked(&mut core, seconds);
        inner.publish(&mut core).await;
    }

    /// Seek relative to the pending target (so rapid relative seeks
    /// stack on intent, not on a stale clock)
    pub async fn seek_relative(&self, delta: f64) {
        let inner = &self.inner;
        let mut core = inner.core.lock().await;
        let base = core.pending_seek.unwrap_or(core.last_position);
        inner.seek_locked(&mut core, base + delta);
        inner.publish(&mut core).await;
    }

    pub async fn current_time(&self) -> f64 {
        if let Some(el) = self.inner.provider.element() {
            let t = el.current_time();
            if t.is_finite() {
                return t;
            }
        }
        self.inner.core.lock().await.last_position
    }

    pub async fn duration(&self) -> f64 {
        if let Some(el) = self.inner.provider.element() {
            let d = el.duration();
            if d.is_finite() && d > 0.0 {
                return d;
            }
        }
        let d = self.inner.core.lock().await.last_duration;
        if d.is_finite() {
            d
        } else {
            0.0
        }
    }

    /// The host-visible playback state, one read
    pub async fn playback_state(&self) -> PlaybackSnapshot {
        self.inner.state.snapshot().await
    }

    /// Full detach/reattach of the source
    ///
    /// Used by the reload recovery strategy and by the host's manual
    /// reload control. Starts a fresh stall episode; the resume cascade
    /// runs again at the next metadata-ready event.
    pub async fn hard_reset(&self, opts: HardResetOptions) {
        let inner = &self.inner;
        let now = Instant::now();
        let mut core = inner.core.lock().await;
        inner.hard_reset_locked(&mut core, opts.seek_to_seconds, now);
        inner.publish(&mut core).await;
    }

    /// Restart from zero, clearing every cached resume point for the
    /// identity
    pub async fn restart_from_beginning(&self) {
        let inner = &self.inner;
        let now = Instant::now();
        let mut core = inner.core.lock().await;
        core.forced_restart = true;
        inner.hard_reset_locked(&mut core, None, now);
        inner.publish(&mut core).await;
    }

    /// Host override: treat playback as stalled regardless of observed
    /// progress
    pub async fn set_stall_override(&self, active: bool) {
        let mut core = self.inner.core.lock().await;
        core.stall_override = active;
    }

    /// Forward one element lifecycle event from the host glue
    pub async fn handle_media_event(&self, event: MediaEvent) {
        let inner = &self.inner;
        let now = Instant::now();
        let mut core = inner.core.lock().await;
        core.sampler.apply_event(&event);

        match &event {
            MediaEvent::Playing => {
                if core.accepts_event_progress() {
                    core.ledger.record(ProgressSource::Event, None, now);
                }
            }
            MediaEvent::Paused => {}
            MediaEvent::Waiting => debug!("element waiting for data"),
            MediaEvent::Stalled => debug!("element network fetch stalled"),
            MediaEvent::TimeUpdate => {
                if let Some(el) = inner.provider.element() {
                    let pos = el.current_time();
                    if pos.is_finite() {
                        core.last_position = pos;
                        if !core.stall_override && !core.is_seeking {
                            core.ledger.observe_clock(pos, now);
                        }
                    }
                }
            }
            MediaEvent::Seeking => core.is_seeking = true,
            MediaEvent::Seeked => {
                core.is_seeking = false;
                core.pending_seek = None;
                if let Some(el) = inner.provider.element() {
                    let pos = el.current_time();
                    if pos.is_finite() {
                        core.last_position = pos;
                        if core.start_applied_this_mount {
                            core.last_observed_secs = Some(pos);
                            inner
                                .session
                                .update(&inner.media_id, |r| r.last_known_seconds = Some(pos));
                        }
                        if core.accepts_event_progress() {
                            core.ledger.record(ProgressSource::Event, Some(pos), now);
                        }
                    }
                }
            }
            MediaEvent::LoadedMetadata => inner.on_metadata(&mut core, now),
            MediaEvent::Ended => {
                let effects = core.machine.handle(SmEvent::EndReached);
                inner.apply_effects(&mut core, effects);
            }
            MediaEvent::Error { code, message } => {
                warn!(
                    "element error for {} (code {:?}): {}",
                    inner.media_id, code, message
                );
                inner.state.emit(StationEvent::ElementError {
                    media_id: inner.media_id.clone(),
                    code: *code,
                    message: message.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        inner.feed_progress_token(&mut core, now);
        inner.publish(&mut core).await;
    }

    /// Stop the sampling task and persist the final position
    pub async fn detach(&self) {
        let inner = &self.inner;
        inner.shutdown.store(true, Ordering::Relaxed);
        let core = inner.core.lock().await;
        if core.start_applied_this_mount {
            if let Some(pos) = core.last_observed_secs {
                inner
                    .session
                    .update(&inner.media_id, |r| r.last_known_seconds = Some(pos));
            }
        }
        info!("Player engine detached for {}", inner.media_id);
    }

    pub async fn diagnostics(&self) -> EngineDiagnostics {
        let core = self.inner.core.lock().await;
        EngineDiagnostics {
            media_id: self.inner.media_id.clone(),
            mount_id: self.inner.mount_id,
            resilience: core.machine.status(),
            attempts_used: core.machine.attempts_used(),
            progress_token: core.ledger.token(),
            signals: core.sampler.signals(),
            frame: core.sampler.frame_health(),
            runway_secs: core.sampler.runway_secs(),
            bitrate_cap_kbps: core.abr.cap_state().current_kbps,
        }
    }

    /// Telemetry bus this engine publishes on
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(self.inner.state.bus())
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.inner.state)
    }

    pub fn media_id(&self) -> &MediaId {
        &self.inner.media_id
    }
}

impl Core {
    /// Event-channel progress is rejected while a recovery strategy is in
    /// flight: the engine's own pause/seek/play churn must not mark the
    /// attempt successful. Clock and frame advance remain authoritative.
    fn accepts_event_progress(&self) -> bool {
        !self.stall_override && self.machine.status() != ResilienceStatus::Recovering
    }
}

impl Inner {
    /// One sampling tick: observe, feed progress, evaluate stall windows,
    /// drive ABR, publish.
    async fn tick(&self) {
        let now = Instant::now();
        let mut core = self.core.lock().await;

        let Some(sample) = core.sampler.sample(now) else {
            // Element gone mid-remount: baseline already reset by the sampler
            self.publish(&mut core).await;
            return;
        };

        if sample.position.is_finite() {
            core.last_position = sample.position;
        }
        if sample.duration.is_finite() && sample.duration > 0.0 {
            core.last_duration = sample.duration;
        }

        if core.start_applied_this_mount && !core.is_seeking && sample.position.is_finite() {
            core.last_observed_secs = Some(sample.position);
            self.session.update(&self.media_id, |r| {
                r.last_known_seconds = Some(sample.position)
            });
        }

        if !core.stall_override {
            if !core.is_seeking && sample.position.is_finite() {
                core.ledger.observe_clock(sample.position, now);
            }
            if sample.frame_advanced {
                core.ledger.record(ProgressSource::Frame, None, now);
            }
        }
        self.feed_progress_token(&mut core, now);

        // End proximity counts as reaching the end even without the event
        let duration_known = sample.duration.is_finite() && sample.duration > 0.0;
        if sample.signals.ended
            || (duration_known && sample.duration - sample.position <= self.cfg.end_epsilon_secs)
        {
            let effects = core.machine.handle(SmEvent::EndReached);
            self.apply_effects(&mut core, effects);
        }

        let effects = core.machine.handle(SmEvent::Tick { now });
        self.apply_effects(&mut core, effects);

        // ABR runs only with frame telemetry and an installed cap callback
        if let (Some(callback), Some(fraction)) = (&self.cap_callback, sample.dropped_fraction) {
            if let Some(decision) = core.abr.push_sample(fraction, now) {
                callback(decision.cap_kbps, decision.reason);
                self.state.emit(StationEvent::BitrateAdaptation {
                    media_id: self.media_id.clone(),
                    cap_kbps: decision.cap_kbps,
                    reason: decision.reason,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        self.maybe_emit_progress(&mut core, now);
        self.publish(&mut core).await;
    }

    fn feed_progress_token(&self, core: &mut Core, now: Instant) {
        let token = core.ledger.token();
        if token != core.last_fed_token {
            core.last_fed_token = token;
            let effects = core.machine.handle(SmEvent::Progress { now });
            self.apply_effects(core, effects);
        }
    }

    fn apply_effects(&self, core: &mut Core, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SoftStall { silent } => {
                    warn!(
                        "Soft stall on {}: no forward progress for {}ms",
                        self.media_id,
                        silent.as_millis()
                    );
                    self.state.emit(StationEvent::StallDetected {
                        media_id: self.media_id.clone(),
                        phase: StallPhase::Soft,
                        silent_ms: silent.as_millis() as u64,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Effect::HardStall { silent } => {
                    warn!(
                        "Hard stall on {}: no forward progress for {}ms, escalating",
                        self.media_id,
                        silent.as_millis()
                    );
                    self.state.emit(StationEvent::StallDetected {
                        media_id: self.media_id.clone(),
                        phase: StallPhase::Hard,
                        silent_ms: silent.as_millis() as u64,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Effect::Run {
                    strategy,
                    attempt_index,
                } => {
                    info!(
                        "Recovery attempt {} on {}: {}",
                        attempt_index, self.media_id, strategy
                    );
                    self.state.emit(StationEvent::RecoveryAttempted {
                        media_id: self.media_id.clone(),
                        strategy,
                        attempt_index,
                        timestamp: chrono::Utc::now(),
                    });
                    self.run_strategy(core, strategy);
                }
                Effect::Succeeded {
                    strategy,
                    attempt_index,
                } => {
                    info!(
                        "Recovery succeeded on {}: {} (attempt {})",
                        self.media_id, strategy, attempt_index
                    );
                    self.state.emit(StationEvent::RecoveryOutcome {
                        media_id: self.media_id.clone(),
                        strategy,
                        attempt_index,
                        recovered: true,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Effect::Failed {
                    strategy,
                    attempt_index,
                } => {
                    warn!(
                        "Recovery attempt {} ({}) on {} brought no progress",
                        attempt_index, strategy, self.media_id
                    );
                    self.state.emit(StationEvent::RecoveryOutcome {
                        media_id: self.media_id.clone(),
                        strategy,
                        attempt_index,
                        recovered: false,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Effect::Exhausted { attempts } => {
                    warn!(
                        "Recovery exhausted on {} after {} attempts; surfacing hard stall",
                        self.media_id, attempts
                    );
                    self.state.emit(StationEvent::RecoveryExhausted {
                        media_id: self.media_id.clone(),
                        attempts,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Effect::Ended => {
                    info!("Playback ended for {}", self.media_id);
                }
            }
        }
    }

    fn run_strategy(&self, core: &mut Core, strategy: StrategyKind) {
        let Some(el) = self.provider.element() else {
            warn!("Recovery strategy {strategy} skipped: no element mounted");
            return;
        };

        let seek_intent = core
            .fresh_seek_intent
            .or(self.session.get(&self.media_id).last_seek_intent_seconds);
        let ctx = RecoveryContext {
            position: el.current_time(),
            seek_intent,
        };

        match plan(strategy, &self.cfg, &ctx) {
            RecoveryAction::Nudge { target_secs } => {
                el.request_pause();
                el.set_current_time(target_secs);
                core.ledger.rebaseline(target_secs);
                if !core.user_paused {
                    el.request_play();
                }
            }
            RecoveryAction::SeekBack { target_secs } => {
                el.set_current_time(target_secs);
                core.ledger.rebaseline(target_secs);
                if !core.user_paused {
                    el.request_play();
                }
            }
            RecoveryAction::Reload { resume_hint_secs } => {
                core.fresh_seek_intent = Some(resume_hint_secs);
                core.pending_seek = None;
                core.is_seeking = false;
                core.start_applied_this_mount = false;
                core.sampler.reset();
                el.reload();
            }
        }
    }

    /// Start-position decision, run on every metadata-ready event
    fn on_metadata(&self, core: &mut Core, now: Instant) {
        let Some(el) = self.provider.element() else {
            return;
        };

        let duration = el.duration();
        if duration.is_finite() && duration > 0.0 {
            core.last_duration = duration;
        }

        let record = self.session.get(&self.media_id);
        let ctx = ResumeContext {
            duration,
            is_video: el.is_video(),
            declared_start: core.declared_start,
            fresh_seek_intent: core.fresh_seek_intent,
            cached_seek_intent: record.last_seek_intent_seconds,
            session_position: core.last_observed_secs,
            cached_position: record.last_known_seconds,
            start_applied: record.start_applied,
            forced_restart: core.forced_restart,
        };
        let decision = decide_start(&self.cfg.resume, &ctx);
        core.forced_restart = false;

        if decision.clear_cache {
            self.session.clear(&self.media_id);
            core.fresh_seek_intent = None;
            core.last_observed_secs = None;
        }
        self.session
            .update(&self.media_id, |r| r.start_applied = true);
        core.start_applied_this_mount = true;

        if decision.start_seconds > 0.0 {
            el.set_current_time(decision.start_seconds);
        }
        core.ledger.rebaseline(decision.start_seconds);
        if !core.user_paused {
            el.request_play();
        }

        // Metadata proves the pipeline is alive again; re-arm the stall
        // window. During a reload recovery only real clock/frame advance
        // may mark the attempt successful.
        if core.accepts_event_progress() {
            core.ledger
                .record(ProgressSource::Event, Some(decision.start_seconds), now);
        }

        info!(
            "Resume decision for {}: start at {:.1}s ({:?})",
            self.media_id, decision.start_seconds, decision.rule
        );
        self.state.emit(StationEvent::ResumeDecision {
            media_id: self.media_id.clone(),
            start_seconds: decision.start_seconds,
            rule: decision.rule,
            timestamp: chrono::Utc::now(),
        });
    }

    fn seek_locked(&self, core: &mut Core, seconds: f64) {
        let mut target = seconds.max(0.0);
        if core.last_duration.is_finite() && core.last_duration > 0.0 {
            target = target.min(core.last_duration);
        }
        if core.pending_seek.is_some_and(|p| (p - target).abs() < 1e-3) {
            debug!("Duplicate seek to {target:.3}s ignored");
            return;
        }

        // Intent is recorded before the element is touched: a decoder that
        // never honors the request must still resume here.
        core.pending_seek = Some(target);
        core.fresh_seek_intent = Some(target);
        core.is_seeking = true;
        self.session
            .update(&self.media_id, |r| r.last_seek_intent_seconds = Some(target));

        match self.provider.element() {
            Some(el) => {
                el.set_current_time(target);
                core.ledger.rebaseline(target);
            }
            None => debug!("Seek to {target:.3}s recorded with no element mounted"),
        }
    }

    fn hard_reset_locked(&self, core: &mut Core, seek_to: Option<f64>, now: Instant) {
        if let Some(t) = seek_to {
            core.fresh_seek_intent = Some(t.max(0.0));
        }
        core.pending_seek = None;
        core.is_seeking = false;
        core.start_applied_this_mount = false;
        core.sampler.reset();
        core.ledger = ProgressLedger::new(self.cfg.progress_epsilon(), now);
        core.last_fed_token = core.ledger.token();
        core.machine = new_machine(&self.cfg, now);
        if core.user_paused {
            core.machine.handle(SmEvent::PauseDeclared);
        }

        match self.provider.element() {
            Some(el) => el.reload(),
            None => warn!("Hard reset requested with no element mounted"),
        }
        info!("Hard reset issued for {}", self.media_id);
    }

    fn maybe_emit_progress(&self, core: &mut Core, now: Instant) {
        if core.user_paused || core.machine.is_ended() {
            return;
        }
        let due = core
            .last_progress_emit
            .map_or(true, |t| now.duration_since(t) >= self.cfg.progress_event_interval());
        if due {
            core.last_progress_emit = Some(now);
            self.state.emit(StationEvent::PlaybackProgress {
                media_id: self.media_id.clone(),
                position_secs: core.last_position,
                duration_secs: if core.last_duration.is_finite() {
                    core.last_duration
                } else {
                    0.0
                },
                timestamp: chrono::Utc::now(),
            });
        }
    }

    async fn publish(&self, core: &mut Core) {
        let snapshot = PlaybackSnapshot {
            is_paused: core.user_paused,
            is_seeking: core.is_seeking,
            seconds: core.last_position,
            duration: if core.last_duration.is_finite() {
                core.last_duration
            } else {
                0.0
            },
            resilience: core.machine.status(),
        };
        self.state.update(|s| *s = snapshot).await;

        let new_state = if core.machine.is_ended() {
            PlaybackState::Ended
        } else if core.user_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        if new_state != core.published_state {
            let old_state = core.published_state;
            core.published_state = new_state;
            self.state.emit(StationEvent::PlaybackStateChanged {
                media_id: self.media_id.clone(),
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

fn new_machine(cfg: &EngineConfig, now: Instant) -> ResilienceMachine {
    ResilienceMachine::new(
        cfg.soft_stall(),
        cfg.hard_stall(),
        cfg.recovery_grace(),
        cfg.strategies.clone(),
        now,
    )
}
