//! Shared test infrastructure: a scripted media element and engine setup
//!
//! The mock element is fully controllable from the test body: position
//! advance, decoder freeze, seek honoring, frame counters. Tests forward
//! lifecycle events themselves, playing the role of the host glue.

use std::sync::{Arc, Mutex};

use fitstream_common::{EventBus, MediaId, StationEvent};
use fitstream_play::config::EngineConfig;
use fitstream_play::media::{
    BufferedRange, FrameStats, MediaElement, NetworkState, ReadyState,
};
use fitstream_play::playback::engine::{PlayerEngine, PlayerOptions};
use fitstream_play::session::SessionStore;

/// Element command recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementCall {
    Play,
    Pause,
    Seek(f64),
    Reload,
}

#[derive(Debug)]
pub struct MockState {
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub ended: bool,
    pub ready: ReadyState,
    pub network: NetworkState,
    pub buffered: Vec<BufferedRange>,
    pub is_video: bool,
    pub frame_stats: Option<FrameStats>,
    /// Frozen decoder: position stops advancing, seeks are ignored
    pub frozen: bool,
    /// When false, seeks are recorded but the playhead never moves
    pub honor_seeks: bool,
    pub calls: Vec<ElementCall>,
}

pub struct MockElement {
    state: Mutex<MockState>,
}

impl MockElement {
    pub fn new(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                position: 0.0,
                duration,
                paused: true,
                ended: false,
                ready: ReadyState::HaveEnoughData,
                network: NetworkState::Idle,
                buffered: vec![BufferedRange {
                    start: 0.0,
                    end: duration,
                }],
                is_video: false,
                frame_stats: None,
                frozen: false,
                honor_seeks: true,
                calls: Vec::new(),
            }),
        })
    }

    pub fn with<R>(&self, apply: impl FnOnce(&mut MockState) -> R) -> R {
        apply(&mut self.state.lock().unwrap())
    }

    /// Simulate decode progress (no-op while frozen or paused)
    pub fn advance(&self, secs: f64) {
        let mut s = self.state.lock().unwrap();
        if !s.frozen && !s.paused {
            s.position = (s.position + secs).min(s.duration);
        }
    }

    pub fn freeze(&self) {
        self.state.lock().unwrap().frozen = true;
    }

    pub fn calls(&self) -> Vec<ElementCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ElementCall::Seek(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn reload_count(&self) -> usize {
        self.calls()
            .into_iter()
            .filter(|c| *c == ElementCall::Reload)
            .count()
    }

    pub fn position(&self) -> f64 {
        self.state.lock().unwrap().position
    }
}

impl MediaElement for MockElement {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn set_current_time(&self, seconds: f64) {
        let mut s = self.state.lock().unwrap();
        s.calls.push(ElementCall::Seek(seconds));
        if s.honor_seeks && !s.frozen {
            s.position = seconds.clamp(0.0, s.duration);
        }
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready
    }

    fn network_state(&self) -> NetworkState {
        self.state.lock().unwrap().network
    }

    fn buffered(&self) -> Vec<BufferedRange> {
        self.state.lock().unwrap().buffered.clone()
    }

    fn is_video(&self) -> bool {
        self.state.lock().unwrap().is_video
    }

    fn frame_stats(&self) -> Option<FrameStats> {
        self.state.lock().unwrap().frame_stats
    }

    fn request_play(&self) {
        let mut s = self.state.lock().unwrap();
        s.calls.push(ElementCall::Play);
        s.paused = false;
    }

    fn request_pause(&self) {
        let mut s = self.state.lock().unwrap();
        s.calls.push(ElementCall::Pause);
        s.paused = true;
    }

    fn reload(&self) {
        let mut s = self.state.lock().unwrap();
        s.calls.push(ElementCall::Reload);
        // A reattach hands back a fresh, responsive element
        s.position = 0.0;
        s.frozen = false;
        s.honor_seeks = true;
        s.paused = true;
        s.ready = ReadyState::HaveNothing;
    }
}

/// Provider handing out the given element until `clear()` is called
pub struct SwappableProvider {
    current: Mutex<Option<Arc<MockElement>>>,
}

impl SwappableProvider {
    pub fn new(element: Arc<MockElement>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Some(element)),
        })
    }

    pub fn swap(&self, element: Option<Arc<MockElement>>) {
        *self.current.lock().unwrap() = element;
    }
}

impl fitstream_play::media::ElementProvider for SwappableProvider {
    fn element(&self) -> Option<Arc<dyn MediaElement>> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .map(|e| e as Arc<dyn MediaElement>)
    }
}

pub struct TestRig {
    pub engine: PlayerEngine,
    pub element: Arc<MockElement>,
    pub provider: Arc<SwappableProvider>,
    pub session: Arc<SessionStore>,
    pub events: tokio::sync::broadcast::Receiver<StationEvent>,
}

pub fn mount_engine(
    media_id: &str,
    element: Arc<MockElement>,
    session: Arc<SessionStore>,
    config: EngineConfig,
    declared_start: Option<f64>,
) -> TestRig {
    init_tracing();
    let provider = SwappableProvider::new(Arc::clone(&element));
    let bus = Arc::new(EventBus::new(256));
    let events = bus.subscribe();
    let engine = PlayerEngine::mount(PlayerOptions {
        media_id: MediaId::new(media_id),
        provider: provider.clone(),
        declared_start,
        session: Arc::clone(&session),
        bus: Some(bus),
        cap_callback: None,
        treat_as_stalled: false,
        config,
    })
    .expect("engine mount");

    TestRig {
        engine,
        element,
        provider,
        session,
        events,
    }
}

/// Drain every event buffered on the receiver
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<StationEvent>) -> Vec<StationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Opt-in log output while debugging a failing test (RUST_LOG=debug)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
