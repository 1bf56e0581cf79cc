//! Adaptive bitrate control wired through the engine
//!
//! The controller only acts when the element exposes frame-decode
//! counters and the host installed a cap callback; its decisions reach
//! the host through that callback and the telemetry bus.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fitstream_common::events::{AbrReason, StationEvent};
use fitstream_common::{EventBus, MediaId};
use fitstream_play::config::EngineConfig;
use fitstream_play::media::{FrameStats, MediaEvent};
use fitstream_play::playback::engine::{PlayerEngine, PlayerOptions};
use fitstream_play::session::SessionStore;

use helpers::{drain, MockElement, SwappableProvider};

type CapLog = Arc<Mutex<Vec<(Option<u32>, AbrReason)>>>;

fn mount_with_callback(
    element: Arc<MockElement>,
) -> (
    PlayerEngine,
    CapLog,
    tokio::sync::broadcast::Receiver<StationEvent>,
) {
    helpers::init_tracing();
    let caps: CapLog = Arc::new(Mutex::new(Vec::new()));
    let caps_out = Arc::clone(&caps);
    let bus = Arc::new(EventBus::new(256));
    let events = bus.subscribe();

    let engine = PlayerEngine::mount(PlayerOptions {
        media_id: MediaId::new("ride-400"),
        provider: SwappableProvider::new(element),
        declared_start: None,
        session: Arc::new(SessionStore::new()),
        bus: Some(bus),
        cap_callback: Some(Arc::new(move |cap, reason| {
            caps.lock().unwrap().push((cap, reason));
        })),
        treat_as_stalled: false,
        config: EngineConfig::default(),
    })
    .expect("engine mount");

    (engine, caps_out, events)
}

/// Advance playback while accumulating frame-counter deltas per tick
async fn play_with_frames(element: &MockElement, ticks: usize, decoded: u64, dropped: u64) {
    for _ in 0..ticks {
        element.advance(0.45);
        element.with(|s| {
            let stats = s.frame_stats.get_or_insert(FrameStats::default());
            stats.total += decoded + dropped;
            stats.dropped += dropped;
        });
        tokio::time::sleep(Duration::from_millis(450)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_heavy_frame_drops_seed_the_initial_cap() {
    let element = MockElement::new(1800.0);
    element.with(|s| {
        s.is_video = true;
        s.frame_stats = Some(FrameStats::default());
    });
    let (engine, caps, mut events) = mount_with_callback(Arc::clone(&element));
    engine.handle_media_event(MediaEvent::LoadedMetadata).await;

    // ~60% of frames dropped each interval
    play_with_frames(&element, 4, 8, 12).await;

    let log = caps.lock().unwrap().clone();
    assert_eq!(log.first(), Some(&(Some(3000), AbrReason::Downscale)));
    assert_eq!(log.len(), 1, "one adaptation within the minimum interval");

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        StationEvent::BitrateAdaptation {
            cap_kbps: Some(3000),
            reason: AbrReason::Downscale,
            ..
        }
    )));

    assert_eq!(engine.diagnostics().await.bitrate_cap_kbps, Some(3000));
}

#[tokio::test(start_paused = true)]
async fn test_sustained_health_ramps_the_cap_back_up() {
    let element = MockElement::new(1800.0);
    element.with(|s| {
        s.is_video = true;
        s.frame_stats = Some(FrameStats::default());
    });
    let (engine, caps, _events) = mount_with_callback(Arc::clone(&element));
    engine.handle_media_event(MediaEvent::LoadedMetadata).await;

    play_with_frames(&element, 4, 8, 12).await;
    assert_eq!(engine.diagnostics().await.bitrate_cap_kbps, Some(3000));

    // Clean decode sustained past the ramp-up stability window
    play_with_frames(&element, 90, 20, 0).await;

    let log = caps.lock().unwrap().clone();
    assert_eq!(log.last(), Some(&(Some(6000), AbrReason::RampUp)));
    assert_eq!(
        log.iter()
            .filter(|(_, reason)| *reason == AbrReason::RampUp)
            .count(),
        1,
        "the cap doubles once, not more, within one stability window"
    );
}

#[tokio::test(start_paused = true)]
async fn test_abr_dormant_without_frame_telemetry() {
    let element = MockElement::new(1800.0);
    // No frame counters at all: FrameHealth stays Unsupported
    let (engine, caps, mut events) = mount_with_callback(Arc::clone(&element));
    engine.handle_media_event(MediaEvent::LoadedMetadata).await;

    for _ in 0..30 {
        element.advance(0.45);
        tokio::time::sleep(Duration::from_millis(450)).await;
    }

    assert!(caps.lock().unwrap().is_empty());
    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, StationEvent::BitrateAdaptation { .. })));
    assert_eq!(engine.diagnostics().await.bitrate_cap_kbps, None);
}
