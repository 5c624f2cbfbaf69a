//! Driver tests on tokio's paused clock

use loupe_core::sim::{ladder, SimFragmentLoader, SimManifestLoader, SimPlayer};
use loupe_core::{
    ControllerConfig, Error, HostEnvironment, Manifest, PlaybackStatus, PlayerEvent, PlayerHandle, SessionEvent,
    SessionOptions, StaticSignal,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};
use url::Url;

fn source() -> Url {
    Url::parse("https://cdn.example.com/series/ep1/master.m3u8").unwrap()
}

struct Running {
    handle: PlayerHandle,
    player: SimPlayer,
    loader: SimFragmentLoader,
}

fn spawn(host: HostEnvironment, effective_type: &str, config: ControllerConfig) -> Running {
    let player = SimPlayer::new();
    let loader = SimFragmentLoader::new(Vec::new());
    let manifest = Manifest::new(source(), ladder(&source(), &[240, 360, 480, 720]));

    let handle = PlayerHandle::spawn(
        SessionOptions::new(source()).with_muted(true),
        config,
        host,
        Box::new(StaticSignal::new(effective_type)),
        Arc::new(SimManifestLoader::new(manifest)),
        Box::new(player.clone()),
        Box::new(loader.clone()),
    )
    .unwrap();

    Running { handle, player, loader }
}

async fn ready(handle: &PlayerHandle) {
    let mut status = handle.status();
    assert_ok!(status.wait_for(|s| *s == PlaybackStatus::Ready).await);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_rejected() {
    let config = ControllerConfig {
        abr_up_factor: 1.5,
        ..Default::default()
    };
    let result = PlayerHandle::spawn(
        SessionOptions::new(source()),
        config,
        HostEnvironment::default(),
        Box::new(StaticSignal::absent()),
        Arc::new(SimManifestLoader::new(Manifest::new(source(), Vec::new()))),
        Box::new(SimPlayer::new()),
        Box::new(SimFragmentLoader::new(Vec::new())),
    );
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[tokio::test(start_paused = true)]
async fn test_mobile_moderate_restores_on_clock() {
    let host = HostEnvironment {
        viewport_width: 390,
        viewport_height: 844,
        ..Default::default()
    };
    let running = spawn(host, "3g", ControllerConfig::default());
    let mut events = running.handle.events();
    ready(&running.handle).await;
    assert!(!running.loader.snapshot().auto_level_enabled);

    sleep(Duration::from_millis(9_900)).await;
    assert!(!running.loader.snapshot().auto_level_enabled);

    sleep(Duration::from_millis(200)).await;
    assert!(running.loader.snapshot().auto_level_enabled);

    let mut restored = false;
    while let Ok(record) = events.try_recv() {
        restored |= record.event == SessionEvent::AutoSelectionRestored;
    }
    assert!(restored);
}

#[tokio::test(start_paused = true)]
async fn test_stall_recovered_through_driver() {
    let running = spawn(HostEnvironment::default(), "4g", ControllerConfig::default());
    ready(&running.handle).await;
    running.player.set_time(30.0);

    assert_ok!(running.handle.dispatch(PlayerEvent::Playing));
    assert_ok!(running.handle.dispatch(PlayerEvent::Waiting));
    let mut status = running.handle.status();
    assert_ok!(status.wait_for(|s| *s == PlaybackStatus::Buffering).await);

    // Desktop watchdog
    sleep(Duration::from_millis(4_100)).await;
    let seeks = running.player.snapshot().seeks;
    assert_eq!(seeks.len(), 1);
    assert!(seeks[0] > 30.0);

    assert_ok!(running.handle.dispatch(PlayerEvent::Playing));
    assert_ok!(status.wait_for(|s| *s == PlaybackStatus::Ready).await);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_closes_the_session() {
    let running = spawn(HostEnvironment::default(), "4g", ControllerConfig::default());
    ready(&running.handle).await;
    assert!(running.player.snapshot().muted);

    running.handle.destroy().await;
    assert_eq!(running.handle.destroy().await, 0);
    assert!(running.handle.is_closed());
    assert_err!(running.handle.dispatch(PlayerEvent::Playing));
    assert_eq!(running.loader.snapshot().destroyed, 1);
}
