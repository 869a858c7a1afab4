// tests/session_test.rs — Integration test: session state machine with mock supervisors

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{settings, source, wait_for, MockBackend};
use surfwatch::analysis::registry::ResultBoard;
use surfwatch::analysis::{LabelCounter, RelayAddress, Session, SessionStatus};

const QUIET: Duration = Duration::from_secs(3600);
const FAST: Duration = Duration::from_millis(50);

fn relay() -> RelayAddress {
    RelayAddress {
        host: "127.0.0.1".into(),
        port: 8600,
        path: "/stream.mjpeg".into(),
    }
}

fn session(backend: &MockBackend, health_interval: Duration) -> Arc<Session> {
    Session::new(
        source("reef1"),
        relay(),
        settings(health_interval),
        Arc::new(LabelCounter::new("surfer")),
        ResultBoard::default(),
        backend,
    )
}

#[tokio::test(start_paused = true)]
async fn test_failed_transcoder_never_goes_online() {
    let backend = MockBackend::default();
    backend.controls.transcode_fail.store(true, Ordering::SeqCst);
    let s = session(&backend, QUIET);
    assert_eq!(s.status(), SessionStatus::Starting);

    s.launch();
    wait_for(Duration::from_secs(5), || {
        s.status() == SessionStatus::TranscodeError
    })
    .await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(s.status(), SessionStatus::TranscodeError);
    assert_eq!(backend.controls.feed_starts(), 0);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_feed_reaches_feed_error() {
    let backend = MockBackend::default();
    backend.controls.feed_fail.store(true, Ordering::SeqCst);
    let s = session(&backend, QUIET);

    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::FeedError).await;
    assert!(backend.controls.transcoder_alive());
    assert_eq!(backend.controls.feed_starts(), 1);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_healthy_pipeline_goes_online_and_stops_clean() {
    let backend = MockBackend::default();
    let s = session(&backend, FAST);

    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Online).await;
    assert!(backend.controls.transcoder_alive());
    assert!(backend.controls.feed_running());

    s.stop().await;
    assert_eq!(s.status(), SessionStatus::Stopped);
    assert!(s.is_stopping());
    assert!(!backend.controls.transcoder_alive());
    assert!(!backend.controls.feed_running());
}

#[tokio::test(start_paused = true)]
async fn test_events_update_latest_result() {
    let backend = MockBackend::default();
    let s = session(&backend, QUIET);
    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Online).await;

    backend
        .controls
        .emit(json!({ "predictions": [{ "class": "Surfer" }, { "class": "wave" }] }))
        .await;
    wait_for(Duration::from_secs(5), || s.latest_result().count == 1).await;
    assert!(s.latest_result().observed_at.is_some());

    // Unrecognized shapes count zero and keep the feed going.
    backend.controls.emit(json!("warming up")).await;
    wait_for(Duration::from_secs(5), || s.latest_result().count == 0).await;
    assert_eq!(s.status(), SessionStatus::Online);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_restarts_are_bounded() {
    let backend = MockBackend::default();
    backend.controls.transcode_fail.store(true, Ordering::SeqCst);
    let s = session(&backend, FAST);

    s.launch();
    wait_for(Duration::from_secs(30), || s.status() == SessionStatus::Error).await;
    // Initial launch plus max_attempts restarts.
    assert_eq!(backend.controls.transcoder_starts(), 4);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.controls.transcoder_starts(), 4);
    assert_eq!(s.status(), SessionStatus::Error);

    s.stop().await;
    assert_eq!(s.status(), SessionStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_dead_feed_is_restarted() {
    let backend = MockBackend::default();
    let s = session(&backend, FAST);
    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Online).await;

    backend.controls.feed_running.store(false, Ordering::SeqCst);
    wait_for(Duration::from_secs(5), || backend.controls.feed_starts() == 2).await;
    wait_for(Duration::from_secs(5), || backend.controls.feed_running()).await;
    assert_eq!(s.status(), SessionStatus::Online);
    assert_eq!(backend.controls.transcoder_starts(), 1);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_recovered_transcoder_resets_budget() {
    let backend = MockBackend::default();
    let s = session(&backend, FAST);
    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Online).await;

    // Far more deaths than max_attempts, each one recovered.
    for expected in 2..=8 {
        backend.controls.kill_transcoder();
        wait_for(Duration::from_secs(5), || {
            backend.controls.transcoder_starts() == expected
        })
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(s.status(), SessionStatus::Online);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_supervisor_maps_to_error() {
    let backend = MockBackend::default();
    backend.controls.transcode_panic.store(true, Ordering::SeqCst);
    let s = session(&backend, FAST);

    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Error).await;
    s.stop().await;
    assert_eq!(s.status(), SessionStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_restarts_converges() {
    let backend = MockBackend::default();
    backend.controls.transcode_fail.store(true, Ordering::SeqCst);
    let s = session(&backend, FAST);
    s.launch();
    wait_for(Duration::from_secs(5), || {
        backend.controls.transcoder_starts() >= 2
    })
    .await;

    // Let the next restart succeed so a live process exists to reclaim.
    backend.controls.transcode_fail.store(false, Ordering::SeqCst);
    s.stop().await;

    let starts = backend.controls.transcoder_starts();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(s.status(), SessionStatus::Stopped);
    assert!(!backend.controls.transcoder_alive());
    assert!(!backend.controls.feed_running());
    assert_eq!(backend.controls.transcoder_starts(), starts);
}

#[tokio::test(start_paused = true)]
async fn test_result_racing_stop_is_discarded() {
    let backend = MockBackend::default();
    let board = ResultBoard::default();
    let s = Session::new(
        source("reef1"),
        relay(),
        settings(QUIET),
        Arc::new(LabelCounter::new("surfer")),
        board.clone(),
        &backend,
    );
    s.launch();
    wait_for(Duration::from_secs(5), || s.status() == SessionStatus::Online).await;

    backend
        .controls
        .emit(json!({ "predictions": [{ "class": "surfer" }] }))
        .await;
    wait_for(Duration::from_secs(5), || s.latest_result().count == 1).await;
    let before = s.latest_result();

    // Queued but not yet consumed when the stop request lands.
    let late = backend.controls.sender().unwrap();
    late.send(json!({ "predictions": [{ "class": "surfer" }, { "class": "surfer" }] }))
        .await
        .unwrap();
    s.stop().await;
    let _ = late
        .send(json!({ "predictions": [{ "class": "surfer" }] }))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(s.status(), SessionStatus::Stopped);
    assert_eq!(s.latest_result(), before);
    assert_eq!(board.get("reef1"), Some(before));
}
