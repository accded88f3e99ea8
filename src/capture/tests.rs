use super::*;
use crate::config::{BoothConfig, CaptureConfig};
use crate::events::{BoothEvent, EventBus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn test_capture_config() -> CaptureConfig {
    BoothConfig::default().capture
}

fn engine_with(
    host: MockCameraHost,
) -> (
    Arc<CaptureEngine>,
    Arc<MockHostState>,
    broadcast::Receiver<BoothEvent>,
) {
    let state = host.state();
    let bus = Arc::new(EventBus::new(256));
    let rx = bus.subscribe();
    let engine = Arc::new(CaptureEngine::new(
        Arc::new(host),
        test_capture_config(),
        bus,
    ));
    (engine, state, rx)
}

fn drain(rx: &mut broadcast::Receiver<BoothEvent>) -> Vec<BoothEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_recording_runs_to_ceiling() {
    let (engine, state, mut rx) = engine_with(MockCameraHost::single_front());

    let blob = engine.record(30).await.unwrap();
    assert_eq!(blob.data, b"mock-recording:1920x1080");
    assert_eq!(blob.media_type, "video/mp4");

    let events = drain(&mut rx);
    let ticks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BoothEvent::RecordingTick {
                elapsed, remaining, ..
            } => Some((*elapsed, *remaining)),
            _ => None,
        })
        .collect();
    assert_eq!(ticks.len(), 30);
    assert_eq!(ticks.first(), Some(&(1, 29)));
    assert_eq!(ticks.last(), Some(&(30, 0)));

    let urgent: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, BoothEvent::RecordingUrgent { remaining: 10 }))
        .collect();
    assert_eq!(urgent.len(), 1, "urgent warning fires exactly once");

    assert_eq!(engine.state(), CaptureState::Idle);
    assert!(!engine.is_active());
    assert!(engine.preview().is_none());
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_stop_ends_session_early() {
    let (engine, state, mut rx) = engine_with(MockCameraHost::single_front());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.record(600).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    engine.request_stop();

    let blob = runner.await.unwrap().unwrap();
    assert_eq!(blob.data, b"mock-recording:1920x1080");

    let ticks = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, BoothEvent::RecordingTick { .. }))
        .count();
    assert!(ticks <= 5, "stopped well before the ceiling, saw {}", ticks);

    assert_eq!(engine.state(), CaptureState::Idle);
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_finalize_still_releases_stream() {
    let (engine, state, _rx) =
        engine_with(MockCameraHost::single_front().with_failing_recorder());

    let err = engine.record(2).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::BoothError::Capture(crate::error::CaptureError::Recorder { .. })
    ));

    // the stream is stopped explicitly, not left to Drop
    assert_eq!(state.streams_stopped.load(Ordering::SeqCst), 1);
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
    assert_eq!(engine.state(), CaptureState::Idle);
    assert!(engine.preview().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_session_rejected_while_active() {
    let (engine, _state, _rx) = engine_with(MockCameraHost::single_front());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.record(600).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(engine.is_active());

    let err = engine.record(600).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::BoothError::Capture(crate::error::CaptureError::SessionActive)
    ));

    engine.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_propagates() {
    let (engine, state, _rx) =
        engine_with(MockCameraHost::single_front().with_denied_permission());

    let err = engine.record(30).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::BoothError::Capture(crate::error::CaptureError::PermissionDenied)
    ));
    assert_eq!(engine.state(), CaptureState::Idle);
    assert!(!engine.is_active());
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resolution_fallback_on_acquisition_failure() {
    let (engine, state, _rx) =
        engine_with(MockCameraHost::single_front().with_failing_resolution((1920, 1080)));

    let blob = engine.record(3).await.unwrap();
    assert_eq!(blob.data, b"mock-recording:1280x720");

    let requests = state.requests.lock().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].resolution, (1920, 1080));
    assert_eq!(requests[1].resolution, (1280, 720));
    // the retry relaxes the device constraint back to the generic hint
    assert_eq!(requests[1].device, DeviceSelector::FrontFacing);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_failure_is_fatal() {
    let host = MockCameraHost::single_front()
        .with_failing_resolution((1920, 1080))
        .with_failing_resolution((1280, 720));
    let (engine, state, _rx) = engine_with(host);

    let err = engine.record(30).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::BoothError::Capture(crate::error::CaptureError::Acquisition { .. })
    ));
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_device_upgraded_once_labels_appear() {
    let host = MockCameraHost::new(vec![
        VideoDeviceInfo::new("cam0", "Back Camera"),
        VideoDeviceInfo::new("cam1", "Front Camera"),
    ])
    .with_hidden_labels_until_open();
    let (engine, state, _rx) = engine_with(host);

    let blob = engine.record(3).await.unwrap();
    assert!(!blob.data.is_empty());

    // first open went through the generic hint, second pinned the
    // heuristically selected device
    assert_eq!(state.streams_opened.load(Ordering::SeqCst), 2);
    let requests = state.requests.lock().clone();
    assert_eq!(requests[0].device, DeviceSelector::FrontFacing);
    assert_eq!(
        requests[1].device,
        DeviceSelector::Exact("cam1".to_string())
    );
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_enumeration_failure_falls_back_to_hint() {
    let (engine, state, _rx) =
        engine_with(MockCameraHost::single_front().with_failing_enumeration());

    let blob = engine.record(3).await.unwrap();
    assert!(!blob.data.is_empty());

    let requests = state.requests.lock().clone();
    assert_eq!(requests[0].device, DeviceSelector::FrontFacing);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_is_idempotent_and_tears_down_session() {
    let (engine, state, _rx) = engine_with(MockCameraHost::single_front());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.record(600).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(engine.is_active());

    engine.cleanup().await;
    engine.cleanup().await;

    // the running session finds its resources gone and reports it
    let result = runner.await.unwrap();
    assert!(matches!(
        result,
        Err(crate::error::BoothError::Capture(
            crate::error::CaptureError::Recorder { .. }
        ))
    ));

    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
    assert!(engine.preview().is_none());
    assert!(!engine.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_device_cached_across_sessions() {
    let (engine, state, _rx) = engine_with(MockCameraHost::single_front());

    engine.record(2).await.unwrap();
    engine.record(2).await.unwrap();

    let requests = state.requests.lock().clone();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.device, DeviceSelector::Exact("cam0".to_string()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_preview_reports_mirrored_stream_during_session() {
    let (engine, _state, _rx) = engine_with(MockCameraHost::single_front());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.record(600).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let preview = engine.preview().expect("live session exposes preview");
    assert_eq!(preview.device_id, "cam0");
    assert_eq!(preview.resolution, (1920, 1080));
    assert!(preview.mirrored);

    engine.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_permission_probe_releases_stream() {
    let (engine, state, _rx) = engine_with(MockCameraHost::single_front());

    engine.permission_probe().await.unwrap();

    assert_eq!(state.streams_opened.load(Ordering::SeqCst), 1);
    assert_eq!(state.active_streams.load(Ordering::SeqCst), 0);
}
