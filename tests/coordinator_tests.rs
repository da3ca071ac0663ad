// Integration tests for the session coordinator
//
// These drive full start/stop cycles through fake devices, scripted encoders
// and a fake mirror transport, and check what lands on disk.

mod common;

use common::{screen, wait_until, within, DeviceBehavior, FakeDevices, FakeTransport, Frame, ScriptedEncoders};
use screen_recorder::capture::{Platform, StreamAcquirer};
use screen_recorder::media::StreamKind;
use screen_recorder::mirror::{MirrorState, NetworkMirror};
use screen_recorder::persistence::{FixedDirectory, PersistenceSink};
use screen_recorder::session::{SessionConfig, SessionCoordinator, SessionEvent, SessionPhase};
use screen_recorder::{PipelineState, RecorderError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

struct Harness {
    coordinator: Arc<SessionCoordinator>,
    devices: Arc<FakeDevices>,
    encoders: Arc<ScriptedEncoders>,
    dir: TempDir,
}

fn harness(devices: FakeDevices, encoders: ScriptedEncoders, platform: Platform) -> Harness {
    build(devices, encoders, platform, None)
}

fn build(
    devices: FakeDevices,
    encoders: ScriptedEncoders,
    platform: Platform,
    mirror: Option<NetworkMirror>,
) -> Harness {
    let devices = Arc::new(devices);
    let encoders = Arc::new(encoders);
    let dir = TempDir::new().unwrap();

    let acquirer = StreamAcquirer::new(devices.clone(), platform);
    let sink = PersistenceSink::new(Arc::new(FixedDirectory::new(dir.path())));
    let config = SessionConfig {
        chunk_interval: Duration::from_millis(1000),
        drain_timeout: Duration::from_millis(300),
    };

    let mut coordinator = SessionCoordinator::new(acquirer, encoders.clone(), sink, config);
    if let Some(mirror) = mirror {
        coordinator = coordinator.with_mirror(mirror);
    }

    Harness {
        coordinator: Arc::new(coordinator),
        devices,
        encoders,
        dir,
    }
}

fn linux() -> Harness {
    harness(FakeDevices::granting(), ScriptedEncoders::new(), Platform::Linux)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn files_in(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_start_records_all_three_streams() {
    let h = linux();
    let mut events = h.coordinator.subscribe();

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    assert_eq!(outcome.active_streams, StreamKind::ALL.to_vec());
    assert!(outcome.degraded.is_empty());
    assert_eq!(outcome.indicator, "Recording (Video + System Audio + Microphone)...");
    assert!(outcome.session_id.starts_with("recording_"));
    assert_eq!(outcome.session_id.len(), "recording_20250101_120000".len());
    assert_eq!(h.coordinator.phase(), SessionPhase::Active);
    assert_eq!(h.coordinator.active_streams().await, StreamKind::ALL.to_vec());

    let seen = drain(&mut events);
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Started { streams, .. }) if streams.len() == 3
    ));
}

#[tokio::test]
async fn test_macos_degrades_to_video_and_microphone() {
    let h = harness(FakeDevices::granting(), ScriptedEncoders::new(), Platform::MacOs);
    let mut events = h.coordinator.subscribe();

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    assert_eq!(outcome.active_streams, vec![StreamKind::Video, StreamKind::Microphone]);
    assert_eq!(outcome.degraded.len(), 1);
    assert_eq!(outcome.degraded[0].kind, StreamKind::SystemAudio);
    assert_eq!(outcome.indicator, "Recording (Video + Microphone)...");
    let status = h.coordinator.status().await;
    assert_eq!(status.requested_streams, StreamKind::ALL.to_vec());
    assert_eq!(status.active_streams, vec![StreamKind::Video, StreamKind::Microphone]);
    // Never asked the OS for loopback audio
    assert_eq!(h.devices.calls(StreamKind::SystemAudio), 0);

    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        SessionEvent::Degraded {
            kind: StreamKind::SystemAudio,
            ..
        }
    )));
}

#[tokio::test]
async fn test_denied_microphone_degrades_session() {
    let h = harness(
        FakeDevices::granting().with(StreamKind::Microphone, DeviceBehavior::Deny),
        ScriptedEncoders::new(),
        Platform::Linux,
    );

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    assert_eq!(outcome.active_streams, vec![StreamKind::Video, StreamKind::SystemAudio]);
    assert!(outcome.degraded[0].reason.contains("Permission denied"));
}

#[tokio::test]
async fn test_secondary_encoder_failure_degrades_and_releases() {
    let h = harness(
        FakeDevices::granting(),
        ScriptedEncoders::new().failing_start(StreamKind::SystemAudio),
        Platform::Linux,
    );

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    assert_eq!(outcome.active_streams, vec![StreamKind::Video, StreamKind::Microphone]);
    assert!(h
        .devices
        .tracks(StreamKind::SystemAudio)
        .iter()
        .all(|t| !t.is_live()));
}

#[tokio::test]
async fn test_denied_display_aborts_start() {
    let h = harness(
        FakeDevices::granting().with(StreamKind::Video, DeviceBehavior::Deny),
        ScriptedEncoders::new(),
        Platform::Linux,
    );
    let mut events = h.coordinator.subscribe();

    let err = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::PermissionDenied(StreamKind::Video)));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(h.coordinator.active_streams().await.is_empty());
    assert_eq!(h.devices.calls(StreamKind::SystemAudio), 0);
    assert_eq!(h.devices.calls(StreamKind::Microphone), 0);
    assert!(matches!(
        drain(&mut events).last(),
        Some(SessionEvent::StartFailed { .. })
    ));
}

#[tokio::test]
async fn test_video_encoder_failure_aborts_and_releases_everything() {
    let h = harness(
        FakeDevices::granting(),
        ScriptedEncoders::supporting(&["audio/webm;codecs=opus"]),
        Platform::Linux,
    );

    let err = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::EncoderInitError(StreamKind::Video, _)));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(h.devices.all_released());

    // A later start is attempted again rather than rejected as busy
    let retry = h.coordinator.start_session(&screen("screen:0", "Screen 1")).await;
    assert!(matches!(retry, Err(RecorderError::EncoderInitError(..))));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let h = linux();
    let first = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();
    let mut events = h.coordinator.subscribe();

    let err = h
        .coordinator
        .start_session(&screen("screen:1", "Screen 2"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::SessionBusy));
    assert!(matches!(drain(&mut events).as_slice(), [SessionEvent::Busy]));
    assert_eq!(h.devices.calls(StreamKind::Video), 1);

    let status = h.coordinator.status().await;
    assert_eq!(status.session_id.as_deref(), Some(first.session_id.as_str()));
    assert_eq!(status.active_streams.len(), 3);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_starting() {
    let h = harness(
        FakeDevices::granting().with_display_delay(Duration::from_millis(200)),
        ScriptedEncoders::new(),
        Platform::Linux,
    );

    let first = tokio::spawn({
        let coordinator = h.coordinator.clone();
        async move {
            coordinator
                .start_session(&screen("screen:0", "Screen 1"))
                .await
        }
    });
    wait_until(|| h.coordinator.phase() == SessionPhase::Starting).await;

    let err = h
        .coordinator
        .start_session(&screen("screen:1", "Screen 2"))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::SessionBusy));

    let outcome = within(first).await.unwrap().unwrap();
    assert_eq!(outcome.active_streams.len(), 3);
    assert_eq!(h.coordinator.phase(), SessionPhase::Active);
    assert_eq!(h.devices.calls(StreamKind::Video), 1);
}

#[tokio::test]
async fn test_abandoned_start_still_completes() {
    let h = harness(
        FakeDevices::granting().with_display_delay(Duration::from_millis(100)),
        ScriptedEncoders::new(),
        Platform::Linux,
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        h.coordinator.start_session(&screen("screen:0", "Screen 1")),
    )
    .await;
    assert!(abandoned.is_err());

    wait_until(|| h.coordinator.phase() == SessionPhase::Active).await;
    assert_eq!(h.coordinator.active_streams().await.len(), 3);
    assert!(within(h.coordinator.stop_session()).await.is_some());
}

#[tokio::test]
async fn test_abandoned_stop_still_saves_and_returns_to_idle() {
    // The video drain hangs until the 300ms drain timeout
    let h = harness(
        FakeDevices::granting(),
        ScriptedEncoders::new().hanging_on_stop(StreamKind::Video),
        Platform::Linux,
    );
    let id = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap()
        .session_id;
    h.encoders.emit(StreamKind::Video, b"abc").await;

    let abandoned = tokio::time::timeout(Duration::from_millis(50), h.coordinator.stop_session()).await;
    assert!(abandoned.is_err());

    wait_until(|| h.coordinator.phase() == SessionPhase::Idle).await;
    assert_eq!(
        std::fs::read(h.dir.path().join(format!("{}.webm", id))).unwrap(),
        b"abc"
    );
    assert!(h.devices.all_released());

    assert!(h.coordinator.stop_session().await.is_none());
    assert!(h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_stop_without_session_is_noop() {
    let h = linux();

    assert!(h.coordinator.stop_session().await.is_none());
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(files_in(&h.dir).is_empty());
}

#[tokio::test]
async fn test_round_trip_saves_recorded_streams() {
    let h = harness(
        FakeDevices::granting().with(StreamKind::SystemAudio, DeviceBehavior::Missing),
        ScriptedEncoders::new()
            .with_final_chunk(StreamKind::Video, b"-end")
            .with_final_chunk(StreamKind::Microphone, b"-end"),
        Platform::Linux,
    );
    let mut events = h.coordinator.subscribe();

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();
    let id = outcome.session_id.clone();

    h.encoders.emit(StreamKind::Video, b"v1").await;
    h.encoders.emit(StreamKind::Microphone, b"m1").await;
    h.encoders.emit(StreamKind::Video, b"v2").await;

    let report = within(h.coordinator.stop_session()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.files_saved, 2);
    assert_eq!(
        files_in(&h.dir),
        vec![
            format!("{}.webm", id),
            format!("{}_info.txt", id),
            format!("{}_microphone.webm", id),
        ]
    );
    assert_eq!(
        std::fs::read(h.dir.path().join(format!("{}.webm", id))).unwrap(),
        b"v1v2-end"
    );
    assert_eq!(
        std::fs::read(h.dir.path().join(format!("{}_microphone.webm", id))).unwrap(),
        b"m1-end"
    );

    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(h.coordinator.active_streams().await.is_empty());
    assert!(h.devices.all_released());

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, SessionEvent::Saved { .. })));
    assert!(matches!(seen.last(), Some(SessionEvent::Stopped { session_id }) if *session_id == id));

    // Ready for the next session
    assert!(h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_stream_failure_mid_session_keeps_others_recording() {
    let h = linux();
    let mut events = h.coordinator.subscribe();
    h.coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    h.encoders.emit(StreamKind::Video, b"video").await;
    h.encoders.emit(StreamKind::Microphone, b"mic").await;
    h.encoders.fail(StreamKind::Microphone, "microphone unplugged").await;

    within(async {
        while h.coordinator.active_streams().await.contains(&StreamKind::Microphone) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert_eq!(
        h.coordinator.active_streams().await,
        vec![StreamKind::Video, StreamKind::SystemAudio]
    );
    let status = h.coordinator.status().await;
    assert_eq!(status.indicator, "Recording (Video + System Audio)...");
    let microphone = status
        .streams
        .iter()
        .find(|s| s.kind == StreamKind::Microphone)
        .unwrap();
    assert_eq!(microphone.state, PipelineState::Failed);
    assert!(h
        .devices
        .tracks(StreamKind::Microphone)
        .iter()
        .all(|t| !t.is_live()));

    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::StreamFailed {
            kind: StreamKind::Microphone,
            ..
        }
    )));

    let report = within(h.coordinator.stop_session()).await.unwrap();
    // Only video produced data; the failed microphone is not saved
    assert_eq!(report.files_saved, 1);
    assert_eq!(h.encoders.stop_calls(StreamKind::Microphone), 0);
}

#[tokio::test]
async fn test_session_without_data_reports_failure() {
    let h = linux();
    h.coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();

    let report = within(h.coordinator.stop_session()).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.files_saved, 0);
    assert_eq!(
        report.error.as_deref(),
        Some("No files were saved. All recordings may have been empty or failed.")
    );
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(files_in(&h.dir).is_empty());
}

#[tokio::test]
async fn test_mirror_receives_chunks_and_end_marker() {
    let transport = Arc::new(FakeTransport::new());
    let h = build(
        FakeDevices::granting(),
        ScriptedEncoders::new(),
        Platform::Linux,
        Some(NetworkMirror::new(
            transport.clone(),
            Duration::from_millis(300),
            Duration::from_millis(300),
        )),
    );

    let outcome = h
        .coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();
    let id = outcome.session_id;

    // Wait until every stream's mirror is open
    within(async {
        loop {
            let status = h.coordinator.status().await;
            let open = status
                .streams
                .iter()
                .filter(|s| s.mirror == Some(MirrorState::Open))
                .count();
            if open == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let report = within(h.coordinator.stop_session()).await.unwrap();
    assert_eq!(report.files_saved, 0);

    for kind in StreamKind::ALL {
        let frames = transport.frames(kind, &id);
        assert_eq!(frames, vec![Frame::End, Frame::Closed], "{:?}", kind);
    }
}

#[tokio::test]
async fn test_mirror_forwards_final_chunk_before_end_marker() {
    let devices = Arc::new(FakeDevices::granting().with(StreamKind::SystemAudio, DeviceBehavior::Deny));
    let encoders = Arc::new(ScriptedEncoders::new().with_final_chunk(StreamKind::Microphone, b"last"));
    let transport = Arc::new(FakeTransport::new());
    let dir = TempDir::new().unwrap();

    let coordinator = Arc::new(
        SessionCoordinator::new(
            StreamAcquirer::new(devices.clone(), Platform::Linux),
            encoders.clone(),
            PersistenceSink::new(Arc::new(FixedDirectory::new(dir.path()))),
            SessionConfig::default(),
        )
        .with_mirror(NetworkMirror::new(
            transport.clone(),
            Duration::from_millis(300),
            Duration::from_millis(300),
        )),
    );

    let id = coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap()
        .session_id;

    within(async {
        while coordinator
            .status()
            .await
            .streams
            .iter()
            .any(|s| s.mirror != Some(MirrorState::Open))
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    encoders.emit(StreamKind::Microphone, b"first").await;
    let report = within(coordinator.stop_session()).await.unwrap();

    assert!(report.success);
    assert_eq!(
        transport.frames(StreamKind::Microphone, &id),
        vec![
            Frame::Chunk(bytes::Bytes::from_static(b"first")),
            Frame::Chunk(bytes::Bytes::from_static(b"last")),
            Frame::End,
            Frame::Closed,
        ]
    );
    // Denied stream never got a mirror
    assert!(transport.frames(StreamKind::SystemAudio, &id).is_empty());
}

#[tokio::test]
async fn test_unreachable_mirror_does_not_affect_recording() {
    let devices = Arc::new(FakeDevices::granting());
    let encoders = Arc::new(ScriptedEncoders::new());
    let dir = TempDir::new().unwrap();

    let coordinator = Arc::new(
        SessionCoordinator::new(
            StreamAcquirer::new(devices.clone(), Platform::Linux),
            encoders.clone(),
            PersistenceSink::new(Arc::new(FixedDirectory::new(dir.path()))),
            SessionConfig::default(),
        )
        .with_mirror(NetworkMirror::new(
            Arc::new(FakeTransport::refusing()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )),
    );

    let outcome = coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();
    assert_eq!(outcome.active_streams.len(), 3);

    encoders.emit(StreamKind::Video, b"frames").await;
    let report = within(coordinator.stop_session()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.files_saved, 1);
}

#[tokio::test]
async fn test_status_while_idle() {
    let h = linux();
    let status = h.coordinator.status().await;

    assert_eq!(status.phase, SessionPhase::Idle);
    assert!(status.session_id.is_none());
    assert!(status.streams.is_empty());
    assert_eq!(status.indicator, "Not recording");
}

#[tokio::test]
async fn test_shutdown_saves_active_session() {
    let h = linux();
    h.coordinator
        .start_session(&screen("screen:0", "Screen 1"))
        .await
        .unwrap();
    h.encoders.emit(StreamKind::Video, b"frames").await;

    let report = within(h.coordinator.shutdown()).await.unwrap();

    assert!(report.success);
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert!(h.coordinator.shutdown().await.is_none());
}
