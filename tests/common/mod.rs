// Test doubles for the platform seams: source enumeration, media devices,
// encoders and mirror transports.

#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::Bytes;
use screen_recorder::capture::{
    CaptureSource, MediaDevices, SourceEnumerator, SourceKind,
};
use screen_recorder::error::RecorderError;
use screen_recorder::media::{
    AudioConstraints, CaptureInput, Encoder, EncoderEvent, EncoderFactory, MediaStream,
    MediaTrack, StreamKind, TrackKind, TrackLiveness,
};
use screen_recorder::mirror::{MirrorLink, MirrorTransport};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn screen(id: &str, name: &str) -> CaptureSource {
    CaptureSource::new(id, name, SourceKind::Screen)
}

pub fn window(id: &str, name: &str) -> CaptureSource {
    CaptureSource::new(id, name, SourceKind::Window)
}

/// Poll `condition` until it holds, failing the test after a second
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 1s");
}

/// Await `future`, failing the test after a second
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), future)
        .await
        .expect("future did not complete within 1s")
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Default)]
pub struct FakeSources {
    sources: Mutex<Vec<CaptureSource>>,
    denied: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl FakeSources {
    pub fn new(sources: Vec<CaptureSource>) -> Self {
        Self {
            sources: Mutex::new(sources),
            ..Default::default()
        }
    }

    pub fn set(&self, sources: Vec<CaptureSource>) {
        *self.sources.lock().unwrap() = sources;
    }

    pub fn deny(&self) {
        *self.denied.lock().unwrap() = true;
    }
}

#[async_trait::async_trait]
impl SourceEnumerator for FakeSources {
    async fn enumerate(&self) -> Result<Vec<CaptureSource>, RecorderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.denied.lock().unwrap() {
            return Err(RecorderError::SourceEnumerationError(
                "screen capture permission denied".to_string(),
            ));
        }
        Ok(self.sources.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Media devices
// ============================================================================

/// How a fake device answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBehavior {
    Grant,
    Deny,
    Missing,
    /// Display only: a stream without a video track
    NoVideo,
}

pub struct FakeDevices {
    behavior: Mutex<HashMap<StreamKind, DeviceBehavior>>,
    calls: Mutex<HashMap<StreamKind, usize>>,
    handed_out: Mutex<HashMap<StreamKind, Vec<TrackLiveness>>>,
    constraints: Mutex<Option<AudioConstraints>>,
    display_delay: Mutex<Option<Duration>>,
}

impl FakeDevices {
    pub fn granting() -> Self {
        let behavior = StreamKind::ALL
            .iter()
            .map(|kind| (*kind, DeviceBehavior::Grant))
            .collect();

        Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(HashMap::new()),
            handed_out: Mutex::new(HashMap::new()),
            constraints: Mutex::new(None),
            display_delay: Mutex::new(None),
        }
    }

    /// The display picker takes `delay` to answer
    pub fn with_display_delay(self, delay: Duration) -> Self {
        *self.display_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with(self, kind: StreamKind, behavior: DeviceBehavior) -> Self {
        self.behavior.lock().unwrap().insert(kind, behavior);
        self
    }

    pub fn calls(&self, kind: StreamKind) -> usize {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    /// Liveness of every track handed out for `kind`
    pub fn tracks(&self, kind: StreamKind) -> Vec<TrackLiveness> {
        self.handed_out
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// No track of any kind is still live
    pub fn all_released(&self) -> bool {
        self.handed_out
            .lock()
            .unwrap()
            .values()
            .flatten()
            .all(|track| !track.is_live())
    }

    pub fn microphone_constraints(&self) -> Option<AudioConstraints> {
        *self.constraints.lock().unwrap()
    }

    fn answer(&self, kind: StreamKind, tracks: Vec<MediaTrack>) -> Result<MediaStream, RecorderError> {
        *self.calls.lock().unwrap().entry(kind).or_default() += 1;

        let behavior = self.behavior.lock().unwrap()[&kind];
        match behavior {
            DeviceBehavior::Deny => Err(RecorderError::PermissionDenied(kind)),
            DeviceBehavior::Missing => Err(RecorderError::DeviceUnavailable(
                kind,
                "no such device".to_string(),
            )),
            DeviceBehavior::Grant | DeviceBehavior::NoVideo => {
                let tracks = if behavior == DeviceBehavior::NoVideo {
                    tracks
                        .into_iter()
                        .filter(|t| t.kind() != TrackKind::Video)
                        .collect()
                } else {
                    tracks
                };

                let stream = MediaStream::new(format!("{}-stream", kind.slug()), tracks);
                self.handed_out
                    .lock()
                    .unwrap()
                    .entry(kind)
                    .or_default()
                    .extend(stream.liveness());
                Ok(stream)
            }
        }
    }
}

fn audio_track(kind: StreamKind) -> MediaTrack {
    MediaTrack::new(
        format!("{}-audio", kind.slug()),
        TrackKind::Audio,
        kind.label(),
        CaptureInput::new("fake", kind.slug()),
    )
}

#[async_trait::async_trait]
impl MediaDevices for FakeDevices {
    async fn display_media(&self, source: &CaptureSource) -> Result<MediaStream, RecorderError> {
        let delay = *self.display_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let video = MediaTrack::new(
            source.id.as_str(),
            TrackKind::Video,
            source.name.as_str(),
            CaptureInput::new("fake", source.id.as_str()),
        );
        self.answer(StreamKind::Video, vec![video, audio_track(StreamKind::Video)])
    }

    async fn system_audio(&self) -> Result<MediaStream, RecorderError> {
        self.answer(StreamKind::SystemAudio, vec![audio_track(StreamKind::SystemAudio)])
    }

    async fn microphone(&self, constraints: AudioConstraints) -> Result<MediaStream, RecorderError> {
        *self.constraints.lock().unwrap() = Some(constraints);
        self.answer(
            StreamKind::Microphone,
            vec![audio_track(StreamKind::Microphone).with_constraints(constraints)],
        )
    }
}

// ============================================================================
// Encoders
// ============================================================================

#[derive(Default)]
struct Script {
    senders: Mutex<HashMap<StreamKind, mpsc::Sender<EncoderEvent>>>,
    final_chunks: Mutex<HashMap<StreamKind, Bytes>>,
    hang_on_stop: Mutex<HashSet<StreamKind>>,
    fail_on_stop: Mutex<HashMap<StreamKind, String>>,
    failing_start: Mutex<HashSet<StreamKind>>,
    stop_calls: Mutex<HashMap<StreamKind, usize>>,
    created: Mutex<HashMap<StreamKind, String>>,
}

/// Encoders driven by the test: chunks are pushed with `emit`, errors with
/// `fail`, and `stop` flushes a configurable final chunk
pub struct ScriptedEncoders {
    supported: HashSet<String>,
    script: Arc<Script>,
}

impl ScriptedEncoders {
    /// Supports every preferred WebM type
    pub fn new() -> Self {
        Self::supporting(&[
            "video/webm;codecs=vp9",
            "video/webm;codecs=vp8",
            "video/webm",
            "audio/webm;codecs=opus",
            "audio/webm",
        ])
    }

    pub fn supporting(types: &[&str]) -> Self {
        Self {
            supported: types.iter().map(|t| t.to_string()).collect(),
            script: Arc::new(Script::default()),
        }
    }

    /// Chunk flushed on stop
    pub fn with_final_chunk(self, kind: StreamKind, chunk: &'static [u8]) -> Self {
        self.script
            .final_chunks
            .lock()
            .unwrap()
            .insert(kind, Bytes::from_static(chunk));
        self
    }

    /// `stop` never completes the drain
    pub fn hanging_on_stop(self, kind: StreamKind) -> Self {
        self.script.hang_on_stop.lock().unwrap().insert(kind);
        self
    }

    /// The drain ends with `message` as an encoder error instead of a clean stop
    pub fn failing_on_stop(self, kind: StreamKind, message: &str) -> Self {
        self.script
            .fail_on_stop
            .lock()
            .unwrap()
            .insert(kind, message.to_string());
        self
    }

    /// `start` fails for `kind`
    pub fn failing_start(self, kind: StreamKind) -> Self {
        self.script.failing_start.lock().unwrap().insert(kind);
        self
    }

    pub async fn emit(&self, kind: StreamKind, chunk: &'static [u8]) {
        self.send(kind, EncoderEvent::Data(Bytes::from_static(chunk))).await;
    }

    pub async fn fail(&self, kind: StreamKind, message: &str) {
        self.send(kind, EncoderEvent::Error(message.to_string())).await;
    }

    async fn send(&self, kind: StreamKind, event: EncoderEvent) {
        let sender = self.script.senders.lock().unwrap().get(&kind).cloned();
        sender
            .expect("no encoder started for kind")
            .send(event)
            .await
            .expect("pipeline stopped listening");
    }

    pub fn stop_calls(&self, kind: StreamKind) -> usize {
        self.script
            .stop_calls
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// MIME type the encoder for `kind` was created with
    pub fn created_with(&self, kind: StreamKind) -> Option<String> {
        self.script.created.lock().unwrap().get(&kind).cloned()
    }
}

impl EncoderFactory for ScriptedEncoders {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.contains(mime_type)
    }

    fn create(&self, kind: StreamKind, _stream: &MediaStream, mime_type: &str) -> Result<Box<dyn Encoder>> {
        self.script
            .created
            .lock()
            .unwrap()
            .insert(kind, mime_type.to_string());

        Ok(Box::new(ScriptedEncoder {
            kind,
            mime_type: mime_type.to_string(),
            script: Arc::clone(&self.script),
            events: None,
        }))
    }
}

struct ScriptedEncoder {
    kind: StreamKind,
    mime_type: String,
    script: Arc<Script>,
    events: Option<mpsc::Sender<EncoderEvent>>,
}

#[async_trait::async_trait]
impl Encoder for ScriptedEncoder {
    async fn start(&mut self, _timeslice: Duration) -> Result<mpsc::Receiver<EncoderEvent>> {
        if self.script.failing_start.lock().unwrap().contains(&self.kind) {
            bail!("codec rejected the stream");
        }

        let (tx, rx) = mpsc::channel(64);
        self.script.senders.lock().unwrap().insert(self.kind, tx.clone());
        self.events = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        *self
            .script
            .stop_calls
            .lock()
            .unwrap()
            .entry(self.kind)
            .or_default() += 1;

        if self.script.hang_on_stop.lock().unwrap().contains(&self.kind) {
            return Ok(());
        }

        let Some(events) = self.events.take() else {
            return Ok(());
        };
        let final_chunk = self.script.final_chunks.lock().unwrap().get(&self.kind).cloned();
        if let Some(chunk) = final_chunk {
            let _ = events.send(EncoderEvent::Data(chunk)).await;
        }
        let failure = self.script.fail_on_stop.lock().unwrap().get(&self.kind).cloned();
        let last = match failure {
            Some(message) => EncoderEvent::Error(message),
            None => EncoderEvent::Stopped,
        };
        let _ = events.send(last).await;
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Mirror transport
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chunk(Bytes),
    End,
    Closed,
}

/// Records every frame per `(kind, session_id)` endpoint
#[derive(Default)]
pub struct FakeTransport {
    frames: Arc<Mutex<HashMap<(StreamKind, String), Vec<Frame>>>>,
    refuse: bool,
    connect_delay: Option<Duration>,
    stall: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Default::default()
        }
    }

    /// Connects, then never finishes sending a chunk
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Default::default()
        }
    }

    pub fn frames(&self, kind: StreamKind, session_id: &str) -> Vec<Frame> {
        self.frames
            .lock()
            .unwrap()
            .get(&(kind, session_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn endpoints(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MirrorTransport for FakeTransport {
    async fn connect(&self, kind: StreamKind, session_id: &str) -> Result<Box<dyn MirrorLink>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse {
            bail!("connection refused");
        }

        let key = (kind, session_id.to_string());
        self.frames.lock().unwrap().insert(key.clone(), Vec::new());

        Ok(Box::new(FakeLink {
            key,
            frames: Arc::clone(&self.frames),
            stall: self.stall,
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeLink {
    key: (StreamKind, String),
    frames: Arc<Mutex<HashMap<(StreamKind, String), Vec<Frame>>>>,
    stall: bool,
}

impl FakeLink {
    fn push(&self, frame: Frame) {
        self.frames
            .lock()
            .unwrap()
            .entry(self.key.clone())
            .or_default()
            .push(frame);
    }
}

#[async_trait::async_trait]
impl MirrorLink for FakeLink {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<()> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.push(Frame::Chunk(chunk));
        Ok(())
    }

    async fn send_end(&mut self) -> Result<()> {
        self.push(Frame::End);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.push(Frame::Closed);
        Ok(())
    }
}
