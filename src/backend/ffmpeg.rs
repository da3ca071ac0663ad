use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use std::collections::HashSet;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sources::SourceTarget;
use crate::capture::{CaptureSource, MediaDevices, Platform, SourceEnumerator};
use crate::error::RecorderError;
use crate::media::{
    AudioConstraints, CaptureInput, Encoder, EncoderEvent, EncoderFactory, MediaStream,
    MediaTrack, StreamKind, TrackKind,
};

const EVENT_BUFFER: usize = 32;
const VIDEO_FRAMERATE: &str = "30";

/// Where ffmpeg reads from
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// ffmpeg binary
    pub binary: String,

    /// X11 display, e.g. `:0.0`
    pub display: String,

    /// PulseAudio source for loopback audio
    pub system_audio_device: String,

    /// PulseAudio source for the microphone
    pub microphone_device: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            display: ":0.0".to_string(),
            system_audio_device: "@DEFAULT_MONITOR@".to_string(),
            microphone_device: "default".to_string(),
        }
    }
}

/// X11 + PulseAudio capture described as ffmpeg inputs
pub struct FfmpegDevices {
    config: FfmpegConfig,
    sources: Arc<dyn SourceEnumerator>,
    platform: Platform,
}

impl FfmpegDevices {
    pub fn new(config: FfmpegConfig, sources: Arc<dyn SourceEnumerator>) -> Self {
        Self {
            config,
            sources,
            platform: Platform::current(),
        }
    }

    fn require_linux(&self, kind: StreamKind) -> Result<(), RecorderError> {
        if self.platform != Platform::Linux {
            return Err(RecorderError::UnsupportedPlatform(kind, self.platform));
        }
        Ok(())
    }

    fn pulse_stream(
        &self,
        kind: StreamKind,
        device: &str,
        constraints: Option<AudioConstraints>,
    ) -> Result<MediaStream, RecorderError> {
        self.require_linux(kind)?;
        if device.trim().is_empty() {
            return Err(RecorderError::DeviceUnavailable(
                kind,
                "no PulseAudio source configured".to_string(),
            ));
        }

        let mut track = MediaTrack::new(
            format!("pulse:{}", device),
            TrackKind::Audio,
            kind.label(),
            CaptureInput::new("pulse", device),
        );
        if let Some(constraints) = constraints {
            track = track.with_constraints(constraints);
        }
        Ok(MediaStream::new(format!("{}:{}", kind.slug(), device), vec![track]))
    }
}

#[async_trait::async_trait]
impl MediaDevices for FfmpegDevices {
    async fn display_media(&self, source: &CaptureSource) -> Result<MediaStream, RecorderError> {
        self.require_linux(StreamKind::Video)?;

        // The list the user picked from may be stale
        let current = self
            .sources
            .enumerate()
            .await
            .map_err(|e| RecorderError::SourceUnavailable(e.to_string()))?;
        if !current.iter().any(|s| s.id == source.id) {
            return Err(RecorderError::SourceUnavailable(source.name.clone()));
        }

        let input = match SourceTarget::parse(&source.id) {
            Some(SourceTarget::Screen {
                width,
                height,
                x,
                y,
            }) => CaptureInput::new("x11grab", format!("{}+{},{}", self.config.display, x, y))
                .with_option("video_size", format!("{}x{}", width, height)),
            Some(SourceTarget::Window { xid }) => {
                CaptureInput::new("x11grab", self.config.display.as_str()).with_option("window_id", xid)
            }
            None => return Err(RecorderError::SourceUnavailable(source.id.clone())),
        }
        .with_option("framerate", VIDEO_FRAMERATE);

        let track = MediaTrack::new(source.id.as_str(), TrackKind::Video, source.name.as_str(), input);
        Ok(MediaStream::new(source.id.as_str(), vec![track]))
    }

    async fn system_audio(&self) -> Result<MediaStream, RecorderError> {
        self.pulse_stream(StreamKind::SystemAudio, &self.config.system_audio_device, None)
    }

    async fn microphone(&self, constraints: AudioConstraints) -> Result<MediaStream, RecorderError> {
        if constraints.echo_cancellation {
            debug!("Echo cancellation is left to the PulseAudio source");
        }
        self.pulse_stream(
            StreamKind::Microphone,
            &self.config.microphone_device,
            Some(constraints),
        )
    }
}

/// ffmpeg encoder names a MIME type can be produced with, best first
fn codec_candidates(mime_type: &str) -> &'static [&'static str] {
    match mime_type {
        "video/webm;codecs=vp9" => &["libvpx-vp9"],
        "video/webm;codecs=vp8" => &["libvpx"],
        "video/webm" => &["libvpx", "libvpx-vp9"],
        "audio/webm;codecs=opus" => &["libopus"],
        "audio/webm" => &["libopus", "libvorbis"],
        _ => &[],
    }
}

/// Encoder names from `ffmpeg -encoders`
///
/// ```text
///  V....D libvpx-vp9           libvpx VP9 (codec vp9)
///  A....D libopus              libopus Opus (codec opus)
/// ```
pub fn parse_encoders(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Creates ffmpeg encoders for the codecs the local build ships
pub struct FfmpegEncoderFactory {
    binary: String,
    encoders: HashSet<String>,
}

impl FfmpegEncoderFactory {
    /// Ask ffmpeg which encoders it has
    pub async fn probe(binary: &str) -> Result<Self> {
        let output = Command::new(binary)
            .args(["-hide_banner", "-encoders"])
            .output()
            .await
            .with_context(|| format!("Failed to run {}. Install ffmpeg to enable recording.", binary))?;

        if !output.status.success() {
            bail!("{} -encoders exited with {}", binary, output.status);
        }

        let encoders = parse_encoders(&String::from_utf8_lossy(&output.stdout));
        info!("ffmpeg probed: {} encoder(s) available", encoders.len());

        Ok(Self::with_encoders(binary, encoders))
    }

    pub fn with_encoders(binary: impl Into<String>, encoders: HashSet<String>) -> Self {
        Self {
            binary: binary.into(),
            encoders,
        }
    }

    fn codec_for(&self, mime_type: &str) -> Option<&'static str> {
        codec_candidates(mime_type)
            .iter()
            .copied()
            .find(|codec| self.encoders.contains(*codec))
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.codec_for(mime_type).is_some()
    }

    fn create(&self, kind: StreamKind, stream: &MediaStream, mime_type: &str) -> Result<Box<dyn Encoder>> {
        let codec = self
            .codec_for(mime_type)
            .with_context(|| format!("No ffmpeg encoder for {}", mime_type))?;

        let args = encoder_args(kind, stream, codec)?;
        debug!("{} encoder args: {}", kind, args.join(" "));

        Ok(Box::new(FfmpegEncoder {
            kind,
            binary: self.binary.clone(),
            args,
            mime_type: mime_type.to_string(),
            name: format!("ffmpeg/{}", codec),
            stdin: None,
            task: None,
        }))
    }
}

/// Full ffmpeg argument list: inputs, codec, WebM on stdout
pub fn encoder_args(kind: StreamKind, stream: &MediaStream, codec: &str) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    let track = match kind {
        StreamKind::Video => stream.video_track(),
        _ => stream.audio_tracks().next(),
    }
    .with_context(|| format!("{} stream has no usable track", kind))?;

    let input = track.input();
    args.extend(["-f".into(), input.format.clone()]);
    for (key, value) in &input.options {
        args.extend([format!("-{}", key), value.clone()]);
    }
    args.extend(["-i".into(), input.target.clone()]);

    match kind {
        StreamKind::Video => {
            args.extend(["-c:v".into(), codec.into(), "-deadline".into(), "realtime".into()]);
            args.extend(["-b:v".into(), "2M".into()]);
        }
        _ => {
            args.extend(["-c:a".into(), codec.into()]);
            if track.constraints().map_or(false, |c| c.noise_suppression) {
                args.extend(["-af".into(), "afftdn".into()]);
            }
        }
    }

    args.extend(["-f".into(), "webm".into(), "pipe:1".into()]);
    Ok(args)
}

/// One ffmpeg process producing WebM for one stream
pub struct FfmpegEncoder {
    kind: StreamKind,
    binary: String,
    args: Vec<String>,
    mime_type: String,
    name: String,
    stdin: Option<ChildStdin>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<EncoderEvent>> {
        if self.task.is_some() {
            bail!("{} encoder already started", self.kind);
        }

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start ffmpeg for {}", self.kind))?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let stderr = child.stderr.take().context("ffmpeg stderr not captured")?;
        self.stdin = child.stdin.take();

        let stderr_task = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.task = Some(tokio::spawn(run_encoder(
            self.kind,
            child,
            stdout,
            stderr_task,
            timeslice,
            tx,
        )));

        info!("{} ffmpeg encoder started ({})", self.kind, self.name);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };

        debug!("Asking {} ffmpeg to finish", self.kind);
        stdin
            .write_all(b"q\n")
            .await
            .with_context(|| format!("Failed to signal {} ffmpeg", self.kind))?;
        stdin.flush().await.ok();

        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Aborting drops the child, which kills it
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Cut stdout into one chunk per `timeslice` until ffmpeg exits
async fn run_encoder(
    kind: StreamKind,
    mut child: Child,
    mut stdout: ChildStdout,
    stderr: JoinHandle<String>,
    timeslice: Duration,
    events: mpsc::Sender<EncoderEvent>,
) {
    let mut buffer = BytesMut::with_capacity(64 * 1024);
    let mut ticker = tokio::time::interval(timeslice);
    ticker.tick().await;

    loop {
        tokio::select! {
            read = stdout.read_buf(&mut buffer) => match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    let _ = events
                        .send(EncoderEvent::Error(format!("Failed to read {} output: {}", kind, e)))
                        .await;
                    return;
                }
            },
            _ = ticker.tick() => {
                if events.send(EncoderEvent::Data(buffer.split().freeze())).await.is_err() {
                    return;
                }
            }
        }
    }

    if !buffer.is_empty() {
        let _ = events.send(EncoderEvent::Data(buffer.split().freeze())).await;
    }

    let status = child.wait().await;
    let stderr = stderr.await.unwrap_or_default();
    let _ = events.send(exit_event(kind, status, &stderr)).await;
}

fn exit_event(kind: StreamKind, status: std::io::Result<ExitStatus>, stderr: &str) -> EncoderEvent {
    match status {
        Ok(status) if status.success() => EncoderEvent::Stopped,
        Ok(status) => {
            let tail = stderr.lines().last().unwrap_or("no output");
            warn!("{} ffmpeg exited with {}: {}", kind, status, tail);
            EncoderEvent::Error(format!("ffmpeg exited with {}: {}", status, tail))
        }
        Err(e) => EncoderEvent::Error(format!("Failed to wait for {} ffmpeg: {}", kind, e)),
    }
}
