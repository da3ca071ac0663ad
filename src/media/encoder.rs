use anyhow::Result;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

use super::kind::StreamKind;
use super::stream::MediaStream;

/// Video encodings, most compressed first; the last entry is container-only
pub const VIDEO_MIME_PREFERENCE: &[&str] = &[
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// Audio encodings, most compressed first; the last entry is container-only
pub const AUDIO_MIME_PREFERENCE: &[&str] = &["audio/webm;codecs=opus", "audio/webm"];

/// Something an encoder reports while running
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// One encoded segment; may be empty when nothing was produced in the interval
    Data(Bytes),
    /// Runtime failure; the encoder produces nothing after this
    Error(String),
    /// The final segment has been flushed
    Stopped,
}

/// Encoder bound to one media stream
///
/// Implementations:
/// - ffmpeg subprocess writing WebM to stdout (`backend::ffmpeg`)
/// - in-memory scripted encoders in tests
#[async_trait::async_trait]
pub trait Encoder: Send + Sync {
    /// Start encoding, emitting a `Data` event every `timeslice`
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<EncoderEvent>>;

    /// Ask the encoder to flush. The final `Data` and then `Stopped` arrive on
    /// the receiver returned by `start`.
    async fn stop(&mut self) -> Result<()>;

    /// Negotiated MIME type
    fn mime_type(&self) -> &str;

    /// Encoder name for logging
    fn name(&self) -> &str;
}

/// Creates encoders and reports which encodings the host supports
pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        kind: StreamKind,
        stream: &MediaStream,
        mime_type: &str,
    ) -> Result<Box<dyn Encoder>>;
}

pub fn mime_preference(kind: StreamKind) -> &'static [&'static str] {
    match kind {
        StreamKind::Video => VIDEO_MIME_PREFERENCE,
        StreamKind::SystemAudio | StreamKind::Microphone => AUDIO_MIME_PREFERENCE,
    }
}

/// First supported MIME type in preference order
pub fn negotiate_mime_type(kind: StreamKind, factory: &dyn EncoderFactory) -> Option<&'static str> {
    mime_preference(kind)
        .iter()
        .copied()
        .find(|mime| factory.is_type_supported(mime))
}

/// File extension for a MIME type (`video/webm;codecs=vp9` -> `webm`)
pub fn container_extension(mime_type: &str) -> &str {
    let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
    let subtype = essence.rsplit('/').next().unwrap_or(essence);

    match subtype {
        "" => "bin",
        "mpeg" => "mp3",
        "x-matroska" => "mkv",
        "quicktime" => "mov",
        other => other,
    }
}
