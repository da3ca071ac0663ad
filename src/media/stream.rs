use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Track media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// How the platform opens a track: demuxer, target and extra options
///
/// Example: `x11grab` / `:0.0+0,0` / `[("video_size", "1920x1080")]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureInput {
    pub format: String,
    pub target: String,
    pub options: Vec<(String, String)>,
}

impl CaptureInput {
    pub fn new(format: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            target: target.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }
}

/// Processing requested for microphone tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Read-only view of a track's liveness, usable after the track moved away
#[derive(Debug, Clone)]
pub struct TrackLiveness(Arc<AtomicBool>);

impl TrackLiveness {
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single captured track
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    input: CaptureInput,
    constraints: Option<AudioConstraints>,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>, input: CaptureInput) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            input,
            constraints: None,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_constraints(mut self, constraints: AudioConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn input(&self) -> &CaptureInput {
        &self.input
    }

    pub fn constraints(&self) -> Option<AudioConstraints> {
        self.constraints
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn liveness(&self) -> TrackLiveness {
        TrackLiveness(Arc::clone(&self.live))
    }

    /// Stop the track. Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        let was_live = self.live.swap(false, Ordering::SeqCst);
        if was_live {
            debug!("Track stopped: {} ({})", self.label, self.id);
        }
        was_live
    }
}

/// A set of tracks acquired together
///
/// A stream is owned by exactly one pipeline; it is not `Clone`. Dropping it
/// stops every track that is still live.
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    pub fn liveness(&self) -> Vec<TrackLiveness> {
        self.tracks.iter().map(MediaTrack::liveness).collect()
    }

    /// Stop every live track, returning how many were stopped
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}
