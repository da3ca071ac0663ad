use thiserror::Error;

use crate::capture::Platform;
use crate::media::StreamKind;

/// Failures surfaced by the recording core
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The user (or the OS) refused access to a capture device
    #[error("Permission denied for {0} capture. Please grant capture permissions and try again.")]
    PermissionDenied(StreamKind),

    /// The selected screen or window disappeared between listing and capture
    #[error("The selected source is no longer available: {0}")]
    SourceUnavailable(String),

    #[error("{0} device unavailable: {1}")]
    DeviceUnavailable(StreamKind, String),

    /// Declared up front for platforms that cannot expose the requested stream
    #[error("{0} capture is not supported on {1}")]
    UnsupportedPlatform(StreamKind, Platform),

    #[error("Failed to initialize {0} encoder: {1}")]
    EncoderInitError(StreamKind, String),

    #[error("{0} pipeline is already recording")]
    AlreadyRecording(StreamKind),

    #[error("Failed to enumerate capture sources: {0}")]
    SourceEnumerationError(String),

    /// Some recordings were written, some were not
    #[error("Failed to save {} file(s): {}", .0.len(), .0.join("; "))]
    PersistencePartialFailure(Vec<String>),

    /// A session is already starting, active or stopping
    #[error("A recording session is already in progress")]
    SessionBusy,

    /// The runtime cancelled a start before it finished
    #[error("Recording task interrupted: {0}")]
    Interrupted(String),
}

impl RecorderError {
    /// Stream the error belongs to, when it is tied to one
    pub fn stream_kind(&self) -> Option<StreamKind> {
        match self {
            Self::PermissionDenied(kind)
            | Self::DeviceUnavailable(kind, _)
            | Self::UnsupportedPlatform(kind, _)
            | Self::EncoderInitError(kind, _)
            | Self::AlreadyRecording(kind) => Some(*kind),
            _ => None,
        }
    }
}
