use serde::Serialize;
use tokio::sync::broadcast;

use crate::media::StreamKind;
use crate::persistence::SaveReport;
use crate::pipeline::ChunkSubscriber;

/// Notices for whatever UI is watching the coordinator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A start was rejected because a session is in progress
    Busy,
    Started {
        session_id: String,
        streams: Vec<StreamKind>,
    },
    /// A secondary stream could not start; the session continues without it
    Degraded { kind: StreamKind, reason: String },
    /// The primary stream could not start; nothing is recording
    StartFailed { reason: String },
    /// A running pipeline failed and left the active set
    StreamFailed { kind: StreamKind, reason: String },
    Saved { report: SaveReport },
    SaveFailed { report: SaveReport },
    Stopped { session_id: String },
}

/// "Recording (Video + System Audio + Microphone)..."
pub fn recording_indicator(streams: &[StreamKind]) -> String {
    if streams.is_empty() {
        return "Not recording".to_string();
    }

    let labels: Vec<&str> = streams.iter().map(StreamKind::label).collect();
    format!("Recording ({})...", labels.join(" + "))
}

/// Turns a pipeline's runtime error into a `StreamFailed` notice
pub(crate) struct FailureNotifier {
    events: broadcast::Sender<SessionEvent>,
}

impl FailureNotifier {
    pub(crate) fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self { events }
    }
}

impl ChunkSubscriber for FailureNotifier {
    fn on_chunk(&self, _kind: StreamKind, _chunk: &bytes::Bytes) {}

    fn on_error(&self, kind: StreamKind, message: &str) {
        let _ = self.events.send(SessionEvent::StreamFailed {
            kind,
            reason: message.to_string(),
        });
    }
}
