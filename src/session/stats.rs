use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::coordinator::SessionPhase;
use crate::media::StreamKind;
use crate::mirror::MirrorState;
use crate::pipeline::PipelineState;

/// Snapshot of the coordinator for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,

    /// Current session, if one is active
    pub session_id: Option<String>,

    /// Streams the session tried to start, including degraded ones
    pub requested_streams: Vec<StreamKind>,

    /// When the recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Elapsed time in seconds
    pub duration_secs: f64,

    /// Streams still recording
    pub active_streams: Vec<StreamKind>,

    /// Per-stream details
    pub streams: Vec<StreamStats>,

    /// Indicator text, e.g. "Recording (Video + Microphone)..."
    pub indicator: String,
}

/// One pipeline's progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStats {
    pub kind: StreamKind,
    pub state: PipelineState,
    pub mime_type: Option<String>,
    pub chunks: usize,
    pub bytes: usize,
    pub mirror: Option<MirrorState>,
}
