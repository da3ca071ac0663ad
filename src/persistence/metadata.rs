use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::sink::RecordedBlob;
use crate::media::StreamKind;

/// Session facts handed to the sink alongside the blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    /// Whole seconds between start and stop
    pub duration_secs: u64,
}

impl SessionMetadata {
    pub fn new(session_id: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let duration_ms = end_time
            .signed_duration_since(start_time)
            .num_milliseconds()
            .max(0) as u64;

        Self {
            session_id: session_id.into(),
            start_time,
            duration_secs: (duration_ms + 500) / 1000,
        }
    }
}

/// Text of the `_info.txt` record
pub fn render_metadata(
    metadata: &SessionMetadata,
    blobs: &BTreeMap<StreamKind, RecordedBlob>,
    saved_files: &[String],
    errors: &[String],
) -> String {
    let mut lines = vec![
        "Recording Session Information".to_string(),
        "============================".to_string(),
        String::new(),
        format!("Session ID: {}", metadata.session_id),
        format!(
            "Recording Date/Time: {}",
            metadata.start_time.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        format!("Duration: {} seconds", metadata.duration_secs),
        String::new(),
        "Files Saved:".to_string(),
    ];
    lines.extend(saved_files.iter().map(|file| format!("  - {}", file)));

    lines.push(String::new());
    lines.push("Recording Quality/Format:".to_string());
    lines.extend(
        blobs
            .iter()
            .map(|(kind, blob)| format!("  - {}: {}", kind.label(), blob.mime_type)),
    );

    lines.push(String::new());
    lines.push(format!("Total Files: {}", saved_files.len()));

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        lines.extend(errors.iter().map(|err| format!("  - {}", err)));
    }

    lines.join("\n")
}
