use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::media::StreamKind;

/// Control frame sent to the mirror endpoint, distinguishable from binary chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Logical end of stream, sent before closing an open connection
    End,
}

impl ControlMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frame received from the mirror endpoint; informational only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        message: String,
        #[serde(default)]
        received_bytes: Option<u64>,
        #[serde(default)]
        chunk_count: Option<u64>,
    },
    Error {
        message: String,
    },
    Transcript {
        text: String,
    },
    ControlAck {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Surface the frame in the log; it never affects recording
    pub fn log(&self, kind: StreamKind) {
        match self {
            Self::Status {
                message,
                received_bytes,
                ..
            } => info!(
                "{} mirror: {} ({} bytes received)",
                kind,
                message,
                received_bytes.unwrap_or(0)
            ),
            Self::Error { message } => error!("{} mirror server error: {}", kind, message),
            Self::Transcript { text } => info!("{} transcript: {}", kind, text),
            Self::ControlAck { action, .. } => {
                debug!("{} mirror acknowledged control {:?}", kind, action)
            }
            Self::Unknown => debug!("{} mirror sent an unrecognized frame", kind),
        }
    }
}
