use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::media::StreamKind;

/// Connection state as seen by the forwarding side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorState {
    Connecting,
    Open,
    Closed,
}

/// Opens per-stream links to a live endpoint
#[async_trait::async_trait]
pub trait MirrorTransport: Send + Sync {
    async fn connect(&self, kind: StreamKind, session_id: &str) -> Result<Box<dyn MirrorLink>>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// One open link carrying one stream's chunks
#[async_trait::async_trait]
pub trait MirrorLink: Send {
    /// Forward a chunk verbatim as a binary frame
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Send the end-of-stream control frame
    async fn send_end(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
