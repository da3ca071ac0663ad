use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{ControlMessage, ServerMessage};
use super::transport::{MirrorLink, MirrorTransport};
use crate::media::StreamKind;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the server's close reply
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket endpoint per stream: `{base_url}/{kind}/{session_id}`
pub struct WebSocketTransport {
    base_url: String,
}

impl WebSocketTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn endpoint(&self, kind: StreamKind, session_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            kind.slug(),
            session_id
        )
    }
}

#[async_trait::async_trait]
impl MirrorTransport for WebSocketTransport {
    async fn connect(&self, kind: StreamKind, session_id: &str) -> Result<Box<dyn MirrorLink>> {
        let url = self.endpoint(kind, session_id);
        info!("Connecting to {} stream: {}", kind, url);

        let (ws, _response) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        let (sink, stream) = ws.split();
        let reader = tokio::spawn(read_server_messages(kind, stream));

        Ok(Box::new(WebSocketLink {
            kind,
            sink,
            reader: Some(reader),
        }))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

struct WebSocketLink {
    kind: StreamKind,
    sink: SplitSink<WsStream, Message>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl MirrorLink for WebSocketLink {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.sink
            .send(Message::Binary(chunk.to_vec()))
            .await
            .with_context(|| format!("Failed to send {} chunk", self.kind))
    }

    async fn send_end(&mut self) -> Result<()> {
        let marker = ControlMessage::End.to_json()?;
        self.sink
            .send(Message::Text(marker))
            .await
            .with_context(|| format!("Failed to send {} end marker", self.kind))
    }

    async fn close(&mut self) -> Result<()> {
        let result = self
            .sink
            .close()
            .await
            .with_context(|| format!("Failed to close {} stream", self.kind));

        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                reader.abort();
            }
        }

        result
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_server_messages(kind: StreamKind, mut stream: SplitStream<WsStream>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => message.log(kind),
                Err(e) => warn!("Error parsing {} server message: {}", kind, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("{} stream read ended: {}", kind, e);
                break;
            }
        }
    }
}
