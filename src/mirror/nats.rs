use anyhow::{Context, Result};
use async_nats::Client;
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::messages::{ControlMessage, ServerMessage};
use super::transport::{MirrorLink, MirrorTransport};
use crate::media::StreamKind;

/// NATS subjects per stream:
/// - `recording.{kind}.{session}`: raw chunks
/// - `recording.{kind}.{session}.control`: `{"type":"end"}`
/// - `recording.{kind}.{session}.events`: server frames
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    pub fn subject(kind: StreamKind, session_id: &str) -> String {
        format!("recording.{}.{}", kind.slug(), session_id)
    }
}

#[async_trait::async_trait]
impl MirrorTransport for NatsTransport {
    async fn connect(&self, kind: StreamKind, session_id: &str) -> Result<Box<dyn MirrorLink>> {
        let subject = Self::subject(kind, session_id);
        let events_subject = format!("{}.events", subject);

        let mut subscriber = self
            .client
            .subscribe(events_subject.clone())
            .await
            .context("Failed to subscribe to mirror events")?;

        info!("Subscribed to {}", events_subject);

        let reader = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<ServerMessage>(&msg.payload) {
                    Ok(message) => message.log(kind),
                    Err(e) => warn!("Failed to parse {} server message: {}", kind, e),
                }
            }
        });

        Ok(Box::new(NatsLink {
            client: self.client.clone(),
            control_subject: format!("{}.control", subject),
            subject,
            reader: Some(reader),
        }))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

struct NatsLink {
    client: Client,
    subject: String,
    control_subject: String,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl MirrorLink for NatsLink {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.client
            .publish(self.subject.clone(), chunk)
            .await
            .context("Failed to publish chunk")
    }

    async fn send_end(&mut self) -> Result<()> {
        let payload = ControlMessage::End.to_json()?.into_bytes();

        self.client
            .publish(self.control_subject.clone(), payload.into())
            .await
            .context("Failed to publish end marker")
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")
    }
}

impl Drop for NatsLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
