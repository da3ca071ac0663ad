use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::lock;
use super::observer::{ChunkBuffer, ChunkSubscriber};
use super::state::PipelineState;
use crate::error::RecorderError;
use crate::media::{
    negotiate_mime_type, Encoder, EncoderEvent, EncoderFactory, MediaStream, StreamKind,
    TrackLiveness,
};

/// State shared between a pipeline and its pump task
struct Shared {
    kind: StreamKind,
    state: Mutex<PipelineState>,
    stream: Mutex<Option<MediaStream>>,
    subscribers: Mutex<Vec<Arc<dyn ChunkSubscriber>>>,
    drain_error: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    fn accept_chunk(&self, chunk: Bytes) {
        if chunk.is_empty() {
            trace!("{} pipeline dropped empty chunk", self.kind);
            return;
        }

        let state = self.state();
        if !state.is_live() {
            debug!("{} pipeline dropped chunk in state {:?}", self.kind, state);
            return;
        }

        trace!("{} chunk recorded: {} bytes", self.kind, chunk.len());

        // Clone the list so subscribers run without the lock held
        let subscribers = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            subscriber.on_chunk(self.kind, &chunk);
        }
    }

    /// Runtime failure: release the stream and notify subscribers, once
    ///
    /// An error while draining keeps what was buffered: the pipeline still
    /// ends `Stopped` and `stop()` reports the error.
    fn fail(&self, message: &str) {
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return;
            }
            if *state == PipelineState::Stopping {
                *state = PipelineState::Stopped;
                drop(state);

                warn!("{} encoder failed while draining: {}", self.kind, message);
                *lock(&self.drain_error) = Some(message.to_string());
                self.release_stream();
                return;
            }
            *state = PipelineState::Failed;
        }

        error!("{} recorder error: {}", self.kind, message);
        self.release_stream();

        let subscribers = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            subscriber.on_error(self.kind, message);
        }
    }

    /// Drain completed: `Stopped` unless already failed
    fn finish(&self) {
        {
            let mut state = lock(&self.state);
            if state.is_live() {
                *state = PipelineState::Stopped;
            }
        }
        self.release_stream();
    }

    fn release_stream(&self) {
        if let Some(stream) = lock(&self.stream).take() {
            let stopped = stream.stop_all();
            debug!("{} stream released ({} track(s) stopped)", self.kind, stopped);
        }
    }
}

/// One stream bound to one encoder
pub struct Pipeline {
    kind: StreamKind,
    shared: Arc<Shared>,
    buffer: Arc<ChunkBuffer>,
    encoder: Option<Box<dyn Encoder>>,
    pump: Option<JoinHandle<()>>,
    mime_type: Option<String>,
    drain_timeout: Duration,
}

impl Pipeline {
    pub fn new(kind: StreamKind, drain_timeout: Duration) -> Self {
        let buffer = Arc::new(ChunkBuffer::new());
        let subscribers: Vec<Arc<dyn ChunkSubscriber>> = vec![buffer.clone()];

        Self {
            kind,
            shared: Arc::new(Shared {
                kind,
                state: Mutex::new(PipelineState::Idle),
                stream: Mutex::new(None),
                subscribers: Mutex::new(subscribers),
                drain_error: Mutex::new(None),
            }),
            buffer,
            encoder: None,
            pump: None,
            mime_type: None,
            drain_timeout,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Negotiated MIME type, once started
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn byte_len(&self) -> usize {
        self.buffer.byte_len()
    }

    /// Liveness of the tracks the pipeline currently owns
    pub fn stream_liveness(&self) -> Vec<TrackLiveness> {
        lock(&self.shared.stream)
            .as_ref()
            .map(MediaStream::liveness)
            .unwrap_or_default()
    }

    /// Add a chunk subscriber; it sees chunks emitted from now on
    pub fn subscribe(&self, subscriber: Arc<dyn ChunkSubscriber>) {
        lock(&self.shared.subscribers).push(subscriber);
    }

    /// Bind `stream` and start encoding it in `chunk_interval` slices
    ///
    /// The stream is released on every failure path.
    pub async fn start(
        &mut self,
        stream: MediaStream,
        factory: &dyn EncoderFactory,
        chunk_interval: Duration,
    ) -> Result<(), RecorderError> {
        let state = self.state();
        if state != PipelineState::Idle {
            warn!("{} pipeline start rejected in state {:?}", self.kind, state);
            stream.stop_all();
            return Err(RecorderError::AlreadyRecording(self.kind));
        }

        let Some(mime_type) = negotiate_mime_type(self.kind, factory) else {
            return Err(self.abort_start(stream, "no supported encoding available".to_string()));
        };
        info!("Using codec for {} recording: {}", self.kind, mime_type);

        let mut encoder = match factory.create(self.kind, &stream, mime_type) {
            Ok(encoder) => encoder,
            Err(e) => return Err(self.abort_start(stream, format!("{:#}", e))),
        };

        let events = match encoder.start(chunk_interval).await {
            Ok(events) => events,
            Err(e) => return Err(self.abort_start(stream, format!("{:#}", e))),
        };

        *lock(&self.shared.stream) = Some(stream);
        self.shared.set_state(PipelineState::Recording);
        self.mime_type = Some(mime_type.to_string());
        self.pump = Some(tokio::spawn(pump(Arc::clone(&self.shared), events)));

        info!(
            "{} recording started with {} ({}ms chunks)",
            self.kind,
            encoder.name(),
            chunk_interval.as_millis()
        );
        self.encoder = Some(encoder);

        Ok(())
    }

    fn abort_start(&self, stream: MediaStream, reason: String) -> RecorderError {
        stream.stop_all();
        drop(stream);
        self.shared.set_state(PipelineState::Failed);
        error!("Failed to start {} recording: {}", self.kind, reason);
        RecorderError::EncoderInitError(self.kind, reason)
    }

    /// Flush the encoder, wait for the final chunk and release the stream
    ///
    /// No-op unless recording. A failed pipeline only has its finished task
    /// and encoder dropped.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state() {
            PipelineState::Recording => {}
            PipelineState::Failed => {
                if let Some(pump) = self.pump.take() {
                    let _ = pump.await;
                }
                self.encoder = None;
                return Ok(());
            }
            state => {
                debug!("{} pipeline stop ignored in state {:?}", self.kind, state);
                return Ok(());
            }
        }

        info!("Stopping {} recorder...", self.kind);
        self.shared.set_state(PipelineState::Stopping);

        let mut result = Ok(());
        if let Some(encoder) = self.encoder.as_mut() {
            if let Err(e) = encoder.stop().await {
                result = Err(e.context(format!("Failed to stop {} encoder", self.kind)));
            }
        }

        if let Some(mut pump) = self.pump.take() {
            match tokio::time::timeout(self.drain_timeout, &mut pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{} pipeline task panicked: {}", self.kind, e),
                Err(_) => {
                    warn!(
                        "{} encoder did not drain within {:?}, keeping buffered chunks",
                        self.kind, self.drain_timeout
                    );
                    pump.abort();
                }
            }
        }

        self.shared.finish();
        self.encoder = None;

        if let Some(message) = lock(&self.shared.drain_error).take() {
            if result.is_ok() {
                result = Err(anyhow!("{} encoder failed while draining: {}", self.kind, message));
            }
        }

        info!(
            "{} recording stopped. Total chunks: {} ({} bytes)",
            self.kind,
            self.buffer.len(),
            self.buffer.byte_len()
        );

        result
    }

    /// Stop a pipeline that must not keep running, detaching every subscriber
    /// first so nothing more is delivered
    pub async fn force_stop(&mut self) {
        warn!("{} recorder still live, stopping previous instance", self.kind);

        lock(&self.shared.subscribers).clear();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.stop().await {
                warn!("Error stopping previous {} recorder: {:#}", self.kind, e);
            }
        }

        self.shared.finish();
    }

    /// Chunks accumulated since start, in emission order; only once stopped
    pub fn drained_chunks(&self) -> Option<Vec<Bytes>> {
        match self.state() {
            PipelineState::Stopped => Some(self.buffer.snapshot()),
            _ => None,
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.shared.release_stream();
    }
}

async fn pump(shared: Arc<Shared>, mut events: mpsc::Receiver<EncoderEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EncoderEvent::Data(chunk) => shared.accept_chunk(chunk),
            EncoderEvent::Error(message) => {
                shared.fail(&message);
                return;
            }
            EncoderEvent::Stopped => {
                shared.finish();
                return;
            }
        }
    }

    if shared.state() == PipelineState::Recording {
        shared.fail("encoder closed unexpectedly");
    } else {
        shared.finish();
    }
}
