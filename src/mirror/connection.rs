use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::transport::{MirrorState, MirrorTransport};
use crate::media::StreamKind;
use crate::pipeline::ChunkSubscriber;

/// Chunks queued per mirror before new ones are dropped
const DEFAULT_QUEUE_CAPACITY: usize = 64;

enum MirrorFrame {
    Chunk(Bytes),
    End,
}

/// Opens mirror connections over a transport
#[derive(Clone)]
pub struct NetworkMirror {
    transport: Arc<dyn MirrorTransport>,
    connect_timeout: Duration,
    close_timeout: Duration,
    queue_capacity: usize,
}

impl NetworkMirror {
    pub fn new(
        transport: Arc<dyn MirrorTransport>,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            connect_timeout,
            close_timeout,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Bound on chunks waiting for a slow peer
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Start connecting in the background
    ///
    /// Never fails: a connection that cannot be established ends up `Closed`
    /// and the caller keeps recording locally.
    pub fn connect(&self, kind: StreamKind, session_id: &str) -> MirrorConnection {
        let (state_tx, _) = watch::channel(MirrorState::Connecting);
        let state = Arc::new(state_tx);
        let (frames_tx, frames_rx) = mpsc::channel(self.queue_capacity);
        let forwarded = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run_link(
            Arc::clone(&self.transport),
            kind,
            session_id.to_string(),
            Arc::clone(&state),
            frames_rx,
            self.connect_timeout,
            Arc::clone(&forwarded),
        ));

        MirrorConnection {
            kind,
            state,
            frames: frames_tx,
            task: Some(task),
            forwarded,
            dropped,
            close_timeout: self.close_timeout,
        }
    }
}

/// Handle to one stream's mirror link
pub struct MirrorConnection {
    kind: StreamKind,
    state: Arc<watch::Sender<MirrorState>>,
    frames: mpsc::Sender<MirrorFrame>,
    task: Option<JoinHandle<()>>,
    forwarded: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    close_timeout: Duration,
}

impl MirrorConnection {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn state(&self) -> MirrorState {
        *self.state.borrow()
    }

    /// Chunks actually written to the link
    pub fn forwarded_chunks(&self) -> u64 {
        self.forwarded.load(Ordering::SeqCst)
    }

    /// Chunks skipped because the peer fell behind
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Subscriber that forwards a pipeline's chunks while the link is open
    pub fn forwarder(&self) -> Arc<MirrorForwarder> {
        Arc::new(MirrorForwarder {
            state: Arc::clone(&self.state),
            frames: self.frames.clone(),
            dropped: Arc::clone(&self.dropped),
        })
    }

    /// Wait until the connection attempt has succeeded or failed
    pub async fn wait_settled(&self) -> MirrorState {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state != MirrorState::Connecting {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Close the link, sending the end marker first if it is open
    pub async fn disconnect(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        match self.state() {
            MirrorState::Open => {
                let frames = self.frames.clone();
                let close = async {
                    let _ = frames.send(MirrorFrame::End).await;
                    let _ = (&mut task).await;
                };
                if tokio::time::timeout(self.close_timeout, close).await.is_err() {
                    warn!(
                        "{} mirror did not close within {:?}, dropping it",
                        self.kind, self.close_timeout
                    );
                    task.abort();
                }
            }
            state => {
                debug!("{} mirror closed while {:?}, no end marker sent", self.kind, state);
                task.abort();
                let _ = task.await;
            }
        }

        self.state.send_replace(MirrorState::Closed);
    }
}

impl Drop for MirrorConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// `ChunkSubscriber` side of a mirror connection
pub struct MirrorForwarder {
    state: Arc<watch::Sender<MirrorState>>,
    frames: mpsc::Sender<MirrorFrame>,
    dropped: Arc<AtomicU64>,
}

impl ChunkSubscriber for MirrorForwarder {
    fn on_chunk(&self, kind: StreamKind, chunk: &Bytes) {
        if *self.state.borrow() != MirrorState::Open {
            return;
        }

        match self.frames.try_send(MirrorFrame::Chunk(chunk.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "{} mirror falling behind, chunk kept locally only ({} dropped)",
                    kind, dropped
                );
            }
            Err(TrySendError::Closed(_)) => {
                trace!("{} mirror link gone, chunk kept locally only", kind);
            }
        }
    }
}

async fn run_link(
    transport: Arc<dyn MirrorTransport>,
    kind: StreamKind,
    session_id: String,
    state: Arc<watch::Sender<MirrorState>>,
    mut frames: mpsc::Receiver<MirrorFrame>,
    connect_timeout: Duration,
    forwarded: Arc<AtomicU64>,
) {
    info!(
        "Connecting to {} stream via {} for session {}",
        kind,
        transport.name(),
        session_id
    );

    let mut link = match tokio::time::timeout(connect_timeout, transport.connect(kind, &session_id)).await {
        Ok(Ok(link)) => link,
        Ok(Err(e)) => {
            warn!(
                "{} stream mirror failed, continuing with local recording only: {:#}",
                kind, e
            );
            state.send_replace(MirrorState::Closed);
            return;
        }
        Err(_) => {
            warn!(
                "{} stream mirror timed out after {:?}, continuing with local recording only",
                kind, connect_timeout
            );
            state.send_replace(MirrorState::Closed);
            return;
        }
    };

    state.send_replace(MirrorState::Open);
    info!("{} stream connected", kind);

    while let Some(frame) = frames.recv().await {
        match frame {
            MirrorFrame::Chunk(chunk) => {
                if let Err(e) = link.send_chunk(chunk).await {
                    warn!("{} mirror send failed, closing link: {:#}", kind, e);
                    break;
                }
                forwarded.fetch_add(1, Ordering::SeqCst);
            }
            MirrorFrame::End => {
                if let Err(e) = link.send_end().await {
                    warn!("Failed to send {} end marker: {:#}", kind, e);
                }
                break;
            }
        }
    }

    state.send_replace(MirrorState::Closed);
    if let Err(e) = link.close().await {
        debug!("Error closing {} mirror: {:#}", kind, e);
    }

    info!("{} stream closed", kind);
}
