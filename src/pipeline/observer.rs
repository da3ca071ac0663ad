use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::lock;
use crate::media::StreamKind;

/// Receives a pipeline's chunks and its (single) runtime error
///
/// Called from the pipeline's pump task; implementations must not block.
pub trait ChunkSubscriber: Send + Sync {
    fn on_chunk(&self, kind: StreamKind, chunk: &Bytes);

    fn on_error(&self, _kind: StreamKind, _message: &str) {}
}

/// Append-only in-memory store of a pipeline's chunks
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Mutex<Vec<Bytes>>,
    bytes: AtomicUsize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Bytes> {
        lock(&self.chunks).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.chunks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl ChunkSubscriber for ChunkBuffer {
    fn on_chunk(&self, _kind: StreamKind, chunk: &Bytes) {
        lock(&self.chunks).push(chunk.clone());
        self.bytes.fetch_add(chunk.len(), Ordering::SeqCst);
    }
}

/// Concatenate chunks into one blob; `None` when there is nothing to write
pub fn assemble_chunks(chunks: &[Bytes]) -> Option<Bytes> {
    if chunks.is_empty() {
        return None;
    }

    let total = chunks.iter().map(Bytes::len).sum();
    let mut blob = BytesMut::with_capacity(total);
    for chunk in chunks {
        blob.extend_from_slice(chunk);
    }

    Some(blob.freeze())
}
