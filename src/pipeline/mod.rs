//! Recording pipelines
//!
//! A `Pipeline` binds one acquired `MediaStream` to one encoder, buffers the
//! encoded chunks in order and fans each chunk out to its subscribers (the
//! local buffer first, then e.g. a network mirror).

mod observer;
mod pipeline;
mod state;

pub use observer::{assemble_chunks, ChunkBuffer, ChunkSubscriber};
pub use pipeline::Pipeline;
pub use state::PipelineState;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
