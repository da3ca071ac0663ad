//! Media primitives shared by capture, pipelines and persistence
//!
//! - `StreamKind`: the three logical recordings a session can produce
//! - `MediaStream` / `MediaTrack`: acquired capture handles, exclusively owned
//! - `Encoder` / `EncoderFactory`: the seam to whatever turns tracks into chunks

mod encoder;
mod kind;
mod stream;

pub use encoder::{
    container_extension, mime_preference, negotiate_mime_type, Encoder, EncoderEvent,
    EncoderFactory, AUDIO_MIME_PREFERENCE, VIDEO_MIME_PREFERENCE,
};
pub use kind::StreamKind;
pub use stream::{AudioConstraints, CaptureInput, MediaStream, MediaTrack, TrackKind, TrackLiveness};
