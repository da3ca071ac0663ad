//! Writes a finished session to disk
//!
//! One file per stream (`{id}.webm`, `{id}_system-audio.webm`,
//! `{id}_microphone.webm`) plus a human-readable `{id}_info.txt`.

mod metadata;
mod sink;

pub use metadata::{render_metadata, SessionMetadata};
pub use sink::{
    metadata_file_name, recording_file_name, DirectoryPicker, FixedDirectory, PersistenceSink,
    RecordedBlob, SaveReport,
};
