//! Capture source discovery and stream acquisition
//!
//! - `SourceRegistry` lists screens/windows, minus duplicates and overlay noise
//! - `StreamAcquirer` turns a selection into the three independent streams

mod acquire;
mod source;

pub use acquire::{MediaDevices, Platform, StreamAcquirer};
pub use source::{
    filter_sources, CaptureSource, SourceEnumerator, SourceKind, SourceRegistry,
    DEFAULT_EXCLUDE_PATTERNS,
};
