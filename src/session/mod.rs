//! Recording session management
//!
//! This module provides the `SessionCoordinator`, the single owner of the
//! recording session lifecycle:
//! - Acquiring the display, system audio and microphone streams
//! - Starting one pipeline per stream, tolerating secondary failures
//! - Mirroring chunks to a live endpoint when configured
//! - Stopping every pipeline, assembling blobs and handing them to persistence

mod config;
mod coordinator;
mod events;
mod session;
mod stats;

pub use config::SessionConfig;
pub use coordinator::{SessionCoordinator, SessionPhase, StartOutcome, StreamDegradation};
pub use events::{recording_indicator, SessionEvent};
pub use session::{session_id_for, Session};
pub use stats::{SessionStatus, StreamStats};
