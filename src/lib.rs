pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod mirror;
pub mod persistence;
pub mod pipeline;
pub mod session;

pub use capture::{CaptureSource, Platform, SourceKind, SourceRegistry, StreamAcquirer};
pub use config::Config;
pub use error::RecorderError;
pub use http::{create_router, AppState};
pub use media::StreamKind;
pub use persistence::{PersistenceSink, SaveReport};
pub use pipeline::{Pipeline, PipelineState};
pub use session::{SessionConfig, SessionCoordinator, SessionEvent, SessionStatus};
