//! HTTP API for controlling the recorder
//!
//! - GET /health - Health check
//! - GET /recording/sources - Filtered screens and windows
//! - POST /recording/start - Start recording a source
//! - POST /recording/stop - Stop and save the active recording
//! - GET /recording/status - Current session snapshot

mod handlers;
mod routes;
mod state;

pub use handlers::status_for;
pub use routes::create_router;
pub use state::AppState;
