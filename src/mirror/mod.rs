//! Live network mirror of pipeline output
//!
//! Each stream kind gets its own connection, opened after its pipeline is
//! recording. Chunks are forwarded only while the connection is open; local
//! buffering never waits on the network.
//!
//! Transports:
//! - WebSocket: `{url}/{kind}/{session_id}`, binary chunk frames + JSON control
//! - NATS: `recording.{kind}.{session_id}` subjects

mod connection;
pub mod messages;
mod nats;
mod transport;
mod websocket;

pub use connection::{MirrorConnection, MirrorForwarder, NetworkMirror};
pub use messages::{ControlMessage, ServerMessage};
pub use nats::NatsTransport;
pub use transport::{MirrorLink, MirrorState, MirrorTransport};
pub use websocket::WebSocketTransport;
